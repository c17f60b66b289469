use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub couchdb: CouchConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub sample: SampleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CouchConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:5984".to_string()
}
fn default_username() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "admin".to_string()
}
fn default_database() -> String {
    "storefront".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: default_password(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransferConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SampleConfig {
    #[serde(default = "default_order_count")]
    pub orders: usize,
    #[serde(default = "default_event_count")]
    pub events: usize,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

fn default_order_count() -> usize {
    25
}
fn default_event_count() -> usize {
    150
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/sample_data.json")
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            orders: default_order_count(),
            events: default_event_count(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Load configuration from a TOML file, falling back to built-in defaults
/// when the file does not exist (the tool is usable against a local
/// CouchDB with no config at all).
///
/// Credentials can be overridden from the environment after the file is
/// read: `COUCHDB_URL`, `COUCHDB_USER`, `COUCHDB_PASSWORD`,
/// `COUCHDB_DATABASE`.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    if let Ok(url) = std::env::var("COUCHDB_URL") {
        config.couchdb.url = url;
    }
    if let Ok(user) = std::env::var("COUCHDB_USER") {
        config.couchdb.username = user;
    }
    if let Ok(password) = std::env::var("COUCHDB_PASSWORD") {
        config.couchdb.password = password;
    }
    if let Ok(database) = std::env::var("COUCHDB_DATABASE") {
        config.couchdb.database = database;
    }

    // Validate connection settings
    if config.couchdb.url.is_empty() {
        anyhow::bail!("couchdb.url must not be empty");
    }
    if config.couchdb.database.is_empty() {
        anyhow::bail!("couchdb.database must not be empty");
    }
    if config.couchdb.timeout_secs == 0 {
        anyhow::bail!("couchdb.timeout_secs must be > 0");
    }

    // Validate transfer settings
    if config.transfer.batch_size == 0 {
        anyhow::bail!("transfer.batch_size must be > 0");
    }

    Ok(config)
}
