//! Bulk transfer: export, import, backup, and restore.
//!
//! This is the application layer above the store, so errors are
//! `anyhow` with context rather than the store's taxonomy. Documents
//! move in batches; a batch that partially fails is recorded and the
//! transfer continues.

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

use crate::schema::now_iso;
use crate::store::{DocumentStore, FindQuery};

/// Serialization format for a transfer file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            other => bail!("unsupported format: {} (expected json or csv)", other),
        }
    }

    /// Guess from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Format::Csv,
            _ => Format::Json,
        }
    }
}

/// Counters for a completed transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
}

/// Pull every document (optionally one `type`) from the store in
/// `batch_size` pages.
async fn fetch_documents(
    store: &dyn DocumentStore,
    doc_type: Option<&str>,
    batch_size: i64,
) -> Result<Vec<Value>> {
    let selector = match doc_type {
        Some(doc_type) => json!({ "type": doc_type }),
        None => json!({ "_id": { "$gt": null } }),
    };

    let mut docs = Vec::new();
    let mut skip = 0;
    loop {
        let query = FindQuery::new(selector.clone()).limit(batch_size).skip(skip);
        let page = store
            .find(&query)
            .await
            .context("fetching documents for export")?;
        let fetched = page.docs.len();
        docs.extend(page.docs);
        if (fetched as i64) < batch_size {
            break;
        }
        skip += batch_size;
    }
    Ok(docs)
}

/// Export documents to `output`. Fails when nothing matches — an empty
/// export file is more likely a mistake than an intent.
pub async fn export(
    store: &dyn DocumentStore,
    output: &Path,
    format: Format,
    doc_type: Option<&str>,
    batch_size: i64,
) -> Result<usize> {
    let docs = fetch_documents(store, doc_type, batch_size).await?;
    if docs.is_empty() {
        bail!(
            "no documents to export{}",
            doc_type.map(|t| format!(" of type {}", t)).unwrap_or_default()
        );
    }

    match format {
        Format::Json => {
            let body = serde_json::to_string_pretty(&docs)?;
            std::fs::write(output, body)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        Format::Csv => write_csv(&docs, output)?,
    }
    tracing::info!(count = docs.len(), path = %output.display(), "export complete");
    Ok(docs.len())
}

/// CSV export: columns are the sorted union of every document's
/// top-level keys. Nested values are JSON-stringified, null becomes the
/// empty string.
fn write_csv(docs: &[Value], output: &Path) -> Result<()> {
    let mut columns: BTreeSet<String> = BTreeSet::new();
    for doc in docs {
        if let Some(obj) = doc.as_object() {
            columns.extend(obj.keys().cloned());
        }
    }
    let columns: Vec<String> = columns.into_iter().collect();

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    writer.write_record(&columns)?;
    for doc in docs {
        let record: Vec<String> = columns
            .iter()
            .map(|column| match doc.get(column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a transfer file back into document values.
fn read_documents(input: &Path, format: Format) -> Result<Vec<Value>> {
    match format {
        Format::Json => {
            let body = std::fs::read_to_string(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let parsed: Value = serde_json::from_str(&body)
                .with_context(|| format!("parsing {}", input.display()))?;
            match parsed {
                Value::Array(docs) => Ok(docs),
                single @ Value::Object(_) => Ok(vec![single]),
                _ => bail!("{}: expected a JSON array of documents", input.display()),
            }
        }
        Format::Csv => {
            let mut reader = csv::Reader::from_path(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let headers = reader.headers()?.clone();
            let mut docs = Vec::new();
            for record in reader.records() {
                let record = record?;
                let mut doc = Map::new();
                for (header, field) in headers.iter().zip(record.iter()) {
                    if field.is_empty() {
                        continue;
                    }
                    doc.insert(header.to_string(), revive_csv_value(field));
                }
                docs.push(Value::Object(doc));
            }
            Ok(docs)
        }
    }
}

/// CSV flattens everything to strings; values that look like JSON
/// containers are parsed back, everything else stays a string.
fn revive_csv_value(field: &str) -> Value {
    if field.starts_with('{') || field.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str(field) {
            return parsed;
        }
    }
    Value::String(field.to_string())
}

/// Import documents from `input` in `batch_size` chunks. Stale `_rev`
/// fields are stripped so documents land as fresh writes. With
/// `update_existing`, a conflicting `_id` is resolved by replacing the
/// stored document; otherwise the conflict is counted as an error.
pub async fn import(
    store: &dyn DocumentStore,
    input: &Path,
    format: Format,
    batch_size: usize,
    update_existing: bool,
) -> Result<TransferReport> {
    let mut docs = read_documents(input, format)?;
    for doc in &mut docs {
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("_rev");
        }
    }

    let mut report = TransferReport {
        total: docs.len(),
        ..TransferReport::default()
    };

    for chunk in docs.chunks(batch_size.max(1)) {
        let summary = match store.bulk_create(chunk.to_vec()).await {
            Ok(summary) => summary,
            Err(err) => {
                // a failed batch doesn't abort the transfer
                tracing::warn!(size = chunk.len(), error = %err, "batch failed");
                report.error_count += chunk.len();
                continue;
            }
        };
        report.success_count += summary.success_count;

        for outcome in summary.outcomes.iter().filter(|o| !o.ok) {
            let conflicted = outcome.error.as_deref() == Some("conflict");
            let id = outcome.id.as_deref();
            if update_existing && conflicted {
                if let Some(id) = id {
                    let original = chunk.iter().find(|doc| {
                        doc.get("_id").and_then(Value::as_str) == Some(id)
                    });
                    match original {
                        Some(doc) => match store.update(id, doc.clone(), false).await {
                            Ok(_) => {
                                report.success_count += 1;
                                continue;
                            }
                            Err(err) => {
                                tracing::warn!(id = id, error = %err, "update failed");
                            }
                        },
                        None => {}
                    }
                }
            }
            report.error_count += 1;
        }
    }
    tracing::info!(
        total = report.total,
        ok = report.success_count,
        failed = report.error_count,
        "import complete"
    );
    Ok(report)
}

/// Full-database backup: a JSON export of every document plus a
/// metadata sidecar (`foo.json` gets `foo_metadata.json`) recording
/// where and when the backup was taken.
pub async fn backup(store: &dyn DocumentStore, output: &Path, batch_size: i64) -> Result<usize> {
    let count = export(store, output, Format::Json, None, batch_size).await?;

    let info = store
        .database_info()
        .await
        .context("reading database info for backup metadata")?;
    let metadata = json!({
        "database": info.name,
        "doc_count": count,
        "backed_up_at": now_iso(),
    });

    let metadata_path = sidecar_path(output);
    std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing {}", metadata_path.display()))?;
    Ok(count)
}

fn sidecar_path(output: &Path) -> std::path::PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("backup");
    output.with_file_name(format!("{}_metadata.json", stem))
}

/// Restore a backup file into the database, replacing documents that
/// already exist. Destructive, so the caller must pass `confirm`.
pub async fn restore(
    store: &dyn DocumentStore,
    input: &Path,
    batch_size: usize,
    confirm: bool,
) -> Result<TransferReport> {
    if !confirm {
        bail!("restore overwrites existing documents; pass --confirm to proceed");
    }
    import(store, input, Format::Json, batch_size, true).await
}
