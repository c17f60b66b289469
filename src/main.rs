//! `sofa` command-line entry point.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sofa_admin::analytics::AnalyticsEngine;
use sofa_admin::config::load_config;
use sofa_admin::sample;
use sofa_admin::stats;
use sofa_admin::store::{CouchStore, DocumentStore};
use sofa_admin::transfer::{self, Format};
use sofa_admin::views;

#[derive(Parser)]
#[command(name = "sofa", version, about = "CouchDB administration and analytics")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "config/sofa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, Mango indexes, and analytics views.
    Init,
    /// Load sample products, customers, orders, and events.
    Seed {
        /// Number of orders to generate.
        #[arg(long)]
        orders: Option<usize>,
        /// Number of analytics events to generate.
        #[arg(long)]
        events: Option<usize>,
        /// Seed for the random generator, for reproducible data.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Quick connectivity check.
    Status,
    /// Database statistics and per-type document counts.
    Stats,
    /// Run an analytics report.
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
    /// Fetch a document by id.
    Get { id: String },
    /// Delete a document by id.
    Delete {
        id: String,
        /// Flag the document as deleted instead of removing it.
        #[arg(long)]
        soft: bool,
        /// Required for hard deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Export documents to a file.
    Export {
        output: PathBuf,
        /// Output format (json or csv); inferred from the extension
        /// when omitted.
        #[arg(long)]
        format: Option<String>,
        /// Restrict the export to one document type.
        #[arg(long)]
        doc_type: Option<String>,
        /// Documents per page when reading from the database.
        #[arg(long)]
        batch_size: Option<i64>,
    },
    /// Import documents from a file.
    Import {
        input: PathBuf,
        /// Input format (json or csv); inferred from the extension
        /// when omitted.
        #[arg(long)]
        format: Option<String>,
        /// Replace documents whose ids already exist.
        #[arg(long)]
        update: bool,
        /// Documents per bulk insert batch.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Back up every document plus a metadata sidecar.
    Backup { output: PathBuf },
    /// Restore a backup, replacing existing documents.
    Restore {
        input: PathBuf,
        /// Required: restore overwrites existing documents.
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Revenue and order counts over a trailing window.
    Summary {
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Best-selling products by revenue.
    TopProducts {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Per-customer spend metrics.
    Customers {
        #[arg(long)]
        json: bool,
    },
    /// Per-product engagement funnel from the event stream.
    Products {
        #[arg(long)]
        json: bool,
    },
    /// Recent orders and events.
    Recent {
        #[arg(long, default_value_t = 7)]
        days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Monthly revenue rollup (map/reduce view).
    SalesByMonth {
        #[arg(long)]
        json: bool,
    },
    /// Product counts and prices per category (map/reduce view).
    Categories {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = CouchStore::new(&config.couchdb)?;

    match cli.command {
        Commands::Init => {
            store.ensure_database().await?;
            for (name, fields) in [
                ("type-index", &["type"][..]),
                ("type-category-index", &["type", "category"][..]),
                ("type-created-index", &["type", "created_at"][..]),
                ("type-timestamp-index", &["type", "timestamp"][..]),
                ("type-customer-index", &["type", "customer_id"][..]),
            ] {
                store.ensure_index(name, fields).await?;
            }
            views::register_views(&store).await?;
            println!("Database {} ready", config.couchdb.database);
        }
        Commands::Seed { orders, events, seed } => {
            let order_count = orders.unwrap_or(config.sample.orders);
            let event_count = events.unwrap_or(config.sample.events);
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            sample::run_seed(&store, &config, &mut rng, order_count, event_count).await?;
        }
        Commands::Status => stats::run_status(&store).await?,
        Commands::Stats => stats::run_stats(&store).await?,
        Commands::Report { report } => run_report(&store, report).await?,
        Commands::Get { id } => {
            let doc = store.read(&id).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Delete { id, soft, yes } => {
            if !soft && !yes {
                bail!("hard deletion is irreversible; pass --yes to confirm or --soft to flag instead");
            }
            let write = store.delete(&id, soft).await?;
            if soft {
                println!("Flagged {} as deleted (rev {})", write.id, write.rev);
            } else {
                println!("Deleted {}", write.id);
            }
        }
        Commands::Export { output, format, doc_type, batch_size } => {
            let format = match format {
                Some(f) => Format::from_str(&f)?,
                None => Format::from_path(&output),
            };
            let count = transfer::export(
                &store,
                &output,
                format,
                doc_type.as_deref(),
                batch_size.unwrap_or(config.transfer.batch_size as i64),
            )
            .await?;
            println!("Exported {} documents to {}", count, output.display());
        }
        Commands::Import { input, format, update, batch_size } => {
            let format = match format {
                Some(f) => Format::from_str(&f)?,
                None => Format::from_path(&input),
            };
            let report = transfer::import(
                &store,
                &input,
                format,
                batch_size.unwrap_or(config.transfer.batch_size),
                update,
            )
            .await?;
            println!(
                "Imported {} of {} documents ({} failed)",
                report.success_count, report.total, report.error_count
            );
        }
        Commands::Backup { output } => {
            let count =
                transfer::backup(&store, &output, config.transfer.batch_size as i64).await?;
            println!("Backed up {} documents to {}", count, output.display());
        }
        Commands::Restore { input, confirm } => {
            let report =
                transfer::restore(&store, &input, config.transfer.batch_size, confirm).await?;
            println!(
                "Restored {} of {} documents ({} failed)",
                report.success_count, report.total, report.error_count
            );
        }
    }
    Ok(())
}

async fn run_report(store: &dyn DocumentStore, report: ReportKind) -> Result<()> {
    let engine = AnalyticsEngine::new(store);
    match report {
        ReportKind::Summary { days, json } => {
            let summary = engine.sales_summary(days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!("Sales summary (last {} days)", summary.window_days);
            println!("----------------------------");
            println!("  {:<18} {}", "orders", summary.total_orders);
            println!("  {:<18} {:.2}", "total revenue", summary.total_revenue);
            println!("  {:<18} {:.2}", "avg order value", summary.average_order_value);
            let mut statuses: Vec<_> = summary.orders_by_status.iter().collect();
            statuses.sort();
            for (status, count) in statuses {
                println!("  {:<18} {}", status, count);
            }
        }
        ReportKind::TopProducts { limit, json } => {
            let products = engine.top_products(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&products)?);
                return Ok(());
            }
            println!("{:<30} {:>8} {:>10} {:>8}", "product", "qty", "revenue", "orders");
            for p in products {
                println!(
                    "{:<30} {:>8} {:>10.2} {:>8}",
                    p.product_name, p.total_quantity, p.total_revenue, p.order_count
                );
            }
        }
        ReportKind::Customers { json } => {
            let report = engine.customer_analytics().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!(
                "{} customers, {} active, {:.2} orders each on average",
                report.total_customers, report.active_customers, report.average_orders_per_customer
            );
            println!();
            println!("{:<24} {:>8} {:>12}  {}", "customer", "orders", "spent", "last order");
            for c in report.customers {
                println!(
                    "{:<24} {:>8} {:>12.2}  {}",
                    c.name,
                    c.total_orders,
                    c.total_spent,
                    c.last_order_date.as_deref().unwrap_or("-")
                );
            }
        }
        ReportKind::Products { json } => {
            let report = engine.product_performance().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!("Products: {}", report.total_products);
            let mut categories: Vec<_> = report.categories.iter().collect();
            categories.sort();
            for (category, count) in categories {
                println!("  {:<20} {:>6}", category, count);
            }
            match report.price_stats {
                Some(stats) => println!(
                    "Prices: min {:.2}, max {:.2}, mean {:.2}",
                    stats.min, stats.max, stats.mean
                ),
                None => println!("Prices: no products"),
            }
        }
        ReportKind::Recent { days, json } => {
            let activity = engine.recent_activity(days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&activity)?);
                return Ok(());
            }
            println!("Activity (last {} days)", activity.window_days);
            println!("-----------------------");
            println!(
                "  {} orders, {:.2} revenue",
                activity.order_count, activity.order_revenue
            );
            for order in activity.orders.iter().take(10) {
                println!(
                    "  {:<12} {:>10.2}  {}",
                    order.status, order.total, order.created_at
                );
            }
            println!();
            println!("  {} recent events", activity.events.len());
            for event in &activity.events {
                println!(
                    "  {:<16} {:<10} {}",
                    event.event_type, event.entity_type, event.timestamp
                );
            }
        }
        ReportKind::SalesByMonth { json } => {
            let months = engine.sales_by_month().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&months)?);
                return Ok(());
            }
            println!(
                "{:<9} {:>10} {:>8} {:>10} {:>8} {:>10}",
                "month", "revenue", "orders", "delivered", "pending", "cancelled"
            );
            for m in months {
                println!(
                    "{:<9} {:>10.2} {:>8} {:>10} {:>8} {:>10}",
                    m.month, m.total, m.order_count, m.delivered, m.pending, m.cancelled
                );
            }
        }
        ReportKind::Categories { json } => {
            let categories = engine.category_breakdown().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
                return Ok(());
            }
            println!("{:<20} {:>9} {:>12} {:>10}", "category", "products", "value", "avg");
            for c in categories {
                println!(
                    "{:<20} {:>9} {:>12.2} {:>10.2}",
                    c.category, c.product_count, c.total_value, c.average_price
                );
            }
        }
    }
    Ok(())
}
