//! Database status and statistics reports.

use anyhow::{Context, Result};

use crate::schema::{TYPE_CUSTOMER, TYPE_EVENT, TYPE_ORDER, TYPE_PRODUCT};
use crate::store::{DocumentStore, FindQuery};

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.2} GiB", bytes / GIB)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes / MIB)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes / KIB)
    } else {
        format!("{} B", bytes)
    }
}

async fn count_by_type(store: &dyn DocumentStore, doc_type: &str) -> Result<usize> {
    let mut total = 0;
    let mut skip = 0;
    loop {
        let page = store
            .find(&FindQuery::by_type(doc_type).limit(1000).skip(skip))
            .await
            .with_context(|| format!("counting {} documents", doc_type))?;
        let fetched = page.docs.len();
        total += fetched;
        if fetched < 1000 {
            break;
        }
        skip += 1000;
    }
    Ok(total)
}

/// Quick connectivity check: can we reach the database, and what's in it.
pub async fn run_status(store: &dyn DocumentStore) -> Result<()> {
    let info = store
        .database_info()
        .await
        .context("reaching the database")?;
    println!("Database:   {}", info.name);
    println!("Documents:  {}", info.doc_count);
    println!("Reachable:  yes");
    for (label, doc_type) in [
        ("products", TYPE_PRODUCT),
        ("customers", TYPE_CUSTOMER),
        ("orders", TYPE_ORDER),
        ("events", TYPE_EVENT),
    ] {
        let count = count_by_type(store, doc_type).await?;
        println!("  {:<12} {}", label, count);
    }
    Ok(())
}

/// Full statistics report: database counters plus per-type document
/// counts.
pub async fn run_stats(store: &dyn DocumentStore) -> Result<()> {
    let info = store.database_info().await.context("reading database info")?;

    println!("Database statistics");
    println!("-------------------");
    println!("  {:<16} {}", "name", info.name);
    println!("  {:<16} {}", "documents", info.doc_count);
    println!("  {:<16} {}", "deleted", info.deleted_doc_count);
    println!("  {:<16} {}", "disk size", format_bytes(info.disk_size));
    println!();

    println!("Documents by type");
    println!("-----------------");
    for (label, doc_type) in [
        ("products", TYPE_PRODUCT),
        ("customers", TYPE_CUSTOMER),
        ("orders", TYPE_ORDER),
        ("events", TYPE_EVENT),
    ] {
        let count = count_by_type(store, doc_type).await?;
        println!("  {:<16} {:>6}", label, count);
    }
    Ok(())
}
