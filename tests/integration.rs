//! End-to-end tests over the in-memory store: the document gateway,
//! the analytics engine, and the transfer pipeline, exercised the way
//! the CLI drives them.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use sofa_admin::analytics::AnalyticsEngine;
use sofa_admin::sample;
use sofa_admin::schema::{
    Address, LineItem, Order, OrderStatus, Product, ProductStatus, TYPE_ORDER, TYPE_PRODUCT,
};
use sofa_admin::store::{DocumentStore, FindQuery, MemoryStore};
use sofa_admin::transfer::{self, Format};

fn order(customer: &str, total: f64, status: OrderStatus, lines: Vec<LineItem>) -> Value {
    let order = Order::new(customer, lines, total, status, Address::default()).unwrap();
    serde_json::to_value(&order).unwrap()
}

fn line(product_id: &str, name: &str, quantity: u32, unit_price: f64) -> LineItem {
    LineItem::new(product_id, name, quantity, unit_price).unwrap()
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    for product in sample::sample_products().unwrap() {
        store
            .create(serde_json::to_value(&product).unwrap())
            .await
            .unwrap();
    }
    for customer in sample::sample_customers().unwrap() {
        store
            .create(serde_json::to_value(&customer).unwrap())
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_document_lifecycle() {
    let store = MemoryStore::new();
    let product = Product::new(
        "Widget",
        "Tools",
        19.99,
        "A widget",
        ProductStatus::Active,
        Default::default(),
    )
    .unwrap();
    let id = product.id.clone();
    store
        .create(serde_json::to_value(&product).unwrap())
        .await
        .unwrap();

    // merge update bumps version and keeps untouched fields
    store
        .update(&id, json!({ "price": 24.99 }), true)
        .await
        .unwrap();
    let doc = store.read(&id).await.unwrap();
    assert_eq!(doc["price"], 24.99);
    assert_eq!(doc["name"], "Widget");
    assert_eq!(doc["version"], 2);

    // soft delete flags, the document stays readable
    store.delete(&id, true).await.unwrap();
    let doc = store.read(&id).await.unwrap();
    assert_eq!(doc["deleted"], true);
    assert_eq!(doc["version"], 3);

    // hard delete removes it
    store.delete(&id, false).await.unwrap();
    assert!(store.read(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_sales_summary_trusts_stored_totals() {
    let store = MemoryStore::new();
    // line items sum to 10 but the stored total says 999
    store
        .create(order(
            "customer_1",
            999.0,
            OrderStatus::Delivered,
            vec![line("product_1", "Widget", 1, 10.0)],
        ))
        .await
        .unwrap();
    store
        .create(order(
            "customer_1",
            1.0,
            OrderStatus::Pending,
            vec![line("product_1", "Widget", 1, 10.0)],
        ))
        .await
        .unwrap();

    let engine = AnalyticsEngine::new(&store);
    let summary = engine.sales_summary(30).await.unwrap();
    assert_eq!(summary.total_orders, 2);
    assert_eq!(summary.total_revenue, 1000.0);
    assert_eq!(summary.average_order_value, 500.0);
    assert_eq!(summary.orders_by_status.get("delivered"), Some(&1));
    assert_eq!(summary.orders_by_status.get("pending"), Some(&1));
}

#[tokio::test]
async fn test_sales_summary_empty_window() {
    let store = MemoryStore::new();
    let engine = AnalyticsEngine::new(&store);
    let summary = engine.sales_summary(30).await.unwrap();
    assert_eq!(summary.total_orders, 0);
    assert_eq!(summary.total_revenue, 0.0);
    // no division fault when there are no orders
    assert_eq!(summary.average_order_value, 0.0);
    assert!(summary.orders_by_status.is_empty());
}

#[tokio::test]
async fn test_top_products_counts_line_occurrences() {
    let store = MemoryStore::new();
    // the same product on two lines of one order counts twice
    store
        .create(order(
            "customer_1",
            60.0,
            OrderStatus::Delivered,
            vec![
                line("product_a", "Alpha", 2, 10.0),
                line("product_a", "Alpha", 1, 10.0),
                line("product_b", "Beta", 3, 10.0),
            ],
        ))
        .await
        .unwrap();

    let engine = AnalyticsEngine::new(&store);
    let ranked = engine.top_products(10).await.unwrap();
    let alpha = ranked.iter().find(|p| p.product_id == "product_a").unwrap();
    assert_eq!(alpha.order_count, 2);
    assert_eq!(alpha.total_quantity, 3);
    assert_eq!(alpha.total_revenue, 30.0);
    let beta = ranked.iter().find(|p| p.product_id == "product_b").unwrap();
    assert_eq!(beta.order_count, 1);
    assert_eq!(beta.total_quantity, 3);
    // equal quantities keep encounter order: alpha first
    assert_eq!(ranked[0].product_id, "product_a");
}

#[tokio::test]
async fn test_top_products_ranks_by_quantity() {
    let store = MemoryStore::new();
    for (i, quantity) in [1u32, 5, 3, 2, 4].iter().enumerate() {
        store
            .create(order(
                "customer_1",
                10.0,
                OrderStatus::Delivered,
                vec![line(&format!("product_{}", i), "P", *quantity, 1.0)],
            ))
            .await
            .unwrap();
    }
    let engine = AnalyticsEngine::new(&store);
    let ranked = engine.top_products(3).await.unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].total_quantity, 5);
    assert_eq!(ranked[1].total_quantity, 4);
    assert_eq!(ranked[2].total_quantity, 3);
}

#[tokio::test]
async fn test_customer_analytics_zero_orders() {
    let store = seeded_store().await;
    let engine = AnalyticsEngine::new(&store);
    let report = engine.customer_analytics().await.unwrap();
    assert_eq!(report.total_customers, 3);
    assert_eq!(report.active_customers, 0);
    assert_eq!(report.average_orders_per_customer, 0.0);
    for c in &report.customers {
        assert_eq!(c.total_orders, 0);
        assert_eq!(c.total_spent, 0.0);
        assert!(c.last_order_date.is_none());
    }
}

#[tokio::test]
async fn test_customer_analytics_last_order_and_activity() {
    let store = seeded_store().await;
    let customers = sample::sample_customers().unwrap();
    let alice = &customers[0].id;

    let mut first = order(alice, 10.0, OrderStatus::Delivered, vec![line("p", "P", 1, 10.0)]);
    first["created_at"] = json!("2024-01-01T00:00:00.000000Z");
    store.create(first).await.unwrap();
    let mut second = order(alice, 20.0, OrderStatus::Pending, vec![line("p", "P", 1, 20.0)]);
    second["created_at"] = json!("2024-06-01T00:00:00.000000Z");
    store.create(second).await.unwrap();

    // seeded_store built its own customer ids; register the generated ones
    for customer in &customers {
        store
            .create(serde_json::to_value(customer).unwrap())
            .await
            .unwrap();
    }

    let engine = AnalyticsEngine::new(&store);
    let report = engine.customer_analytics().await.unwrap();
    let metrics = report
        .customers
        .iter()
        .find(|c| &c.customer_id == alice)
        .unwrap();
    assert_eq!(metrics.total_orders, 2);
    assert_eq!(metrics.total_spent, 30.0);
    assert_eq!(
        metrics.last_order_date.as_deref(),
        Some("2024-06-01T00:00:00.000000Z")
    );
    assert_eq!(report.active_customers, 1);
}

#[tokio::test]
async fn test_product_performance_histogram_and_prices() {
    let store = seeded_store().await;
    let engine = AnalyticsEngine::new(&store);
    let report = engine.product_performance().await.unwrap();
    assert_eq!(report.total_products, 5);
    let histogram_sum: usize = report.categories.values().sum();
    assert_eq!(histogram_sum, report.total_products);
    assert_eq!(report.categories.get("Electronics"), Some(&2));
    assert_eq!(report.categories.get("Home & Kitchen"), Some(&2));

    let stats = report.price_stats.unwrap();
    assert_eq!(stats.min, 35.99);
    assert_eq!(stats.max, 699.99);
}

#[tokio::test]
async fn test_price_stats_all_zero_vs_no_products() {
    // no products at all: no statistics
    let empty = MemoryStore::new();
    let report = AnalyticsEngine::new(&empty)
        .product_performance()
        .await
        .unwrap();
    assert_eq!(report.total_products, 0);
    assert!(report.price_stats.is_none());

    // every product priced at zero: zeroed statistics, not absent
    let zeroed = MemoryStore::new();
    for i in 0..3 {
        let product = Product::new(
            &format!("Freebie {}", i),
            "Free",
            0.0,
            "",
            ProductStatus::Active,
            Default::default(),
        )
        .unwrap();
        zeroed
            .create(serde_json::to_value(&product).unwrap())
            .await
            .unwrap();
    }
    let report = AnalyticsEngine::new(&zeroed)
        .product_performance()
        .await
        .unwrap();
    assert_eq!(report.total_products, 3);
    let stats = report.price_stats.unwrap();
    assert_eq!((stats.min, stats.max, stats.mean), (0.0, 0.0, 0.0));
}

#[tokio::test]
async fn test_zero_priced_products_excluded_from_categories() {
    let store = seeded_store().await;
    let freebie = Product::new(
        "Free Sampler",
        "Electronics",
        0.0,
        "",
        ProductStatus::Active,
        Default::default(),
    )
    .unwrap();
    store
        .create(serde_json::to_value(&freebie).unwrap())
        .await
        .unwrap();

    let engine = AnalyticsEngine::new(&store);
    let categories = engine.category_breakdown().await.unwrap();
    let electronics = categories
        .iter()
        .find(|c| c.category == "Electronics")
        .unwrap();
    // the catalog has two priced Electronics products; the freebie is
    // filtered by the view's truthiness guard
    assert_eq!(electronics.product_count, 2);
    assert_eq!(electronics.total_value, 899.98);
    assert_eq!(electronics.average_price, 449.99);
}

#[tokio::test]
async fn test_sales_by_month_groups_and_buckets() {
    let store = MemoryStore::new();
    for (total, status) in [
        (100.0, OrderStatus::Delivered),
        (50.0, OrderStatus::Pending),
        (25.0, OrderStatus::Cancelled),
    ] {
        let mut doc = order("customer_1", total, status, vec![line("p", "P", 1, total)]);
        doc["created_at"] = json!("2024-05-10T12:00:00.000000Z");
        store.create(doc).await.unwrap();
    }
    let mut older = order(
        "customer_1",
        10.0,
        OrderStatus::Delivered,
        vec![line("p", "P", 1, 10.0)],
    );
    older["created_at"] = json!("2024-04-01T12:00:00.000000Z");
    store.create(older).await.unwrap();

    let engine = AnalyticsEngine::new(&store);
    let months = engine.sales_by_month().await.unwrap();
    assert_eq!(months.len(), 2);
    let may = months.iter().find(|m| m.month == "2024-05").unwrap();
    assert_eq!(may.order_count, 3);
    assert_eq!(may.total, 175.0);
    assert_eq!(may.delivered, 1);
    assert_eq!(may.pending, 1);
    assert_eq!(may.cancelled, 1);
}

#[tokio::test]
async fn test_recent_activity_caps_events() {
    let store = seeded_store().await;
    let products = sample::sample_products().unwrap();
    let customers = sample::sample_customers().unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let orders = sample::generate_orders(&mut rng, &customers, &products, 5).unwrap();
    let events = sample::generate_events(&mut rng, &customers, &products, &orders, 60).unwrap();
    for event in &events {
        store
            .create(serde_json::to_value(event).unwrap())
            .await
            .unwrap();
    }

    let engine = AnalyticsEngine::new(&store);
    let activity = engine.recent_activity(31).await.unwrap();
    assert!(activity.events.len() <= 20);
    // newest first
    for pair in activity.events.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
}

#[tokio::test]
async fn test_recent_activity_orders_events_client_side() {
    use chrono::{Duration, SecondsFormat, Utc};

    let store = MemoryStore::new();
    // insertion order and id order both disagree with timestamp order,
    // so any ordering in the result comes from the report itself
    for (i, minutes_ago) in [40i64, 5, 90, 15, 60].iter().enumerate() {
        store
            .create(json!({
                "_id": format!("event_{}", i),
                "type": "analytics_event",
                "event_type": "product_view",
                "entity_type": "product",
                "entity_id": "product_1",
                "timestamp": (Utc::now() - Duration::minutes(*minutes_ago))
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            }))
            .await
            .unwrap();
    }

    let engine = AnalyticsEngine::new(&store);
    let activity = engine.recent_activity(1).await.unwrap();
    assert_eq!(activity.events.len(), 5);
    for pair in activity.events.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
    // the newest event (5 minutes ago) leads
    assert_eq!(activity.events[0].timestamp, {
        let mut timestamps: Vec<String> =
            activity.events.iter().map(|e| e.timestamp.clone()).collect();
        timestamps.sort();
        timestamps.pop().unwrap()
    });
}

#[tokio::test]
async fn test_seed_pipeline_loads_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sofa_admin::config::Config::default();
    config.sample.snapshot_path = dir.path().join("snapshot.json");

    let store = MemoryStore::new();
    let mut rng = StdRng::seed_from_u64(11);
    sample::run_seed(&store, &config, &mut rng, 10, 40)
        .await
        .unwrap();

    let info = store.database_info().await.unwrap();
    // 5 products + 3 customers + 10 orders + 40 events
    assert_eq!(info.doc_count, 58);

    let snapshot: Value =
        serde_json::from_str(&std::fs::read_to_string(&config.sample.snapshot_path).unwrap())
            .unwrap();
    assert_eq!(snapshot["products"].as_array().unwrap().len(), 5);
    assert_eq!(snapshot["orders"].as_array().unwrap().len(), 10);
    assert_eq!(snapshot["events"].as_array().unwrap().len(), 40);
}

#[tokio::test]
async fn test_export_import_json_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.json");

    let source = seeded_store().await;
    let count = transfer::export(&source, &path, Format::Json, Some(TYPE_PRODUCT), 1000)
        .await
        .unwrap();
    assert_eq!(count, 5);

    let target = MemoryStore::new();
    let report = transfer::import(&target, &path, Format::Json, 2, false)
        .await
        .unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.success_count, 5);
    assert_eq!(report.error_count, 0);

    let page = target
        .find(&FindQuery::by_type(TYPE_PRODUCT).limit(100))
        .await
        .unwrap();
    assert_eq!(page.docs.len(), 5);
}

#[tokio::test]
async fn test_export_csv_revives_nested_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.csv");

    let source = seeded_store().await;
    transfer::export(&source, &path, Format::Csv, Some(TYPE_PRODUCT), 1000)
        .await
        .unwrap();

    let target = MemoryStore::new();
    let report = transfer::import(&target, &path, Format::Csv, 100, false)
        .await
        .unwrap();
    assert_eq!(report.success_count, 5);

    let page = target
        .find(&FindQuery::by_type(TYPE_PRODUCT).limit(100))
        .await
        .unwrap();
    let smartphone = page
        .docs
        .iter()
        .find(|d| d["name"] == "Smartphone XY Pro")
        .unwrap();
    // nested metadata went through CSV as a JSON string and came back
    // as an object
    assert_eq!(smartphone["metadata"]["brand"], "TechCorp");
    assert!(smartphone["search_keywords"].is_array());
}

#[tokio::test]
async fn test_export_empty_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    let store = MemoryStore::new();
    assert!(
        transfer::export(&store, &path, Format::Json, Some(TYPE_ORDER), 1000)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_import_conflicts_without_update_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.json");

    let source = seeded_store().await;
    transfer::export(&source, &path, Format::Json, Some(TYPE_PRODUCT), 1000)
        .await
        .unwrap();

    // importing into the same store: every id conflicts
    let report = transfer::import(&source, &path, Format::Json, 100, false)
        .await
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert_eq!(report.error_count, 5);
}

#[tokio::test]
async fn test_import_update_existing_replaces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("products.json");

    let source = seeded_store().await;
    transfer::export(&source, &path, Format::Json, Some(TYPE_PRODUCT), 1000)
        .await
        .unwrap();

    let report = transfer::import(&source, &path, Format::Json, 100, true)
        .await
        .unwrap();
    assert_eq!(report.success_count, 5);
    assert_eq!(report.error_count, 0);

    // replaced documents carry a bumped version
    let page = source
        .find(&FindQuery::by_type(TYPE_PRODUCT).limit(100))
        .await
        .unwrap();
    for doc in &page.docs {
        assert_eq!(doc["version"], 2);
    }
}

#[tokio::test]
async fn test_bulk_create_partial_failure_counts() {
    let store = MemoryStore::new();
    for i in 0..3 {
        store
            .create(json!({ "_id": format!("taken_{}", i), "type": "product" }))
            .await
            .unwrap();
    }

    let mut docs: Vec<Value> = (0..7)
        .map(|i| json!({ "_id": format!("fresh_{}", i), "type": "product" }))
        .collect();
    for i in 0..3 {
        docs.push(json!({ "_id": format!("taken_{}", i), "type": "product" }));
    }

    let summary = store.bulk_create(docs).await.unwrap();
    assert_eq!(summary.total, 10);
    assert_eq!(summary.success_count, 7);
    assert_eq!(summary.error_count, 3);
}

#[tokio::test]
async fn test_csv_import_mixed_category_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.csv");
    // row 1 carries a JSON-object-shaped category, row 2 a plain string
    std::fs::write(
        &path,
        "_id,type,category,name\n\
         product_x,product,\"{\"\"a\"\":1}\",X\n\
         product_y,product,Tools,Y\n",
    )
    .unwrap();

    let store = MemoryStore::new();
    let report = transfer::import(&store, &path, Format::Csv, 100, false)
        .await
        .unwrap();
    assert_eq!(report.success_count, 2);

    let x = store.read("product_x").await.unwrap();
    assert_eq!(x["category"], json!({ "a": 1 }));
    let y = store.read("product_y").await.unwrap();
    assert_eq!(y["category"], json!("Tools"));
}

#[tokio::test]
async fn test_backup_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.json");

    let source = seeded_store().await;
    let count = transfer::backup(&source, &path, 1000).await.unwrap();
    assert_eq!(count, 8);

    let metadata: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("backup_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["doc_count"], 8);
    assert!(metadata["backed_up_at"].is_string());

    // restore refuses without confirmation
    let target = MemoryStore::new();
    assert!(transfer::restore(&target, &path, 100, false).await.is_err());

    let report = transfer::restore(&target, &path, 100, true).await.unwrap();
    assert_eq!(report.success_count, 8);
    assert_eq!(target.database_info().await.unwrap().doc_count, 8);
}
