//! Sample data pipeline: clean, validate, enrich, load, verify.
//!
//! The fixed catalog (five products, three customers) comes first, then
//! orders and analytics events are generated against it. Generators take
//! an explicit `Rng` so tests can seed them.

use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Timelike, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::schema::{
    validate_email, Address, AnalyticsEvent, Customer, EntityRef, LineItem, Order, OrderStatus,
    Product, ProductStatus, KNOWN_EVENT_TYPES, TYPE_CUSTOMER, TYPE_EVENT, TYPE_ORDER,
    TYPE_PRODUCT,
};
use crate::store::{DocumentStore, FindQuery};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The fixed product catalog, cleaned and enriched.
pub fn sample_products() -> Result<Vec<Product>> {
    let raw: [(&str, &str, f64, &str, Value); 5] = [
        (
            "Smartphone XY Pro",
            "Electronics",
            699.99,
            "Latest smartphone with advanced features",
            json!({ "brand": "TechCorp", "warranty": "2 years", "color": "Black" }),
        ),
        (
            "Coffee Maker Deluxe",
            "Home & Kitchen",
            89.99,
            "Programmable coffee maker with timer",
            json!({ "capacity": "12 cups", "material": "Stainless Steel" }),
        ),
        (
            "Wireless Headphones",
            "Electronics",
            199.99,
            "Noise-canceling wireless headphones",
            json!({ "battery_life": "30 hours", "wireless": true }),
        ),
        (
            "Yoga Mat Premium",
            "Sports & Fitness",
            49.99,
            "Non-slip yoga mat with carrying strap",
            json!({ "thickness": "6mm", "material": "TPE" }),
        ),
        (
            "LED Desk Lamp",
            "Home & Kitchen",
            35.99,
            "Adjustable LED desk lamp with USB charging",
            json!({ "power": "12W", "adjustable": true }),
        ),
    ];

    let mut products = Vec::with_capacity(raw.len());
    for (name, category, price, description, metadata) in raw {
        let metadata: Map<String, Value> = serde_json::from_value(metadata)?;
        let mut product = Product::new(
            name,
            category,
            price,
            description,
            ProductStatus::Active,
            metadata,
        )?;
        product.enrich();
        products.push(product);
    }
    Ok(products)
}

/// The fixed customers, validated through the schema constructors.
pub fn sample_customers() -> Result<Vec<Customer>> {
    let raw = [
        (
            "Alice Johnson",
            "alice.johnson@email.com",
            "+1-555-0101",
            ("123 Main St", "New York", "10001"),
        ),
        (
            "Bob Smith",
            "bob.smith@email.com",
            "+1-555-0102",
            ("456 Oak Ave", "Los Angeles", "90210"),
        ),
        (
            "Carol Davis",
            "carol.davis@email.com",
            "+1-555-0103",
            ("789 Pine St", "Chicago", "60601"),
        ),
    ];

    let mut customers = Vec::with_capacity(raw.len());
    for (name, email, phone, (street, city, zip)) in raw {
        if !validate_email(email) {
            tracing::warn!(name = name, email = email, "skipping customer with invalid email");
            continue;
        }
        let address = Address {
            street: street.to_string(),
            city: city.to_string(),
            zip: zip.to_string(),
            country: "USA".to_string(),
        };
        customers.push(Customer::new(name, email, phone, address, Map::new())?);
    }
    Ok(customers)
}

/// Generate `count` orders against the catalog: one to four lines each,
/// quantities one to three, and roughly seventy percent backdated up to
/// ninety days so the analytics windows have history to report on.
pub fn generate_orders(
    rng: &mut impl Rng,
    customers: &[Customer],
    products: &[Product],
    count: usize,
) -> Result<Vec<Order>> {
    let mut orders = Vec::with_capacity(count);
    for _ in 0..count {
        let customer = customers
            .choose(rng)
            .context("order generation needs at least one customer")?;

        let line_count = rng.gen_range(1..=4);
        let mut lines = Vec::with_capacity(line_count);
        let mut total = 0.0;
        for _ in 0..line_count {
            let product = products
                .choose(rng)
                .context("order generation needs at least one product")?;
            let quantity = rng.gen_range(1..=3);
            let line = LineItem::new(&product.id, &product.name, quantity, product.price)?;
            total += line.total_price;
            lines.push(line);
        }

        let status = *OrderStatus::ALL
            .choose(rng)
            .unwrap_or(&OrderStatus::Pending);
        let mut order = Order::new(
            &customer.id,
            lines,
            round2(total),
            status,
            customer.address.clone(),
        )?;

        if rng.gen_bool(0.7) {
            let days_ago = rng.gen_range(1..=90);
            let backdated = (Utc::now() - Duration::days(days_ago))
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            order.created_at = backdated.clone();
            order.updated_at = backdated;
        }
        orders.push(order);
    }
    Ok(orders)
}

/// Generate `count` analytics events over the trailing thirty days.
/// Purchases reference an order; everything else references a product.
/// Timestamps land in waking hours (08:00 to 22:00).
pub fn generate_events(
    rng: &mut impl Rng,
    customers: &[Customer],
    products: &[Product],
    orders: &[Order],
    count: usize,
) -> Result<Vec<AnalyticsEvent>> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let event_type = *KNOWN_EVENT_TYPES
            .choose(rng)
            .unwrap_or(&"product_view");
        let customer = customers
            .choose(rng)
            .context("event generation needs at least one customer")?;

        let (entity, data) = if event_type == "purchase" {
            let order = orders
                .choose(rng)
                .context("purchase events need at least one order")?;
            let data: Map<String, Value> = serde_json::from_value(json!({
                "order_total": order.total,
                "product_count": order.products.len(),
            }))?;
            (EntityRef::Order(order.id.clone()), data)
        } else {
            let product = products
                .choose(rng)
                .context("event generation needs at least one product")?;
            let data: Map<String, Value> = serde_json::from_value(json!({
                "product_name": product.name,
                "product_category": product.category,
                "product_price": product.price,
            }))?;
            (EntityRef::Product(product.id.clone()), data)
        };

        let mut event =
            AnalyticsEvent::new(event_type, entity, data, Some(customer.id.clone()))?;

        let days_ago = rng.gen_range(0..=30);
        let hour = rng.gen_range(8..=22);
        let when = (Utc::now() - Duration::days(days_ago))
            .with_hour(hour)
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        event.timestamp = when.clone();
        event.created_at = when;
        events.push(event);
    }
    Ok(events)
}

async fn count_by_type(store: &dyn DocumentStore, doc_type: &str) -> Result<usize> {
    let mut total = 0;
    let mut skip = 0;
    loop {
        let page = store
            .find(&FindQuery::by_type(doc_type).limit(1000).skip(skip))
            .await?;
        let fetched = page.docs.len();
        total += fetched;
        if fetched < 1000 {
            break;
        }
        skip += 1000;
    }
    Ok(total)
}

/// Run the whole pipeline: build and load the catalog, generate orders
/// and events, verify the loaded counts, and write a JSON snapshot of
/// everything inserted.
pub async fn run_seed(
    store: &dyn DocumentStore,
    config: &Config,
    rng: &mut impl Rng,
    order_count: usize,
    event_count: usize,
) -> Result<()> {
    println!("Seeding sample data");
    println!("-------------------");

    let products = sample_products()?;
    let customers = sample_customers()?;
    let orders = generate_orders(rng, &customers, &products, order_count)?;
    let events = generate_events(rng, &customers, &products, &orders, event_count)?;

    let mut docs: Vec<Value> = Vec::new();
    for product in &products {
        docs.push(serde_json::to_value(product)?);
    }
    for customer in &customers {
        docs.push(serde_json::to_value(customer)?);
    }
    for order in &orders {
        docs.push(serde_json::to_value(order)?);
    }
    for event in &events {
        docs.push(serde_json::to_value(event)?);
    }

    let total = docs.len();
    let mut inserted = 0;
    let mut failed = 0;
    for chunk in docs.chunks(config.transfer.batch_size.max(1)) {
        let summary = store
            .bulk_create(chunk.to_vec())
            .await
            .context("bulk inserting sample documents")?;
        inserted += summary.success_count;
        failed += summary.error_count;
    }
    println!("  inserted     {:>5} ok, {} failed", inserted, failed);

    for (label, doc_type, expected) in [
        ("products", TYPE_PRODUCT, products.len()),
        ("customers", TYPE_CUSTOMER, customers.len()),
        ("orders", TYPE_ORDER, orders.len()),
        ("events", TYPE_EVENT, events.len()),
    ] {
        let stored = count_by_type(store, doc_type).await?;
        let marker = if stored >= expected { "ok" } else { "SHORT" };
        println!("  {:<12} {:>5} ({})", label, stored, marker);
    }

    let snapshot = json!({
        "products": products,
        "customers": customers,
        "orders": orders,
        "events": events,
    });
    let path = config.sample.snapshot_path.as_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)
        .with_context(|| format!("writing {}", path.display()))?;

    println!();
    println!(
        "Done: {} of {} documents loaded, snapshot at {}",
        inserted,
        total,
        path.display()
    );
    Ok(())
}
