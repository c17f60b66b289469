//! Aggregation engine.
//!
//! Two strategies live here. Ad-hoc reports pull documents through the
//! store's Mango interface and fold in process — fine at administrative
//! scale, where document counts are thousands, not millions. The
//! month/category rollups instead query the pre-built map/reduce views
//! from [`crate::views`], where the database does the folding.
//!
//! All monetary outputs are rounded to two decimals at the edge; the
//! folds themselves run at full precision.

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::StoreResult;
use crate::schema::{TYPE_CUSTOMER, TYPE_EVENT, TYPE_ORDER, TYPE_PRODUCT};
use crate::store::{DocumentStore, FindQuery, ViewQuery};
use crate::views::{self, CategoryBucket, SalesMonthBucket};

/// Page size for the ad-hoc full scans.
const SCAN_BATCH: i64 = 1000;
/// Events carried in a recent-activity report.
const RECENT_EVENT_LIMIT: usize = 20;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn cutoff_iso(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesSummary {
    pub window_days: i64,
    pub total_orders: usize,
    pub total_revenue: f64,
    pub average_order_value: f64,
    /// Orders per status, only statuses that occurred.
    pub orders_by_status: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSales {
    pub product_id: String,
    pub product_name: String,
    pub total_quantity: u64,
    pub total_revenue: f64,
    /// Number of order lines referencing the product. An order holding
    /// the same product on two lines counts twice.
    pub order_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerMetrics {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub total_orders: usize,
    pub total_spent: f64,
    /// Latest order `created_at`; the timestamps are fixed-width ISO
    /// strings, so the lexicographic maximum is the latest.
    pub last_order_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerAnalytics {
    pub total_customers: usize,
    /// Customers with at least one order.
    pub active_customers: usize,
    pub average_orders_per_customer: f64,
    pub customers: Vec<CustomerMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPerformance {
    pub total_products: usize,
    /// Products per category; every product counts exactly once, so the
    /// histogram sums to `total_products`.
    pub categories: HashMap<String, usize>,
    /// Statistics over products with a non-zero price. `None` only when
    /// there are no products at all; a catalog of all-zero prices yields
    /// zeroed stats instead.
    pub price_stats: Option<PriceStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentOrder {
    pub order_id: String,
    pub customer_id: String,
    pub total: f64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub window_days: i64,
    pub order_count: usize,
    pub order_revenue: f64,
    pub events: Vec<RecentEvent>,
    pub orders: Vec<RecentOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlySales {
    pub month: String,
    pub total: f64,
    pub order_count: i64,
    pub delivered: i64,
    pub pending: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub product_count: i64,
    pub total_value: f64,
    pub average_price: f64,
}

pub struct AnalyticsEngine<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Fetch every document matching `selector`, paging through the
    /// store until a short page signals the end.
    async fn fetch_all(&self, selector: Value) -> StoreResult<Vec<Value>> {
        let mut docs = Vec::new();
        let mut skip = 0;
        loop {
            let query = FindQuery::new(selector.clone()).limit(SCAN_BATCH).skip(skip);
            let page = self.store.find(&query).await?;
            let fetched = page.docs.len();
            docs.extend(page.docs);
            if (fetched as i64) < SCAN_BATCH {
                break;
            }
            skip += SCAN_BATCH;
        }
        Ok(docs)
    }

    /// Revenue, order count, and status breakdown over the trailing
    /// `days`-day window.
    pub async fn sales_summary(&self, days: i64) -> StoreResult<SalesSummary> {
        let selector = json!({
            "type": TYPE_ORDER,
            "created_at": { "$gte": cutoff_iso(days) },
        });
        let orders = self.fetch_all(selector).await?;

        let mut total_revenue = 0.0;
        let mut orders_by_status: HashMap<String, usize> = HashMap::new();
        for order in &orders {
            // the stored total is authoritative, never recomputed
            total_revenue += order.get("total").and_then(Value::as_f64).unwrap_or(0.0);
            if let Some(status) = order.get("status").and_then(Value::as_str) {
                *orders_by_status.entry(status.to_string()).or_insert(0) += 1;
            }
        }

        let total_orders = orders.len();
        let average = if total_orders > 0 {
            total_revenue / total_orders as f64
        } else {
            0.0
        };
        Ok(SalesSummary {
            window_days: days,
            total_orders,
            total_revenue: round2(total_revenue),
            average_order_value: round2(average),
            orders_by_status,
        })
    }

    /// The `limit` best-selling products by quantity. Ties keep the
    /// order in which the products were first encountered.
    pub async fn top_products(&self, limit: usize) -> StoreResult<Vec<ProductSales>> {
        let orders = self.fetch_all(json!({ "type": TYPE_ORDER })).await?;

        let mut ranked: Vec<ProductSales> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for order in &orders {
            let Some(lines) = order.get("products").and_then(Value::as_array) else {
                continue;
            };
            for line in lines {
                let Some(product_id) = line.get("product_id").and_then(Value::as_str) else {
                    continue;
                };
                let slot = *index.entry(product_id.to_string()).or_insert_with(|| {
                    ranked.push(ProductSales {
                        product_id: product_id.to_string(),
                        product_name: line
                            .get("product_name")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        total_quantity: 0,
                        total_revenue: 0.0,
                        order_count: 0,
                    });
                    ranked.len() - 1
                });
                let entry = &mut ranked[slot];
                entry.total_quantity += line.get("quantity").and_then(Value::as_u64).unwrap_or(0);
                entry.total_revenue +=
                    line.get("total_price").and_then(Value::as_f64).unwrap_or(0.0);
                entry.order_count += 1;
            }
        }

        // sort_by is stable: equal quantities keep encounter order
        ranked.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
        ranked.truncate(limit);
        for entry in &mut ranked {
            entry.total_revenue = round2(entry.total_revenue);
        }
        Ok(ranked)
    }

    /// Per-customer spend metrics (in the order the customer documents
    /// were returned) plus catalog-level activity counters.
    pub async fn customer_analytics(&self) -> StoreResult<CustomerAnalytics> {
        let customers = self.fetch_all(json!({ "type": TYPE_CUSTOMER })).await?;
        let orders = self.fetch_all(json!({ "type": TYPE_ORDER })).await?;

        let mut spend: HashMap<String, (usize, f64, Option<String>)> = HashMap::new();
        for order in &orders {
            if let Some(customer_id) = order.get("customer_id").and_then(Value::as_str) {
                let entry = spend
                    .entry(customer_id.to_string())
                    .or_insert((0, 0.0, None));
                entry.0 += 1;
                entry.1 += order.get("total").and_then(Value::as_f64).unwrap_or(0.0);
                if let Some(created_at) = order.get("created_at").and_then(Value::as_str) {
                    match &entry.2 {
                        Some(latest) if latest.as_str() >= created_at => {}
                        _ => entry.2 = Some(created_at.to_string()),
                    }
                }
            }
        }

        let metrics: Vec<CustomerMetrics> = customers
            .iter()
            .filter_map(|customer| {
                let id = customer.get("_id").and_then(Value::as_str)?;
                let (total_orders, total_spent, last_order_date) =
                    spend.get(id).cloned().unwrap_or((0, 0.0, None));
                Some(CustomerMetrics {
                    customer_id: id.to_string(),
                    name: customer
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    email: customer
                        .get("email")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    total_orders,
                    total_spent: round2(total_spent),
                    last_order_date,
                })
            })
            .collect();

        let total_customers = metrics.len();
        let active_customers = metrics.iter().filter(|m| m.total_orders > 0).count();
        let order_sum: usize = metrics.iter().map(|m| m.total_orders).sum();
        let average = if total_customers > 0 {
            order_sum as f64 / total_customers as f64
        } else {
            0.0
        };
        Ok(CustomerAnalytics {
            total_customers,
            active_customers,
            average_orders_per_customer: round2(average),
            customers: metrics,
        })
    }

    /// Category histogram over every product plus price statistics over
    /// the products whose price is present and non-zero.
    pub async fn product_performance(&self) -> StoreResult<ProductPerformance> {
        let products = self.fetch_all(json!({ "type": TYPE_PRODUCT })).await?;

        let mut categories: HashMap<String, usize> = HashMap::new();
        let mut priced: Vec<f64> = Vec::new();
        for product in &products {
            let category = product
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("uncategorized");
            *categories.entry(category.to_string()).or_insert(0) += 1;

            // zero or missing prices stay out of the statistic entirely
            match product.get("price").and_then(Value::as_f64) {
                Some(price) if price != 0.0 => priced.push(price),
                _ => {}
            }
        }

        let price_stats = if products.is_empty() {
            None
        } else if priced.is_empty() {
            Some(PriceStats {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            })
        } else {
            let min = priced.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = priced.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mean = priced.iter().sum::<f64>() / priced.len() as f64;
            Some(PriceStats {
                min: round2(min),
                max: round2(max),
                mean: round2(mean),
            })
        };

        Ok(ProductPerformance {
            total_products: products.len(),
            categories,
            price_stats,
        })
    }

    /// Orders and events over the trailing window, both ends inclusive.
    /// Events are capped at twenty; a failure fetching them fails the
    /// whole report.
    pub async fn recent_activity(&self, days: i64) -> StoreResult<RecentActivity> {
        let start = cutoff_iso(days);
        let end = cutoff_iso(0);

        let orders = self
            .fetch_all(json!({
                "type": TYPE_ORDER,
                "created_at": { "$gte": start, "$lte": end },
            }))
            .await?;

        // fetched unsorted so no sort-capable index is required, then
        // ordered client-side
        let events = self
            .fetch_all(json!({
                "type": TYPE_EVENT,
                "timestamp": { "$gte": start, "$lte": end },
            }))
            .await?;

        let mut recent_orders: Vec<RecentOrder> = orders
            .iter()
            .filter_map(|order| {
                Some(RecentOrder {
                    order_id: order.get("_id").and_then(Value::as_str)?.to_string(),
                    customer_id: order
                        .get("customer_id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    total: order.get("total").and_then(Value::as_f64).unwrap_or(0.0),
                    status: order
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    created_at: order
                        .get("created_at")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                })
            })
            .collect();
        recent_orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut recent_events: Vec<RecentEvent> = events
            .iter()
            .map(|event| RecentEvent {
                event_type: event
                    .get("event_type")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                entity_type: event
                    .get("entity_type")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                entity_id: event
                    .get("entity_id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                timestamp: event
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            })
            .collect();
        recent_events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent_events.truncate(RECENT_EVENT_LIMIT);

        let order_revenue = round2(recent_orders.iter().map(|o| o.total).sum());
        Ok(RecentActivity {
            window_days: days,
            order_count: recent_orders.len(),
            order_revenue,
            events: recent_events,
            orders: recent_orders,
        })
    }

    /// Monthly revenue rollup via the pre-built view.
    pub async fn sales_by_month(&self) -> StoreResult<Vec<MonthlySales>> {
        let rows = self
            .store
            .query_view(views::DESIGN_DOC, views::SALES_BY_MONTH, &ViewQuery::grouped())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let bucket: SalesMonthBucket = serde_json::from_value(row.value).ok()?;
                Some(MonthlySales {
                    month: row.key.as_str().unwrap_or("").to_string(),
                    total: round2(bucket.total),
                    order_count: bucket.count,
                    delivered: bucket.delivered,
                    pending: bucket.pending,
                    cancelled: bucket.cancelled,
                })
            })
            .collect())
    }

    /// Per-category product counts and price statistics via the
    /// pre-built view.
    pub async fn category_breakdown(&self) -> StoreResult<Vec<CategorySummary>> {
        let rows = self
            .store
            .query_view(
                views::DESIGN_DOC,
                views::PRODUCTS_BY_CATEGORY,
                &ViewQuery::grouped(),
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let bucket: CategoryBucket = serde_json::from_value(row.value).ok()?;
                Some(CategorySummary {
                    category: row.key.as_str().unwrap_or("").to_string(),
                    product_count: bucket.count,
                    total_value: round2(bucket.total_value),
                    average_price: round2(bucket.avg_price),
                })
            })
            .collect())
    }
}
