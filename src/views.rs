//! Map/reduce view definitions and their native mirrors.
//!
//! The JavaScript sources here are installed into CouchDB's `analytics`
//! design document. The Rust functions mirror them exactly — including
//! JavaScript's truthiness quirks — so the in-memory store can execute
//! the same views in tests and the reduce logic has native unit
//! coverage. Keep both sides in sync when editing either.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{TYPE_ORDER, TYPE_PRODUCT};

/// Design document holding all analytics views.
pub const DESIGN_DOC: &str = "analytics";
/// Monthly revenue view: key `YYYY-MM`, reduced to a [`SalesMonthBucket`].
pub const SALES_BY_MONTH: &str = "sales_by_month";
/// Category rollup view: key category name, reduced to a [`CategoryBucket`].
pub const PRODUCTS_BY_CATEGORY: &str = "products_by_category";

pub const SALES_BY_MONTH_MAP: &str = r#"function(doc) {
  if (doc.type === 'order' && doc.total && doc.created_at) {
    var month = doc.created_at.substring(0, 7);
    emit(month, { total: doc.total, count: 1, status: doc.status });
  }
}"#;

pub const SALES_BY_MONTH_REDUCE: &str = r#"function(keys, values, rereduce) {
  var result = { total: 0, count: 0, delivered: 0, pending: 0, cancelled: 0 };
  if (rereduce) {
    for (var i = 0; i < values.length; i++) {
      result.total += values[i].total;
      result.count += values[i].count;
      result.delivered += values[i].delivered;
      result.pending += values[i].pending;
      result.cancelled += values[i].cancelled;
    }
  } else {
    for (var i = 0; i < values.length; i++) {
      result.total += values[i].total;
      result.count += 1;
      if (values[i].status === 'delivered') result.delivered += 1;
      else if (values[i].status === 'pending') result.pending += 1;
      else if (values[i].status === 'cancelled') result.cancelled += 1;
    }
  }
  return result;
}"#;

pub const PRODUCTS_BY_CATEGORY_MAP: &str = r#"function(doc) {
  if (doc.type === 'product' && doc.category && doc.price) {
    emit(doc.category, { count: 1, total_value: doc.price, product_name: doc.name });
  }
}"#;

pub const PRODUCTS_BY_CATEGORY_REDUCE: &str = r#"function(keys, values, rereduce) {
  var result = { count: 0, total_value: 0 };
  for (var i = 0; i < values.length; i++) {
    result.count += values[i].count || 1;
    result.total_value += values[i].total_value || values[i].avg_price || 0;
  }
  result.avg_price = result.count > 0 ? result.total_value / result.count : 0;
  return result;
}"#;

/// Reduced value of the `sales_by_month` view. `status` is only present
/// on map-emitted (pre-reduce) values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesMonthBucket {
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub delivered: i64,
    #[serde(default)]
    pub pending: i64,
    #[serde(default)]
    pub cancelled: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Reduced value of the `products_by_category` view. `product_name` is
/// only present on map-emitted values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryBucket {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub avg_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// Native mirror of [`SALES_BY_MONTH_MAP`]. Returns the emitted
/// `(key, value)` pair, or `None` if the document does not match. The
/// `doc.total &&` guard means zero-total orders are skipped, matching
/// JavaScript truthiness.
pub fn map_sales_by_month(doc: &Value) -> Option<(Value, SalesMonthBucket)> {
    if doc.get("type").and_then(Value::as_str) != Some(TYPE_ORDER) {
        return None;
    }
    let total = doc.get("total").and_then(Value::as_f64)?;
    if total == 0.0 {
        return None;
    }
    let created_at = doc.get("created_at").and_then(Value::as_str)?;
    // checked slice: skips timestamps shorter than 7 bytes or with a
    // multibyte character straddling the cut
    let month = created_at.get(..7)?.to_string();
    Some((
        Value::String(month),
        SalesMonthBucket {
            total,
            count: 1,
            status: doc
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..SalesMonthBucket::default()
        },
    ))
}

/// Native mirror of [`SALES_BY_MONTH_REDUCE`].
pub fn reduce_sales_by_month(values: &[SalesMonthBucket], rereduce: bool) -> SalesMonthBucket {
    let mut result = SalesMonthBucket::default();
    for value in values {
        result.total += value.total;
        if rereduce {
            result.count += value.count;
            result.delivered += value.delivered;
            result.pending += value.pending;
            result.cancelled += value.cancelled;
        } else {
            result.count += 1;
            match value.status.as_deref() {
                Some("delivered") => result.delivered += 1,
                Some("pending") => result.pending += 1,
                Some("cancelled") => result.cancelled += 1,
                _ => {}
            }
        }
    }
    result
}

/// Native mirror of [`PRODUCTS_BY_CATEGORY_MAP`]. The `doc.price &&`
/// guard skips zero-priced products.
pub fn map_products_by_category(doc: &Value) -> Option<(Value, CategoryBucket)> {
    if doc.get("type").and_then(Value::as_str) != Some(TYPE_PRODUCT) {
        return None;
    }
    let category = doc.get("category").and_then(Value::as_str)?;
    if category.is_empty() {
        return None;
    }
    let price = doc.get("price").and_then(Value::as_f64)?;
    if price == 0.0 {
        return None;
    }
    Some((
        Value::String(category.to_string()),
        CategoryBucket {
            count: 1,
            total_value: price,
            product_name: doc
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..CategoryBucket::default()
        },
    ))
}

/// Native mirror of [`PRODUCTS_BY_CATEGORY_REDUCE`]. The
/// `total_value || avg_price || 0` fallback chain is preserved: a
/// partial with a zero `total_value` falls through to `avg_price`.
pub fn reduce_products_by_category(values: &[CategoryBucket]) -> CategoryBucket {
    let mut result = CategoryBucket::default();
    for value in values {
        result.count += if value.count != 0 { value.count } else { 1 };
        result.total_value += if value.total_value != 0.0 {
            value.total_value
        } else {
            value.avg_price
        };
    }
    result.avg_price = if result.count > 0 {
        result.total_value / result.count as f64
    } else {
        0.0
    };
    result
}

/// Install both analytics views into the design document.
pub async fn register_views(store: &dyn crate::store::DocumentStore) -> crate::error::StoreResult<()> {
    store
        .put_view(
            DESIGN_DOC,
            SALES_BY_MONTH,
            SALES_BY_MONTH_MAP,
            Some(SALES_BY_MONTH_REDUCE),
        )
        .await?;
    store
        .put_view(
            DESIGN_DOC,
            PRODUCTS_BY_CATEGORY,
            PRODUCTS_BY_CATEGORY_MAP,
            Some(PRODUCTS_BY_CATEGORY_REDUCE),
        )
        .await?;
    Ok(())
}
