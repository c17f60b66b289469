//! In-memory [`DocumentStore`] for tests.
//!
//! Documents live in a `RwLock<HashMap>` keyed by `_id`, with a
//! monotonically increasing revision counter per document. A reduced
//! Mango matcher covers the selector shapes the crate actually issues
//! (top-level equality plus `$gt`/`$gte`/`$lt`/`$lte`/`$ne`), and view
//! queries execute the native map/reduce mirrors from [`crate::views`].

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::schema::now_iso;
use crate::store::{
    stamp_timestamps, BulkOutcome, BulkSummary, DatabaseInfo, DocumentStore, DocumentWrite,
    FindPage, FindQuery, ViewQuery, ViewRow,
};
use crate::views;

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Value>>,
    deleted_count: RwLock<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_rev(current: Option<&str>) -> String {
        let seq = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-{}", seq + 1, Uuid::new_v4().simple())
    }
}

/// Does `doc` satisfy a (reduced) Mango selector?
fn matches_selector(doc: &Value, selector: &Value) -> bool {
    let Some(conditions) = selector.as_object() else {
        return false;
    };
    conditions.iter().all(|(field, condition)| {
        let actual = doc.get(field).unwrap_or(&Value::Null);
        match condition.as_object() {
            Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, expected)| match op.as_str() {
                    "$eq" => actual == expected,
                    "$ne" => actual != expected,
                    "$gt" => compare(actual, expected) == Some(std::cmp::Ordering::Greater),
                    "$gte" => matches!(
                        compare(actual, expected),
                        Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                    ),
                    "$lt" => compare(actual, expected) == Some(std::cmp::Ordering::Less),
                    "$lte" => matches!(
                        compare(actual, expected),
                        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                    ),
                    _ => false,
                })
            }
            _ => actual == condition,
        }
    })
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        // null sorts before everything, matching CouchDB's collation
        (Value::Null, Value::Null) => Some(std::cmp::Ordering::Equal),
        (Value::Null, _) => Some(std::cmp::Ordering::Less),
        (_, Value::Null) => Some(std::cmp::Ordering::Greater),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_database(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn ensure_index(&self, _name: &str, _fields: &[&str]) -> StoreResult<()> {
        Ok(())
    }

    async fn create(&self, doc: Value) -> StoreResult<DocumentWrite> {
        let mut doc = match doc {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };
        let id = match doc.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().simple().to_string();
                doc.insert("_id".to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut docs = self.docs.write().unwrap();
        if docs.contains_key(&id) {
            return Err(StoreError::Conflict(id));
        }
        stamp_timestamps(&mut doc);
        let rev = Self::next_rev(None);
        doc.insert("_rev".to_string(), Value::String(rev.clone()));
        docs.insert(id.clone(), Value::Object(doc));
        Ok(DocumentWrite { id, rev })
    }

    async fn read(&self, id: &str) -> StoreResult<Value> {
        self.docs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, patch: Value, merge: bool) -> StoreResult<DocumentWrite> {
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };

        let mut docs = self.docs.write().unwrap();
        let current = docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .clone();
        let current = current.as_object().cloned().unwrap_or_default();

        let mut next: Map<String, Value> = if merge {
            let mut merged = current.clone();
            for (key, value) in patch {
                merged.insert(key, value);
            }
            merged
        } else {
            let mut replaced = patch;
            if let Some(rev) = current.get("_rev") {
                replaced.insert("_rev".to_string(), rev.clone());
            }
            replaced.insert("_id".to_string(), Value::String(id.to_string()));
            replaced
        };

        let version = current.get("version").and_then(Value::as_i64).unwrap_or(0);
        next.insert("version".to_string(), json!(version + 1));
        next.insert("updated_at".to_string(), Value::String(now_iso()));

        let rev = Self::next_rev(current.get("_rev").and_then(Value::as_str));
        next.insert("_rev".to_string(), Value::String(rev.clone()));
        docs.insert(id.to_string(), Value::Object(next));
        Ok(DocumentWrite {
            id: id.to_string(),
            rev,
        })
    }

    async fn delete(&self, id: &str, soft: bool) -> StoreResult<DocumentWrite> {
        if soft {
            let patch = json!({
                "deleted": true,
                "deleted_at": now_iso(),
            });
            return self.update(id, patch, true).await;
        }

        let mut docs = self.docs.write().unwrap();
        let removed = docs
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        *self.deleted_count.write().unwrap() += 1;
        let rev = Self::next_rev(removed.get("_rev").and_then(Value::as_str));
        Ok(DocumentWrite {
            id: id.to_string(),
            rev,
        })
    }

    async fn find(&self, query: &FindQuery) -> StoreResult<FindPage> {
        let docs = self.docs.read().unwrap();
        let mut matched: Vec<Value> = docs
            .values()
            .filter(|doc| matches_selector(doc, &query.selector))
            .cloned()
            .collect();

        // HashMap iteration order is arbitrary; pin it for determinism
        matched.sort_by(|a, b| {
            let a_id = a.get("_id").and_then(Value::as_str).unwrap_or("");
            let b_id = b.get("_id").and_then(Value::as_str).unwrap_or("");
            a_id.cmp(b_id)
        });

        if let Some(sort) = query.sort.as_ref().and_then(Value::as_array) {
            for spec in sort.iter().rev() {
                if let Some(spec) = spec.as_object() {
                    for (field, direction) in spec {
                        let descending = direction.as_str() == Some("desc");
                        matched.sort_by(|a, b| {
                            let a_val = a.get(field).unwrap_or(&Value::Null);
                            let b_val = b.get(field).unwrap_or(&Value::Null);
                            let ord = compare(a_val, b_val).unwrap_or(std::cmp::Ordering::Equal);
                            if descending {
                                ord.reverse()
                            } else {
                                ord
                            }
                        });
                    }
                }
            }
        }

        let page: Vec<Value> = matched
            .into_iter()
            .skip(query.skip.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .map(|doc| match (&query.fields, doc) {
                (Some(fields), Value::Object(obj)) => Value::Object(
                    obj.into_iter()
                        .filter(|(key, _)| fields.contains(key))
                        .collect::<Map<String, Value>>(),
                ),
                (_, doc) => doc,
            })
            .collect();

        Ok(FindPage {
            docs: page,
            bookmark: None,
        })
    }

    async fn bulk_create(&self, docs: Vec<Value>) -> StoreResult<BulkSummary> {
        let mut summary = BulkSummary {
            total: docs.len(),
            ..BulkSummary::default()
        };
        for doc in docs {
            match self.create(doc).await {
                Ok(write) => {
                    summary.success_count += 1;
                    summary.outcomes.push(BulkOutcome {
                        id: Some(write.id),
                        rev: Some(write.rev),
                        ok: true,
                        error: None,
                        reason: None,
                    });
                }
                Err(StoreError::Conflict(id)) => {
                    summary.error_count += 1;
                    summary.outcomes.push(BulkOutcome {
                        id: Some(id),
                        rev: None,
                        ok: false,
                        error: Some("conflict".to_string()),
                        reason: Some("Document update conflict.".to_string()),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(summary)
    }

    async fn put_view(
        &self,
        _design: &str,
        _view: &str,
        _map_js: &str,
        _reduce_js: Option<&str>,
    ) -> StoreResult<()> {
        Ok(())
    }

    async fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<Vec<ViewRow>> {
        if design != views::DESIGN_DOC {
            return Err(StoreError::NotFound(format!("_design/{}", design)));
        }
        let docs: Vec<Value> = self.docs.read().unwrap().values().cloned().collect();

        match view {
            views::SALES_BY_MONTH => {
                let mut grouped: BTreeMap<String, Vec<views::SalesMonthBucket>> = BTreeMap::new();
                for doc in &docs {
                    if let Some((key, value)) = views::map_sales_by_month(doc) {
                        let key = key.as_str().unwrap_or_default().to_string();
                        grouped.entry(key).or_default().push(value);
                    }
                }
                Ok(grouped
                    .into_iter()
                    .map(|(key, values)| ViewRow {
                        key: Value::String(key),
                        value: serde_json::to_value(views::reduce_sales_by_month(&values, false))
                            .unwrap_or(Value::Null),
                    })
                    .take(query.limit.unwrap_or(i64::MAX).max(0) as usize)
                    .collect())
            }
            views::PRODUCTS_BY_CATEGORY => {
                let mut grouped: BTreeMap<String, Vec<views::CategoryBucket>> = BTreeMap::new();
                for doc in &docs {
                    if let Some((key, value)) = views::map_products_by_category(doc) {
                        let key = key.as_str().unwrap_or_default().to_string();
                        grouped.entry(key).or_default().push(value);
                    }
                }
                Ok(grouped
                    .into_iter()
                    .map(|(key, values)| ViewRow {
                        key: Value::String(key),
                        value: serde_json::to_value(views::reduce_products_by_category(&values))
                            .unwrap_or(Value::Null),
                    })
                    .take(query.limit.unwrap_or(i64::MAX).max(0) as usize)
                    .collect())
            }
            other => Err(StoreError::NotFound(format!(
                "_design/{}/_view/{}",
                design, other
            ))),
        }
    }

    async fn database_info(&self) -> StoreResult<DatabaseInfo> {
        let docs = self.docs.read().unwrap();
        Ok(DatabaseInfo {
            name: "memory".to_string(),
            doc_count: docs.len() as u64,
            deleted_doc_count: *self.deleted_count.read().unwrap(),
            disk_size: 0,
        })
    }
}
