//! Document store abstraction.
//!
//! [`DocumentStore`] is the seam between the gateway logic and the
//! backing database. The production implementation ([`couch::CouchStore`])
//! talks to CouchDB over HTTP; [`memory::MemoryStore`] backs tests with a
//! hash map and a reduced Mango matcher so the analytics and transfer
//! layers can be exercised without a running server.

pub mod couch;
pub mod memory;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::StoreResult;
use crate::schema::now_iso;

pub use couch::CouchStore;
pub use memory::MemoryStore;

/// Identity returned by every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentWrite {
    pub id: String,
    pub rev: String,
}

/// A Mango selector query. Built with the fluent setters; `limit`
/// defaults to 100.
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub selector: Value,
    pub limit: i64,
    pub skip: i64,
    pub sort: Option<Value>,
    pub fields: Option<Vec<String>>,
}

impl FindQuery {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            limit: 100,
            skip: 0,
            sort: None,
            fields: None,
        }
    }

    /// Selector matching every document of one `type`.
    pub fn by_type(doc_type: &str) -> Self {
        Self::new(json!({ "type": doc_type }))
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// The request body CouchDB's `_find` endpoint expects.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "selector": self.selector,
            "limit": self.limit,
            "skip": self.skip,
        });
        if let Some(sort) = &self.sort {
            body["sort"] = sort.clone();
        }
        if let Some(fields) = &self.fields {
            body["fields"] = json!(fields);
        }
        body
    }
}

/// One page of `_find` results.
#[derive(Debug, Clone)]
pub struct FindPage {
    pub docs: Vec<Value>,
    pub bookmark: Option<String>,
}

/// Per-document outcome of a bulk insert.
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub id: Option<String>,
    pub rev: Option<String>,
    pub ok: bool,
    pub error: Option<String>,
    pub reason: Option<String>,
}

/// Summary of a bulk insert. A partial failure is reported here, not as
/// an `Err` — callers decide how to proceed.
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub outcomes: Vec<BulkOutcome>,
}

/// Parameters for a map/reduce view query.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub group: bool,
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub limit: Option<i64>,
}

impl ViewQuery {
    /// Grouped query: one row per distinct key, reduced.
    pub fn grouped() -> Self {
        Self {
            group: true,
            ..Self::default()
        }
    }
}

/// One row of a view result.
#[derive(Debug, Clone)]
pub struct ViewRow {
    pub key: Value,
    pub value: Value,
}

/// Database-level counters.
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub name: String,
    pub doc_count: u64,
    pub deleted_doc_count: u64,
    pub disk_size: u64,
}

/// The operations the rest of the crate needs from a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the database if it does not already exist. Idempotent.
    async fn ensure_database(&self) -> StoreResult<()>;

    /// Create a Mango index over `fields`. Idempotent.
    async fn ensure_index(&self, name: &str, fields: &[&str]) -> StoreResult<()>;

    /// Persist a new document. The `_id` must be present; timestamps are
    /// stamped (preserving a caller-supplied `created_at`).
    async fn create(&self, doc: Value) -> StoreResult<DocumentWrite>;

    /// Fetch a document by id.
    async fn read(&self, id: &str) -> StoreResult<Value>;

    /// Update a document. With `merge`, `patch`'s top-level keys
    /// overwrite the stored document's; otherwise `patch` replaces the
    /// body wholesale. `_id` and `_rev` survive either way, `updated_at`
    /// is restamped, and `version` is bumped.
    async fn update(&self, id: &str, patch: Value, merge: bool) -> StoreResult<DocumentWrite>;

    /// Delete a document. Soft deletion flags the document
    /// (`deleted: true` plus `deleted_at`) so it remains readable; hard
    /// deletion removes it.
    async fn delete(&self, id: &str, soft: bool) -> StoreResult<DocumentWrite>;

    /// Run a Mango selector query.
    async fn find(&self, query: &FindQuery) -> StoreResult<FindPage>;

    /// Insert many documents in one round trip. Timestamps are stamped
    /// per document before submission.
    async fn bulk_create(&self, docs: Vec<Value>) -> StoreResult<BulkSummary>;

    /// Install (or overwrite) a view in the given design document,
    /// preserving the design document's other views.
    async fn put_view(
        &self,
        design: &str,
        view: &str,
        map_js: &str,
        reduce_js: Option<&str>,
    ) -> StoreResult<()>;

    /// Query a map/reduce view.
    async fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<Vec<ViewRow>>;

    /// Database-level counters.
    async fn database_info(&self) -> StoreResult<DatabaseInfo>;
}

/// Stamp `created_at` (only when absent) and `updated_at` (always) on a
/// document body. Shared by both store implementations.
pub(crate) fn stamp_timestamps(doc: &mut Map<String, Value>) {
    let now = now_iso();
    if !doc.contains_key("created_at") {
        doc.insert("created_at".to_string(), Value::String(now.clone()));
    }
    doc.insert("updated_at".to_string(), Value::String(now));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_query_body_defaults() {
        let q = FindQuery::by_type("product");
        let body = q.to_body();
        assert_eq!(body["selector"]["type"], "product");
        assert_eq!(body["limit"], 100);
        assert_eq!(body["skip"], 0);
        assert!(body.get("sort").is_none());
        assert!(body.get("fields").is_none());
    }

    #[test]
    fn test_find_query_body_full() {
        let q = FindQuery::by_type("order")
            .limit(10)
            .skip(5)
            .sort(json!([{ "created_at": "desc" }]))
            .fields(vec!["_id".into(), "total".into()]);
        let body = q.to_body();
        assert_eq!(body["limit"], 10);
        assert_eq!(body["skip"], 5);
        assert_eq!(body["sort"][0]["created_at"], "desc");
        assert_eq!(body["fields"][1], "total");
    }

    #[test]
    fn test_stamp_preserves_created_at() {
        let mut doc = serde_json::from_value::<Map<String, Value>>(json!({
            "_id": "product_1",
            "created_at": "2024-01-01T00:00:00.000000Z",
        }))
        .unwrap();
        stamp_timestamps(&mut doc);
        assert_eq!(doc["created_at"], "2024-01-01T00:00:00.000000Z");
        assert_ne!(doc["updated_at"], doc["created_at"]);
    }
}
