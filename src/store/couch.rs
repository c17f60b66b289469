//! CouchDB-backed [`DocumentStore`].
//!
//! A thin wrapper over the CouchDB HTTP API: all serialization is JSON,
//! authentication is HTTP basic on every request, and non-success
//! statuses are mapped onto [`StoreError`] variants.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::CouchConfig;
use crate::error::{StoreError, StoreResult};
use crate::schema::now_iso;
use crate::store::{
    stamp_timestamps, BulkOutcome, BulkSummary, DatabaseInfo, DocumentStore, DocumentWrite,
    FindPage, FindQuery, ViewQuery, ViewRow,
};

pub struct CouchStore {
    client: Client,
    base_url: String,
    database: String,
    username: String,
    password: String,
}

impl CouchStore {
    pub fn new(config: &CouchConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn db_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/{}", self.base_url, self.database)
        } else {
            format!("{}/{}/{}", self.base_url, self.database, path)
        }
    }

    fn auth(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    /// Read the response body as JSON, mapping non-success statuses to
    /// the error taxonomy first.
    async fn check(&self, response: Response, context: &str) -> StoreResult<Value> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::from_status(status.as_u16(), body, context));
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn write_from(&self, body: &Value, context: &str) -> StoreResult<DocumentWrite> {
        let id = body.get("id").and_then(Value::as_str);
        let rev = body.get("rev").and_then(Value::as_str);
        match (id, rev) {
            (Some(id), Some(rev)) => Ok(DocumentWrite {
                id: id.to_string(),
                rev: rev.to_string(),
            }),
            _ => Err(StoreError::Unexpected {
                status: 200,
                body: format!("{}: response missing id/rev: {}", context, body),
            }),
        }
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn ensure_database(&self) -> StoreResult<()> {
        let response = self.auth(self.client.put(self.db_url(""))).send().await?;
        match response.status() {
            StatusCode::CREATED => {
                tracing::debug!(database = %self.database, "database created");
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => Ok(()),
            status => {
                let body = response.text().await?;
                Err(StoreError::from_status(
                    status.as_u16(),
                    body,
                    "ensure_database",
                ))
            }
        }
    }

    async fn ensure_index(&self, name: &str, fields: &[&str]) -> StoreResult<()> {
        let body = json!({
            "index": { "fields": fields },
            "name": name,
            "type": "json",
        });
        let response = self
            .auth(self.client.post(self.db_url("_index")).json(&body))
            .send()
            .await?;
        self.check(response, "ensure_index").await?;
        Ok(())
    }

    async fn create(&self, doc: Value) -> StoreResult<DocumentWrite> {
        let mut doc = as_object(doc)?;
        stamp_timestamps(&mut doc);
        let response = self
            .auth(self.client.post(self.db_url("")).json(&doc))
            .send()
            .await?;
        let body = self.check(response, "create").await?;
        self.write_from(&body, "create")
    }

    async fn read(&self, id: &str) -> StoreResult<Value> {
        let response = self.auth(self.client.get(self.db_url(id))).send().await?;
        self.check(response, id).await
    }

    async fn update(&self, id: &str, patch: Value, merge: bool) -> StoreResult<DocumentWrite> {
        let current = self.read(id).await?;
        let patch = as_object(patch)?;

        let mut next: Map<String, Value> = if merge {
            let mut merged = as_object(current.clone())?;
            for (key, value) in patch {
                merged.insert(key, value);
            }
            merged
        } else {
            let mut replaced = patch;
            // identity fields always survive a full replacement
            if let Some(rev) = current.get("_rev") {
                replaced.insert("_rev".to_string(), rev.clone());
            }
            replaced.insert("_id".to_string(), Value::String(id.to_string()));
            replaced
        };

        let version = current.get("version").and_then(Value::as_i64).unwrap_or(0);
        next.insert("version".to_string(), json!(version + 1));
        next.insert("updated_at".to_string(), Value::String(now_iso()));

        let response = self
            .auth(self.client.put(self.db_url(id)).json(&next))
            .send()
            .await?;
        let body = self.check(response, id).await?;
        self.write_from(&body, "update")
    }

    async fn delete(&self, id: &str, soft: bool) -> StoreResult<DocumentWrite> {
        if soft {
            let patch = json!({
                "deleted": true,
                "deleted_at": now_iso(),
            });
            return self.update(id, patch, true).await;
        }

        let current = self.read(id).await?;
        let rev = current
            .get("_rev")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Unexpected {
                status: 200,
                body: format!("document {} has no _rev", id),
            })?;
        let response = self
            .auth(self.client.delete(self.db_url(id)).query(&[("rev", rev)]))
            .send()
            .await?;
        let body = self.check(response, id).await?;
        self.write_from(&body, "delete")
    }

    async fn find(&self, query: &FindQuery) -> StoreResult<FindPage> {
        let response = self
            .auth(self.client.post(self.db_url("_find")).json(&query.to_body()))
            .send()
            .await?;
        let body = self.check(response, "find").await?;
        let docs = body
            .get("docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let bookmark = body
            .get("bookmark")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(FindPage { docs, bookmark })
    }

    async fn bulk_create(&self, docs: Vec<Value>) -> StoreResult<BulkSummary> {
        let total = docs.len();
        let mut stamped = Vec::with_capacity(total);
        for doc in docs {
            let mut doc = as_object(doc)?;
            stamp_timestamps(&mut doc);
            stamped.push(Value::Object(doc));
        }

        let body = json!({ "docs": stamped });
        let response = self
            .auth(self.client.post(self.db_url("_bulk_docs")).json(&body))
            .send()
            .await?;
        let results = self.check(response, "bulk_create").await?;
        let results = results.as_array().cloned().unwrap_or_default();

        let mut summary = BulkSummary {
            total,
            ..BulkSummary::default()
        };
        for result in results {
            let ok = result.get("ok").and_then(Value::as_bool).unwrap_or(false);
            let outcome = BulkOutcome {
                id: result.get("id").and_then(Value::as_str).map(str::to_string),
                rev: result.get("rev").and_then(Value::as_str).map(str::to_string),
                ok,
                error: result
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                reason: result
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            if ok {
                summary.success_count += 1;
            } else {
                summary.error_count += 1;
            }
            summary.outcomes.push(outcome);
        }
        tracing::debug!(
            total = summary.total,
            ok = summary.success_count,
            failed = summary.error_count,
            "bulk insert"
        );
        Ok(summary)
    }

    async fn put_view(
        &self,
        design: &str,
        view: &str,
        map_js: &str,
        reduce_js: Option<&str>,
    ) -> StoreResult<()> {
        let design_id = format!("_design/{}", design);

        // read-modify-write so other views in the design doc survive
        let mut doc = match self.read(&design_id).await {
            Ok(doc) => as_object(doc)?,
            Err(err) if err.is_not_found() => {
                let mut fresh = Map::new();
                fresh.insert("_id".to_string(), Value::String(design_id.clone()));
                fresh.insert("views".to_string(), json!({}));
                fresh
            }
            Err(err) => return Err(err),
        };

        let mut definition = json!({ "map": map_js });
        if let Some(reduce) = reduce_js {
            definition["reduce"] = Value::String(reduce.to_string());
        }
        doc.entry("views".to_string())
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| StoreError::Unexpected {
                status: 200,
                body: format!("{}: views is not an object", design_id),
            })?
            .insert(view.to_string(), definition);

        let response = self
            .auth(self.client.put(self.db_url(&design_id)).json(&doc))
            .send()
            .await?;
        self.check(response, &design_id).await?;
        tracing::debug!(design = design, view = view, "view installed");
        Ok(())
    }

    async fn query_view(
        &self,
        design: &str,
        view: &str,
        query: &ViewQuery,
    ) -> StoreResult<Vec<ViewRow>> {
        let path = format!("_design/{}/_view/{}", design, view);
        let mut request = self.auth(self.client.get(self.db_url(&path)));
        if query.group {
            request = request.query(&[("group", "true")]);
        }
        if let Some(start) = &query.start_key {
            request = request.query(&[("startkey", start.to_string())]);
        }
        if let Some(end) = &query.end_key {
            request = request.query(&[("endkey", end.to_string())]);
        }
        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }

        let body = self.check(request.send().await?, &path).await?;
        let rows = body
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| ViewRow {
                key: row.get("key").cloned().unwrap_or(Value::Null),
                value: row.get("value").cloned().unwrap_or(Value::Null),
            })
            .collect())
    }

    async fn database_info(&self) -> StoreResult<DatabaseInfo> {
        let response = self.auth(self.client.get(self.db_url(""))).send().await?;
        let body = self.check(response, "database_info").await?;
        Ok(DatabaseInfo {
            name: body
                .get("db_name")
                .and_then(Value::as_str)
                .unwrap_or(&self.database)
                .to_string(),
            doc_count: body.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            deleted_doc_count: body
                .get("doc_del_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            disk_size: body
                .pointer("/sizes/file")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }
}

fn as_object(value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Validation(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}
