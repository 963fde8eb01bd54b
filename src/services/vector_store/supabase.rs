//! Supabase adapter over the PostgREST API.
//!
//! Each table exposed by PostgREST is treated as a collection. Vector search
//! goes through a SQL function (by default `match_documents`) called via
//! `/rest/v1/rpc/<function>`. Schema changes are out of scope for a REST
//! client, so collections cannot be created, altered or dropped here.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::mock::term_overlap;
use super::{ConnectionTestResult, VectorDbAdapter, ensure_connected, lenient, require_ids};
use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionStatus,
    DistanceMetric, SearchQuery, SearchResult, SupabaseConfig, VectorDbType, VectorDocument,
    rank_results,
};

const REST_PATH: &str = "/rest/v1";

pub struct SupabaseAdapter {
    config: SupabaseConfig,
    client: Client,
    status: ConnectionStatus,
}

impl SupabaseAdapter {
    pub fn new(config: SupabaseConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::ConnectionError(e.to_string()))?;
        Ok(Self {
            config,
            client,
            status: ConnectionStatus::Disconnected,
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!(
            "{}{REST_PATH}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn table<'a>(&'a self, collection: &'a str) -> &'a str {
        if collection.is_empty() {
            &self.config.table
        } else {
            collection
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.rest_url(path))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AdapterError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout
            } else {
                AdapterError::Request(e)
            }
        })?;
        if !response.status().is_success() {
            return Err(AdapterError::from_response(response).await);
        }
        Ok(response)
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, AdapterError> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    /// Tables exposed in the PostgREST OpenAPI description.
    async fn tables(&self) -> Result<Vec<String>, AdapterError> {
        let spec = self
            .send_json(self.request(reqwest::Method::GET, "/"))
            .await?;
        let paths = spec
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| AdapterError::InvalidResponse("OpenAPI document has no paths".into()))?;
        Ok(paths
            .keys()
            .filter_map(|p| p.strip_prefix('/'))
            .filter(|p| !p.is_empty() && !p.starts_with("rpc/"))
            .map(str::to_string)
            .collect())
    }

    async fn count_rows(
        &self,
        table: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        let mut query = vec![("select".to_string(), "id".to_string())];
        query.extend(metadata_filters(filter));
        let request = self
            .request(reqwest::Method::GET, table)
            .query(&query)
            .header("Prefer", "count=exact")
            .header("Range", "0-0");
        let response = self.send(request).await?;

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| AdapterError::InvalidResponse("missing Content-Range count".into()))
    }

    fn collection_info(&self, name: &str, document_count: u64) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            document_count,
            dimensions: self.config.dimensions,
            distance_metric: DistanceMetric::Cosine,
            description: None,
            metadata: Map::new(),
        }
    }

    async fn vector_search(
        &self,
        table: &str,
        vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let filter = query.filter.clone().unwrap_or_default();
        let body = json!({
            "query_embedding": vector,
            "match_threshold": query.min_score,
            "match_count": query.top_k,
            "filter": filter,
        });
        let path = format!("rpc/{}", self.config.match_function);
        let rows = self
            .send_json(self.request(reqwest::Method::POST, &path).json(&body))
            .await?;

        tracing::debug!(table, function = %self.config.match_function, "vector search");
        let results = rows_of(rows)
            .into_iter()
            .map(|row| {
                let score = row
                    .get("similarity")
                    .or_else(|| row.get("score"))
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as f32;
                let doc = row_to_document(row);
                SearchResult {
                    id: doc.id.unwrap_or_default(),
                    score,
                    content: doc.content,
                    metadata: doc.metadata,
                }
            })
            .collect();
        Ok(rank_results(results, query))
    }

    async fn text_search(
        &self,
        table: &str,
        text: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let mut params = vec![
            ("select".to_string(), "id,content,metadata".to_string()),
            ("content".to_string(), format!("ilike.*{}*", text.replace('*', ""))),
            ("limit".to_string(), query.top_k.to_string()),
        ];
        params.extend(metadata_filters(query.filter.as_ref()));

        let rows = self
            .send_json(self.request(reqwest::Method::GET, table).query(&params))
            .await?;
        let results = rows_of(rows)
            .into_iter()
            .map(row_to_document)
            .map(|doc| SearchResult {
                score: term_overlap(text, &doc.content).max(f32::EPSILON),
                id: doc.id.unwrap_or_default(),
                content: doc.content,
                metadata: doc.metadata,
            })
            .collect();
        Ok(rank_results(results, query))
    }
}

/// Total from a `Content-Range` header such as `0-0/42` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

/// PostgREST filters on the JSON `metadata` column.
fn metadata_filters(filter: Option<&Map<String, Value>>) -> Vec<(String, String)> {
    filter
        .into_iter()
        .flatten()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("metadata->>{key}"), format!("eq.{value}"))
        })
        .collect()
}

fn id_list(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn rows_of(value: Value) -> Vec<Value> {
    match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// pgvector columns come back either as JSON arrays or as `"[0.1,0.2]"` text.
fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
        Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}

fn row_to_document(row: Value) -> VectorDocument {
    VectorDocument {
        id: row.get("id").and_then(value_to_id),
        content: row
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        embedding: row.get("embedding").and_then(parse_embedding),
        metadata: row
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn document_row(document: &VectorDocument) -> Value {
    let mut row = Map::new();
    if let Some(id) = &document.id {
        row.insert("id".to_string(), Value::from(id.clone()));
    }
    row.insert("content".to_string(), Value::from(document.content.clone()));
    row.insert("metadata".to_string(), Value::Object(document.metadata.clone()));
    if let Some(embedding) = &document.embedding {
        row.insert("embedding".to_string(), json!(embedding));
    }
    Value::Object(row)
}

fn schema_unsupported(operation: &str) -> AdapterError {
    AdapterError::Unsupported(format!(
        "{operation} is not available through the Supabase REST API; manage tables with SQL migrations"
    ))
}

#[async_trait]
impl VectorDbAdapter for SupabaseAdapter {
    fn db_type(&self) -> VectorDbType {
        VectorDbType::Supabase
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        match self.tables().await {
            Ok(tables) => {
                tracing::info!(url = %self.config.url, tables = tables.len(), "connected to Supabase");
                self.status = ConnectionStatus::Connected;
                Ok(())
            }
            Err(e) => {
                self.status = ConnectionStatus::Error;
                Err(AdapterError::ConnectionError(e.to_string()))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        match self.tables().await {
            Ok(tables) => ConnectionTestResult::ok(format!(
                "Supabase reachable, {} tables exposed",
                tables.len()
            )),
            Err(e) => ConnectionTestResult::failed(e.to_string()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        ensure_connected(self.status)?;
        let result = async {
            let mut collections = Vec::new();
            for table in self.tables().await? {
                let count = lenient(
                    self.config.strict_reads,
                    "count_rows",
                    self.count_rows(&table, None).await,
                    || 0,
                )?;
                collections.push(self.collection_info(&table, count));
            }
            Ok::<_, AdapterError>(collections)
        }
        .await;
        lenient(self.config.strict_reads, "list_collections", result, Vec::new)
    }

    async fn create_collection(
        &self,
        _config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        Err(schema_unsupported("create_collection"))
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        ensure_connected(self.status)?;
        let table = self.table(name);
        match self.count_rows(table, None).await {
            Ok(count) => Ok(self.collection_info(table, count)),
            Err(AdapterError::HttpStatus { status: 404, .. }) => {
                Err(AdapterError::NotFound(format!("collection '{table}'")))
            }
            Err(e) => Err(e),
        }
    }

    async fn update_collection(
        &self,
        _name: &str,
        _updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        Err(schema_unsupported("update_collection"))
    }

    async fn delete_collection(&self, _name: &str, _cascade: bool) -> Result<(), AdapterError> {
        Err(schema_unsupported("delete_collection"))
    }

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        ensure_connected(self.status)?;
        let table = self.table(name);
        let result = self
            .count_rows(table, None)
            .await
            .map(|count| CollectionStats {
                document_count: count,
                ..CollectionStats::empty(table, self.config.dimensions)
            });
        lenient(self.config.strict_reads, "get_collection_stats", result, || {
            CollectionStats::empty(table, self.config.dimensions)
        })
    }

    async fn add_documents(
        &self,
        collection: &str,
        mut documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        ensure_connected(self.status)?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = documents.iter_mut().map(VectorDocument::ensure_id).collect();
        let rows: Vec<Value> = documents.iter().map(document_row).collect();

        let request = self
            .request(reqwest::Method::POST, self.table(collection))
            .header("Prefer", "return=representation")
            .json(&rows);
        let inserted = rows_of(self.send_json(request).await?);

        let returned: Vec<String> = inserted
            .iter()
            .filter_map(|row| row.get("id").and_then(value_to_id))
            .collect();
        Ok(if returned.len() == ids.len() {
            returned
        } else {
            ids
        })
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        ensure_connected(self.status)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(reqwest::Method::GET, self.table(collection))
            .query(&[("select", "id,content,metadata,embedding".to_string()), ("id", id_list(ids))]);
        let rows = self.send_json(request).await?;
        Ok(rows_of(rows).into_iter().map(row_to_document).collect())
    }

    /// PATCH each row. Non-empty metadata replaces the stored object.
    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        require_ids(&documents)?;
        let table = self.table(collection);

        let mut updated = 0;
        for document in &documents {
            let mut patch = Map::new();
            if !document.content.is_empty() {
                patch.insert("content".to_string(), Value::from(document.content.clone()));
            }
            if let Some(embedding) = &document.embedding {
                patch.insert("embedding".to_string(), json!(embedding));
            }
            if !document.metadata.is_empty() {
                patch.insert("metadata".to_string(), Value::Object(document.metadata.clone()));
            }
            if patch.is_empty() {
                continue;
            }

            let id = document.id.as_deref().unwrap_or_default();
            let request = self
                .request(reqwest::Method::PATCH, table)
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation")
                .json(&Value::Object(patch));
            updated += rows_of(self.send_json(request).await?).len() as u64;
        }
        Ok(updated)
    }

    async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let request = self
            .request(reqwest::Method::DELETE, self.table(collection))
            .query(&[("id", id_list(ids))])
            .header("Prefer", "return=representation");
        Ok(rows_of(self.send_json(request).await?).len() as u64)
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        let result = self.count_rows(self.table(collection), filter).await;
        lenient(self.config.strict_reads, "count_documents", result, || 0)
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        ensure_connected(self.status)?;
        query.validate()?;
        let table = self.table(collection);

        let result = match (query.vector.as_deref().filter(|v| !v.is_empty()), query.query_text()) {
            (Some(vector), _) => self.vector_search(table, vector, query).await,
            (None, Some(text)) => self.text_search(table, text, query).await,
            (None, None) => Ok(Vec::new()),
        };
        lenient(self.config.strict_reads, "search", result, Vec::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Seen {
        rpc_bodies: Arc<Mutex<Vec<Value>>>,
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
        api_keys: Arc<Mutex<Vec<String>>>,
    }

    async fn openapi(State(seen): State<Seen>, headers: HeaderMap) -> Json<Value> {
        if let Some(key) = headers.get("apikey").and_then(|v| v.to_str().ok()) {
            seen.api_keys.lock().unwrap().push(key.to_string());
        }
        Json(json!({"paths": {
            "/": {},
            "/documents": {},
            "/notes": {},
            "/rpc/match_documents": {},
        }}))
    }

    async fn select(
        State(seen): State<Seen>,
        Path(table): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        seen.queries.lock().unwrap().push(query.clone());
        if table == "broken" {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        if table == "missing" {
            return StatusCode::NOT_FOUND.into_response();
        }
        if query.contains_key("id") {
            return Json(json!([
                {"id": 7, "content": "seven", "metadata": {"k": "v"}, "embedding": "[0.5,0.25]"}
            ]))
            .into_response();
        }
        if query.contains_key("content") {
            return Json(json!([{"id": "t1", "content": "rust vectors", "metadata": {}}]))
                .into_response();
        }
        ([("content-range", "0-0/5")], Json(json!([{"id": "a"}]))).into_response()
    }

    async fn insert(Json(rows): Json<Value>) -> (StatusCode, Json<Value>) {
        (StatusCode::CREATED, Json(rows))
    }

    async fn rpc(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.rpc_bodies.lock().unwrap().push(body);
        Json(json!([
            {"id": "a", "content": "close", "metadata": {}, "similarity": 0.91},
            {"id": "b", "content": "far", "metadata": {}, "similarity": 0.42},
        ]))
    }

    async fn server() -> (String, Seen) {
        let seen = Seen::default();
        let router = Router::new()
            .route("/rest/v1/", get(openapi))
            .route("/rest/v1/rpc/match_documents", post(rpc))
            .route("/rest/v1/{table}", get(select).post(insert))
            .with_state(seen.clone());
        (spawn_server(router).await, seen)
    }

    fn config(url: &str, strict_reads: bool) -> SupabaseConfig {
        SupabaseConfig {
            url: url.to_string(),
            api_key: "anon-key".to_string(),
            table: "documents".to_string(),
            match_function: "match_documents".to_string(),
            dimensions: 2,
            timeout_ms: 2000,
            strict_reads,
        }
    }

    async fn connected(url: &str, strict_reads: bool) -> SupabaseAdapter {
        let mut adapter = SupabaseAdapter::new(config(url, strict_reads)).unwrap();
        adapter.connect().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_schema_operations_unsupported() {
        let adapter = SupabaseAdapter::new(config("http://127.0.0.1:9", false)).unwrap();
        let err = adapter
            .create_collection(&CollectionConfig::new("new_table", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
        assert_eq!(err.code(), crate::error::ErrorCode::UnsupportedOperation);
        assert!(adapter.delete_collection("documents", true).await.is_err());
        assert!(
            adapter
                .update_collection("documents", &CollectionUpdate::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_lists_tables_as_collections() {
        let (url, seen) = server().await;
        let adapter = connected(&url, false).await;

        let names: Vec<String> = adapter
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["documents".to_string(), "notes".to_string()]);
        assert!(seen.api_keys.lock().unwrap().iter().all(|k| k == "anon-key"));
        assert_eq!(adapter.get_collection("notes").await.unwrap().document_count, 5);
        assert!(matches!(
            adapter.get_collection("missing").await,
            Err(AdapterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_vector_search_calls_match_function() {
        let (url, seen) = server().await;
        let adapter = connected(&url, false).await;

        let query = SearchQuery::vector(vec![0.1, 0.2])
            .with_top_k(5)
            .with_min_score(0.5);
        let hits = adapter.search("documents", &query).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 0.91).abs() < 1e-6);

        let bodies = seen.rpc_bodies.lock().unwrap();
        assert_eq!(bodies[0]["match_count"], 5);
        assert_eq!(bodies[0]["match_threshold"], 0.5);
        assert_eq!(bodies[0]["query_embedding"].as_array().unwrap().len(), 2);
        assert_eq!(bodies[0]["filter"], json!({}));
    }

    #[tokio::test]
    async fn test_text_search_uses_ilike() {
        let (url, seen) = server().await;
        let adapter = connected(&url, false).await;

        let hits = adapter
            .search("documents", &SearchQuery::text("rust"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "t1");
        let queries = seen.queries.lock().unwrap();
        assert!(queries.iter().any(|q| q.get("content").map(String::as_str) == Some("ilike.*rust*")));
    }

    #[tokio::test]
    async fn test_documents_roundtrip() {
        let (url, seen) = server().await;
        let adapter = connected(&url, false).await;

        let ids = adapter
            .add_documents("documents", vec![VectorDocument::new("hello").with_id("d1")])
            .await
            .unwrap();
        assert_eq!(ids, vec!["d1".to_string()]);

        let docs = adapter
            .get_documents("documents", &["7".to_string()])
            .await
            .unwrap();
        assert_eq!(docs[0].id.as_deref(), Some("7"));
        assert_eq!(docs[0].embedding, Some(vec![0.5, 0.25]));

        let mut filter = Map::new();
        filter.insert("source".to_string(), json!("upload"));
        assert_eq!(
            adapter
                .count_documents("documents", Some(&filter))
                .await
                .unwrap(),
            5
        );
        let queries = seen.queries.lock().unwrap();
        assert!(queries.iter().any(|q| q.get("metadata->>source").map(String::as_str) == Some("eq.upload")));
    }

    #[tokio::test]
    async fn test_read_failures_respect_strict_reads() {
        let (url, _) = server().await;
        let relaxed = connected(&url, false).await;
        assert_eq!(relaxed.count_documents("broken", None).await.unwrap(), 0);
        assert_eq!(
            relaxed.get_collection_stats("broken").await.unwrap().document_count,
            0
        );

        let strict = connected(&url, true).await;
        assert!(strict.count_documents("broken", None).await.is_err());
    }

    async fn openapi_with_broken_table() -> Json<Value> {
        Json(json!({"paths": {"/": {}, "/broken": {}, "/notes": {}}}))
    }

    #[tokio::test]
    async fn test_list_collections_count_failure_respects_strict_reads() {
        let router = Router::new()
            .route("/rest/v1/", get(openapi_with_broken_table))
            .route("/rest/v1/{table}", get(select))
            .with_state(Seen::default());
        let url = spawn_server(router).await;

        let relaxed = connected(&url, false).await;
        let collections = relaxed.list_collections().await.unwrap();
        let counts: Vec<(String, u64)> = collections
            .into_iter()
            .map(|c| (c.name, c.document_count))
            .collect();
        assert_eq!(
            counts,
            vec![("broken".to_string(), 0), ("notes".to_string(), 5)]
        );

        let strict = connected(&url, true).await;
        assert!(matches!(
            strict.list_collections().await,
            Err(AdapterError::HttpStatus { status: 500, .. })
        ));
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
    }
}
