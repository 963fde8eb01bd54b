//! Adapter for MCP servers speaking JSON-RPC 2.0 over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{ConnectionTestResult, VectorDbAdapter, decode, ensure_connected, require_ids};
use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionStatus,
    McpAdapterConfig, McpCapabilities, SearchQuery, SearchResult, VectorDbType, VectorDocument,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
enum Capability {
    Search,
    Create,
    Update,
    Delete,
}

impl Capability {
    fn name(self) -> &'static str {
        match self {
            Capability::Search => "vectorSearch",
            Capability::Create => "vectorCreate",
            Capability::Update => "vectorUpdate",
            Capability::Delete => "vectorDelete",
        }
    }

    fn allowed_by(self, caps: &McpCapabilities) -> bool {
        match self {
            Capability::Search => caps.vector_search,
            Capability::Create => caps.vector_create,
            Capability::Update => caps.vector_update,
            Capability::Delete => caps.vector_delete,
        }
    }
}

/// Capabilities a server declared under `capabilities.vectors`.
///
/// A server that declares nothing is trusted with everything the
/// configuration allows; once it declares the object, missing flags are off.
fn declared_capabilities(result: &Value) -> McpCapabilities {
    let Some(vectors) = result
        .get("capabilities")
        .and_then(|c| c.get("vectors"))
        .and_then(Value::as_object)
    else {
        return McpCapabilities::default();
    };
    let flag = |name: &str| vectors.get(name).and_then(Value::as_bool).unwrap_or(false);
    McpCapabilities {
        vector_search: flag("vectorSearch"),
        vector_create: flag("vectorCreate"),
        vector_update: flag("vectorUpdate"),
        vector_delete: flag("vectorDelete"),
    }
}

/// Adapter mapping vector operations to MCP `tools/call` requests.
pub struct McpAdapter {
    config: McpAdapterConfig,
    client: Client,
    status: ConnectionStatus,
    next_id: AtomicU64,
    capabilities: McpCapabilities,
    protocol_version: Option<String>,
}

impl McpAdapter {
    pub fn new(config: McpAdapterConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::ConnectionError(e.to_string()))?;
        let capabilities = config.capabilities;
        Ok(Self {
            config,
            client,
            status: ConnectionStatus::Disconnected,
            next_id: AtomicU64::new(1),
            capabilities,
            protocol_version: None,
        })
    }

    /// Capabilities in effect: configured, narrowed by what the server declared.
    pub fn capabilities(&self) -> McpCapabilities {
        self.capabilities
    }

    /// Protocol version the server answered with.
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    fn require(&self, capability: Capability) -> Result<(), AdapterError> {
        if capability.allowed_by(&self.capabilities) {
            Ok(())
        } else {
            Err(AdapterError::CapabilityUnsupported {
                capability: capability.name(),
            })
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, AdapterError> {
        let mut request = self
            .client
            .post(&self.config.server_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout
            } else if e.is_connect() {
                AdapterError::ConnectionError(e.to_string())
            } else {
                AdapterError::Request(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(AdapterError::from_response(response).await);
        }
        Ok(response)
    }

    /// Send a JSON-RPC request and return its `result`.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(id, method, "mcp request");

        let mut reply: Value = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        if let Some(error) = reply.get("error") {
            return Err(AdapterError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        reply
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| AdapterError::InvalidResponse(format!("{method}: missing result")))
    }

    async fn notify(&self, method: &str) -> Result<(), AdapterError> {
        let body = json!({"jsonrpc": JSONRPC_VERSION, "method": method});
        self.post(&body).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<Value, AdapterError> {
        self.rpc(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await
    }

    async fn handshake(&self) -> Result<Value, AdapterError> {
        let result = self.initialize().await?;
        self.notify("notifications/initialized").await?;
        Ok(result)
    }

    /// Invoke a tool and return its decoded output.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, AdapterError> {
        ensure_connected(self.status)?;
        let mut result = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let text = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|items| items.iter().find_map(|i| i.get("text").and_then(Value::as_str)))
            .map(str::to_string);

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(AdapterError::Backend(
                text.unwrap_or_else(|| format!("tool '{name}' failed")),
            ));
        }
        if let Some(structured) = result.get_mut("structuredContent") {
            return Ok(structured.take());
        }
        Ok(match text {
            Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            None => Value::Null,
        })
    }

    /// Tools the server exposes.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, AdapterError> {
        ensure_connected(self.status)?;
        let result = self.rpc("tools/list", json!({})).await?;
        decode(result, "tools")
    }
}

#[async_trait]
impl VectorDbAdapter for McpAdapter {
    fn db_type(&self) -> VectorDbType {
        VectorDbType::Mcp
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        match self.handshake().await {
            Ok(result) => {
                self.protocol_version = result
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.capabilities = self
                    .config
                    .capabilities
                    .intersect(declared_capabilities(&result));
                self.status = ConnectionStatus::Connected;
                tracing::info!(
                    server = %self.config.server_url,
                    protocol = ?self.protocol_version,
                    "connected to MCP server"
                );
                Ok(())
            }
            Err(e) => {
                self.status = ConnectionStatus::Error;
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.status = ConnectionStatus::Disconnected;
        self.capabilities = self.config.capabilities;
        self.protocol_version = None;
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        match self.initialize().await {
            Ok(result) => {
                let server = result
                    .pointer("/serverInfo/name")
                    .and_then(Value::as_str)
                    .unwrap_or("MCP server");
                let version = result
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                ConnectionTestResult::ok(format!("{server} (protocol {version})"))
            }
            Err(e) => ConnectionTestResult::failed(e.to_string()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        let value = self.call_tool("list_collections", json!({})).await?;
        decode(value, "collections")
    }

    async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        self.require(Capability::Create)?;
        super::validate_collection_config(config)?;
        let value = self
            .call_tool("create_collection", serde_json::to_value(config).unwrap_or_default())
            .await?;
        if value.get("name").is_none() && value.get("collection").is_none() {
            return Ok(CollectionInfo::from_config(config));
        }
        decode(value, "collection")
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        let value = self.call_tool("get_collection", json!({"name": name})).await?;
        if value.is_null() {
            return Err(AdapterError::NotFound(format!("collection '{name}'")));
        }
        decode(value, "collection")
    }

    async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        self.require(Capability::Update)?;
        let value = self
            .call_tool(
                "update_collection",
                json!({"name": name, "updates": updates}),
            )
            .await?;
        if value.get("name").is_none() && value.get("collection").is_none() {
            return self.get_collection(name).await;
        }
        decode(value, "collection")
    }

    async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError> {
        self.require(Capability::Delete)?;
        self.call_tool(
            "delete_collection",
            json!({"name": name, "cascade": cascade}),
        )
        .await?;
        Ok(())
    }

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        let value = self
            .call_tool("get_collection_stats", json!({"name": name}))
            .await?;
        decode(value, "stats")
    }

    async fn add_documents(
        &self,
        collection: &str,
        mut documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        self.require(Capability::Create)?;
        let ids: Vec<String> = documents.iter_mut().map(VectorDocument::ensure_id).collect();
        let value = self
            .call_tool(
                "add_documents",
                json!({"collection": collection, "documents": documents}),
            )
            .await?;
        if value.get("ids").is_some() {
            return decode(value, "ids");
        }
        Ok(ids)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        let value = self
            .call_tool("get_documents", json!({"collection": collection, "ids": ids}))
            .await?;
        decode(value, "documents")
    }

    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        self.require(Capability::Update)?;
        require_ids(&documents)?;
        let submitted = documents.len() as u64;
        let value = self
            .call_tool(
                "update_documents",
                json!({"collection": collection, "documents": documents}),
            )
            .await?;
        Ok(value
            .get("updated")
            .and_then(Value::as_u64)
            .unwrap_or(submitted))
    }

    async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        self.require(Capability::Delete)?;
        let value = self
            .call_tool(
                "delete_documents",
                json!({"collection": collection, "ids": ids}),
            )
            .await?;
        Ok(value
            .get("deleted")
            .and_then(Value::as_u64)
            .unwrap_or(ids.len() as u64))
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        let value = self
            .call_tool(
                "count_documents",
                json!({"collection": collection, "filter": filter}),
            )
            .await?;
        decode(value, "count")
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        self.require(Capability::Search)?;
        query.validate()?;

        let mut arguments = match serde_json::to_value(query) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        arguments.insert("collection".to_string(), Value::from(collection));

        let value = self.call_tool("search", Value::Object(arguments)).await?;
        decode(value, "results")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct Server {
        requests: Arc<Mutex<Vec<Value>>>,
        vectors: Value,
    }

    async fn handle(State(server): State<Server>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        server.requests.lock().unwrap().push(body.clone());
        let id = body["id"].clone();
        let result = match body["method"].as_str().unwrap_or_default() {
            "initialize" => json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}, "vectors": server.vectors},
                "serverInfo": {"name": "test-mcp", "version": "1.0"},
            }),
            "notifications/initialized" => return (StatusCode::ACCEPTED, Json(Value::Null)),
            "tools/list" => json!({"tools": [
                {"name": "search", "description": "Similarity search", "inputSchema": {"type": "object"}},
                {"name": "count_documents"},
            ]}),
            "tools/call" => match body["params"]["name"].as_str().unwrap_or_default() {
                "search" => json!({"content": [{
                    "type": "text",
                    "text": r#"{"results": [{"id": "d1", "score": 0.8, "content": "match"}]}"#,
                }]}),
                "count_documents" => json!({"structuredContent": {"count": 4}, "content": []}),
                "get_documents" => json!({"isError": true, "content": [{"type": "text", "text": "boom"}]}),
                _ => {
                    return (
                        StatusCode::OK,
                        Json(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": -32602, "message": "unknown tool"},
                        })),
                    );
                }
            },
            _ => Value::Null,
        };
        (
            StatusCode::OK,
            Json(json!({"jsonrpc": "2.0", "id": id, "result": result})),
        )
    }

    async fn server(vectors: Value) -> (String, Arc<Mutex<Vec<Value>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new().route("/mcp", post(handle)).with_state(Server {
            requests: requests.clone(),
            vectors,
        });
        (format!("{}/mcp", spawn_server(router).await), requests)
    }

    fn config(url: &str, capabilities: McpCapabilities) -> McpAdapterConfig {
        McpAdapterConfig {
            server_url: url.to_string(),
            api_key: None,
            capabilities,
            timeout_ms: 2000,
        }
    }

    fn all_vectors() -> Value {
        json!({"vectorSearch": true, "vectorCreate": true, "vectorUpdate": true, "vectorDelete": true})
    }

    #[tokio::test]
    async fn test_capability_check_precedes_network() {
        let (url, requests) = server(all_vectors()).await;
        let adapter = McpAdapter::new(config(
            &url,
            McpCapabilities {
                vector_create: false,
                ..Default::default()
            },
        ))
        .unwrap();

        let err = adapter
            .add_documents("docs", vec![VectorDocument::new("x")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdapterError::CapabilityUnsupported {
                capability: "vectorCreate"
            }
        ));
        assert_eq!(err.code(), crate::error::ErrorCode::CapabilityUnsupported);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_and_request_ids() {
        let (url, requests) = server(all_vectors()).await;
        let mut adapter = McpAdapter::new(config(&url, McpCapabilities::default())).unwrap();
        adapter.connect().await.unwrap();
        assert_eq!(adapter.connection_status(), ConnectionStatus::Connected);
        assert_eq!(adapter.protocol_version(), Some(PROTOCOL_VERSION));

        let hits = adapter
            .search("docs", &SearchQuery::text("match").with_top_k(3))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "d1");
        assert_eq!(adapter.count_documents("docs", None).await.unwrap(), 4);

        let requests = requests.lock().unwrap();
        assert_eq!(requests[0]["method"], "initialize");
        assert_eq!(requests[0]["id"], 1);
        assert_eq!(requests[0]["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(requests[1]["method"], "notifications/initialized");
        assert!(requests[1].get("id").is_none());
        assert_eq!(requests[2]["id"], 2);
        assert_eq!(requests[2]["params"]["name"], "search");
        assert_eq!(requests[2]["params"]["arguments"]["collection"], "docs");
        assert_eq!(requests[2]["params"]["arguments"]["topK"], 3);
        assert_eq!(requests[3]["id"], 3);
    }

    #[tokio::test]
    async fn test_server_declared_capabilities_narrow_config() {
        let (url, requests) = server(json!({"vectorSearch": true})).await;
        let mut adapter = McpAdapter::new(config(&url, McpCapabilities::default())).unwrap();
        adapter.connect().await.unwrap();
        assert!(!adapter.capabilities().vector_create);

        let before = requests.lock().unwrap().len();
        assert!(matches!(
            adapter.delete_documents("docs", &["a".to_string()]).await,
            Err(AdapterError::CapabilityUnsupported { .. })
        ));
        assert_eq!(requests.lock().unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_rpc_and_tool_errors() {
        let (url, _) = server(all_vectors()).await;
        let mut adapter = McpAdapter::new(config(&url, McpCapabilities::default())).unwrap();
        adapter.connect().await.unwrap();

        assert!(matches!(
            adapter.get_collection("docs").await,
            Err(AdapterError::Rpc { code: -32602, .. })
        ));
        assert!(matches!(
            adapter.get_documents("docs", &["a".to_string()]).await,
            Err(AdapterError::Backend(msg)) if msg == "boom"
        ));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (url, _) = server(all_vectors()).await;
        let mut adapter = McpAdapter::new(config(&url, McpCapabilities::default())).unwrap();
        assert!(matches!(
            adapter.list_tools().await,
            Err(AdapterError::NotConnected)
        ));
        adapter.connect().await.unwrap();

        let tools = adapter.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search");
        assert!(tools[0].input_schema.is_some());
        assert!(adapter.test_connection().await.success);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error_status() {
        let url = crate::test_support::unused_url().await;
        let mut adapter = McpAdapter::new(config(&url, McpCapabilities::default())).unwrap();
        assert!(adapter.connect().await.is_err());
        assert_eq!(adapter.connection_status(), ConnectionStatus::Error);
        assert!(!adapter.test_connection().await.success);
    }
}
