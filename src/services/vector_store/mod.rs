//! Vector database adapter abstraction.
//!
//! Every backend implements [`VectorDbAdapter`], so the rest of the
//! application works against one interface whichever database a connection
//! points at.

mod mcp;
mod mock;
mod mongo;
mod supabase;
mod webhook;

pub use self::mcp::{McpAdapter, McpTool, PROTOCOL_VERSION};
pub use self::mock::MockAdapter;
pub use self::mongo::MongoDbAdapter;
pub use self::supabase::SupabaseAdapter;
pub use self::webhook::WebhookAdapter;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::models::{
    BackendConfig, CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate,
    ConnectionStatus, MockConfig, SearchQuery, SearchResult, VectorDbType, VectorDocument,
};

/// Outcome of probing a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
}

impl ConnectionTestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Operations every vector database backend supports.
///
/// Data operations fail with [`AdapterError::NotConnected`] until `connect`
/// has succeeded.
#[async_trait]
pub trait VectorDbAdapter: Send + Sync {
    fn db_type(&self) -> VectorDbType;

    fn connection_status(&self) -> ConnectionStatus;

    /// Open the connection. On failure the status becomes `error`.
    async fn connect(&mut self) -> Result<(), AdapterError>;

    async fn disconnect(&mut self) -> Result<(), AdapterError>;

    /// Probe the backend without changing the connection state.
    async fn test_connection(&self) -> ConnectionTestResult;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError>;

    async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError>;

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError>;

    async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError>;

    /// Drop a collection. Without `cascade`, a non-empty collection is kept.
    async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError>;

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError>;

    /// Store documents, returning their ids in input order.
    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError>;

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError>;

    /// Apply partial updates; every document must carry an id.
    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError>;

    async fn delete_documents(&self, collection: &str, ids: &[String])
    -> Result<u64, AdapterError>;

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError>;

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError>;
}

/// Create the adapter for a backend configuration.
///
/// Types without an adapter are served by an unseeded mock.
pub fn create_adapter(config: &BackendConfig) -> Result<Box<dyn VectorDbAdapter>, AdapterError> {
    match config {
        BackendConfig::Mock(c) => Ok(Box::new(MockAdapter::new(c.clone()))),
        BackendConfig::MongoDb(c) => Ok(Box::new(MongoDbAdapter::new(c.clone()))),
        BackendConfig::Supabase(c) => Ok(Box::new(SupabaseAdapter::new(c.clone())?)),
        BackendConfig::Webhook(c) => Ok(Box::new(WebhookAdapter::new(c.clone())?)),
        BackendConfig::Mcp(c) => Ok(Box::new(McpAdapter::new(c.clone())?)),
        BackendConfig::Unsupported { db_type, .. } => {
            tracing::warn!(
                db_type = %db_type,
                "no adapter for database type, falling back to the mock adapter"
            );
            Ok(Box::new(MockAdapter::new(MockConfig {
                seed_demo: false,
                ..MockConfig::default()
            })))
        }
    }
}

pub(crate) fn ensure_connected(status: ConnectionStatus) -> Result<(), AdapterError> {
    if status == ConnectionStatus::Connected {
        Ok(())
    } else {
        Err(AdapterError::NotConnected)
    }
}

/// Best-effort read: unless `strict`, failures are logged and replaced by
/// `fallback`.
pub(crate) fn lenient<T>(
    strict: bool,
    operation: &str,
    result: Result<T, AdapterError>,
    fallback: impl FnOnce() -> T,
) -> Result<T, AdapterError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if strict || matches!(e, AdapterError::NotConnected) => Err(e),
        Err(e) => {
            tracing::warn!(operation, "read failed, returning empty result: {e}");
            Ok(fallback())
        }
    }
}

pub(crate) fn validate_collection_config(config: &CollectionConfig) -> Result<(), AdapterError> {
    if config.name.trim().is_empty() {
        return Err(AdapterError::Validation(
            "collection name must not be empty".to_string(),
        ));
    }
    if config.dimensions == 0 {
        return Err(AdapterError::Validation(
            "dimensions must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Decode `value[key]`, or `value` itself when the key is absent.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, key: &str) -> Result<T, AdapterError> {
    let inner = match value {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or_default(),
        other => other,
    };
    serde_json::from_value(inner).map_err(|e| AdapterError::InvalidResponse(format!("{key}: {e}")))
}

/// Partial updates are addressed by id, so every document needs one.
pub(crate) fn require_ids(documents: &[VectorDocument]) -> Result<(), AdapterError> {
    if documents.iter().any(|d| d.id.as_deref().is_none_or(str::is_empty)) {
        return Err(AdapterError::Validation(
            "documents to update must have an id".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{McpAdapterConfig, McpCapabilities};

    #[tokio::test]
    async fn test_unsupported_type_falls_back_to_mock() {
        let config = BackendConfig::Unsupported {
            db_type: VectorDbType::Pinecone,
            raw: serde_json::json!({"apiKey": "x"}),
        };
        let mut adapter = create_adapter(&config).unwrap();
        assert_eq!(adapter.db_type(), VectorDbType::Mock);

        adapter.connect().await.unwrap();
        adapter
            .create_collection(&CollectionConfig::new("docs", 3))
            .await
            .unwrap();
        assert_eq!(adapter.list_collections().await.unwrap().len(), 1);
    }

    #[test]
    fn test_factory_matches_config() {
        let mcp = BackendConfig::Mcp(McpAdapterConfig {
            server_url: "http://localhost:1".to_string(),
            api_key: None,
            capabilities: McpCapabilities::default(),
            timeout_ms: 1000,
        });
        let adapter = create_adapter(&mcp).unwrap();
        assert_eq!(adapter.db_type(), VectorDbType::Mcp);
        assert_eq!(adapter.connection_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_lenient_reads() {
        let err = || Err::<u64, _>(AdapterError::Backend("down".to_string()));
        assert_eq!(lenient(false, "count", err(), || 0).unwrap(), 0);
        assert!(lenient(true, "count", err(), || 0).is_err());
        assert!(lenient(false, "count", Err(AdapterError::NotConnected), || 0).is_err());
    }
}
