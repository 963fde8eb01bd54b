//! Routes operations to the adapter of the active connection.

use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionConfig,
    ConnectionStatus, SearchQuery, SearchResult, VectorDbType, VectorDocument,
};
use crate::services::embedding::EmbeddingClient;
use crate::services::vector_store::{ConnectionTestResult, VectorDbAdapter, create_adapter};

/// Holds at most one connected adapter and forwards calls to it.
#[derive(Default)]
pub struct ClientRouter {
    active: Option<ActiveConnection>,
    embedder: Option<EmbeddingClient>,
}

struct ActiveConnection {
    connection_id: String,
    adapter: Box<dyn VectorDbAdapter>,
}

impl ClientRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text searches are embedded with this client before reaching the adapter.
    pub fn with_embedder(mut self, embedder: EmbeddingClient) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Build the adapter for `config` and connect it, replacing any
    /// previously active connection.
    pub async fn connect(&mut self, config: &ConnectionConfig) -> Result<(), AdapterError> {
        self.disconnect().await?;

        let mut adapter = create_adapter(&config.backend)?;
        adapter.connect().await?;
        tracing::info!(
            connection = %config.name,
            db_type = %adapter.db_type(),
            "connection active"
        );
        self.active = Some(ActiveConnection {
            connection_id: config.id.clone(),
            adapter,
        });
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<(), AdapterError> {
        if let Some(mut active) = self.active.take() {
            active.adapter.disconnect().await?;
            tracing::debug!(connection = %active.connection_id, "connection closed");
        }
        Ok(())
    }

    /// Probe a configuration without making it the active connection.
    pub async fn test_connection(config: &ConnectionConfig) -> ConnectionTestResult {
        match create_adapter(&config.backend) {
            Ok(adapter) => adapter.test_connection().await,
            Err(e) => ConnectionTestResult::failed(e.to_string()),
        }
    }

    pub fn active_connection_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.connection_id.as_str())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.active
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, |a| a.adapter.connection_status())
    }

    pub fn db_type(&self) -> Option<VectorDbType> {
        self.active.as_ref().map(|a| a.adapter.db_type())
    }

    fn adapter(&self) -> Result<&dyn VectorDbAdapter, AdapterError> {
        self.active
            .as_ref()
            .map(|a| a.adapter.as_ref())
            .ok_or(AdapterError::NotConnected)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        self.adapter()?.list_collections().await
    }

    pub async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        self.adapter()?.create_collection(config).await
    }

    pub async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        self.adapter()?.get_collection(name).await
    }

    pub async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        self.adapter()?.update_collection(name, updates).await
    }

    pub async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError> {
        self.adapter()?.delete_collection(name, cascade).await
    }

    pub async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        self.adapter()?.get_collection_stats(name).await
    }

    pub async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        self.adapter()?.add_documents(collection, documents).await
    }

    pub async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        self.adapter()?.get_documents(collection, ids).await
    }

    pub async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        self.adapter()?.update_documents(collection, documents).await
    }

    pub async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        self.adapter()?.delete_documents(collection, ids).await
    }

    pub async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        self.adapter()?.count_documents(collection, filter).await
    }

    pub async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        self.adapter()?.search(collection, query).await
    }

    /// Search with a text query, adding its embedding when an embedder is
    /// configured. The text stays on the query for backends that match on it.
    pub async fn search_text(
        &self,
        collection: &str,
        query: SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let adapter = self.adapter()?;
        let embedding = match (&self.embedder, query.query_text()) {
            (Some(embedder), Some(text)) if query.vector.is_none() => {
                Some(embedder.embed_query(text).await?)
            }
            _ => None,
        };
        let query = match embedding {
            Some(vector) => query.with_vector(vector),
            None => query,
        };
        adapter.search(collection, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendConfig, EmbeddingConfig, MockConfig};
    use crate::test_support::spawn_server;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    fn mock_connection() -> ConnectionConfig {
        ConnectionConfig::new("local", BackendConfig::Mock(MockConfig::default()))
    }

    #[tokio::test]
    async fn test_operations_before_connect() {
        let router = ClientRouter::new();
        assert_eq!(router.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            router.list_collections().await,
            Err(AdapterError::NotConnected)
        ));
        assert!(matches!(
            router.search("demo", &SearchQuery::text("vector")).await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_gets_working_mock() {
        let config = ConnectionConfig::new(
            "pinecone",
            BackendConfig::Unsupported {
                db_type: VectorDbType::Pinecone,
                raw: json!({"apiKey": "pk"}),
            },
        );
        let mut router = ClientRouter::new();
        router.connect(&config).await.unwrap();

        assert_eq!(router.db_type(), Some(VectorDbType::Mock));
        assert_eq!(router.active_connection_id(), Some(config.id.as_str()));

        router
            .create_collection(&CollectionConfig::new("docs", 2))
            .await
            .unwrap();
        let ids = router
            .add_documents(
                "docs",
                vec![VectorDocument::new("hello").with_embedding(vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(router.count_documents("docs", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_replaces_active_connection() {
        let mut router = ClientRouter::new();
        let first = mock_connection();
        let second = mock_connection();
        router.connect(&first).await.unwrap();
        router.connect(&second).await.unwrap();
        assert_eq!(router.active_connection_id(), Some(second.id.as_str()));

        router.disconnect().await.unwrap();
        assert_eq!(router.active_connection_id(), None);
        assert!(router.get_collection("demo").await.is_err());
    }

    #[tokio::test]
    async fn test_search_text_embeds_query() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|| async { Json(json!({"data": [{"index": 0, "embedding": [1.0, 0.0]}]})) }),
        );
        let url = spawn_server(app).await;
        let embedder = EmbeddingClient::new(
            &EmbeddingConfig {
                base_url: url,
                ..Default::default()
            },
            "sk-test",
        )
        .unwrap();

        let mut router = ClientRouter::new().with_embedder(embedder);
        router
            .connect(&ConnectionConfig::new(
                "local",
                BackendConfig::Mock(MockConfig {
                    dimensions: 2,
                    seed_demo: false,
                }),
            ))
            .await
            .unwrap();
        router
            .create_collection(&CollectionConfig::new("docs", 2))
            .await
            .unwrap();
        router
            .add_documents(
                "docs",
                vec![
                    VectorDocument::new("east").with_id("e").with_embedding(vec![1.0, 0.0]),
                    VectorDocument::new("north").with_id("n").with_embedding(vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = router
            .search_text("docs", SearchQuery::text("which way").with_min_score(0.5))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "e");
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_text_without_embedder() {
        let mut router = ClientRouter::new();
        router.connect(&mock_connection()).await.unwrap();
        let hits = router
            .search_text("demo", SearchQuery::text("webhooks"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "demo-3");
    }
}
