//! In-process adapter used for demos, tests and unsupported backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{
    ConnectionTestResult, VectorDbAdapter, ensure_connected, require_ids,
    validate_collection_config,
};
use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionStatus,
    DistanceMetric, MockConfig, SearchQuery, SearchResult, VectorDbType, VectorDocument,
    rank_results,
};

pub const DEMO_COLLECTION: &str = "demo";

const DEMO_DOCUMENTS: [&str; 3] = [
    "Vector databases index embeddings for fast similarity search.",
    "Chunking splits long documents into overlapping pieces before embedding.",
    "Webhooks notify external services when documents change.",
];

#[derive(Debug, Clone)]
struct MockCollection {
    dimensions: u32,
    distance_metric: DistanceMetric,
    description: Option<String>,
    metadata: Map<String, Value>,
    documents: Vec<VectorDocument>,
    updated_at: DateTime<Utc>,
}

impl MockCollection {
    fn new(config: &CollectionConfig) -> Self {
        Self {
            dimensions: config.dimensions,
            distance_metric: config.distance_metric,
            description: config.description.clone(),
            metadata: Map::new(),
            documents: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            document_count: self.documents.len() as u64,
            dimensions: self.dimensions,
            distance_metric: self.distance_metric,
            description: self.description.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id.as_deref() == Some(id))
    }

    fn check_dimensions(&self, document: &VectorDocument) -> Result<(), AdapterError> {
        match &document.embedding {
            Some(embedding) if embedding.len() != self.dimensions as usize => {
                Err(AdapterError::Validation(format!(
                    "embedding has {} dimensions, collection expects {}",
                    embedding.len(),
                    self.dimensions
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Fraction of query terms that occur in `content`.
pub(crate) fn term_overlap(query: &str, content: &str) -> f32 {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
    matched as f32 / terms.len() as f32
}

/// Adapter keeping collections in memory.
pub struct MockAdapter {
    config: MockConfig,
    status: ConnectionStatus,
    collections: RwLock<BTreeMap<String, MockCollection>>,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    async fn seed_demo(&self) {
        let mut collections = self.collections.write().await;
        if collections.contains_key(DEMO_COLLECTION) {
            return;
        }
        let mut demo =
            MockCollection::new(&CollectionConfig::new(DEMO_COLLECTION, self.config.dimensions));
        demo.description = Some("Sample documents".to_string());
        demo.documents = DEMO_DOCUMENTS
            .iter()
            .enumerate()
            .map(|(i, text)| {
                VectorDocument::new(*text)
                    .with_id(format!("demo-{}", i + 1))
                    .with_metadata("source", "demo")
            })
            .collect();
        collections.insert(DEMO_COLLECTION.to_string(), demo);
    }
}

fn not_found(name: &str) -> AdapterError {
    AdapterError::NotFound(format!("collection '{name}'"))
}

#[async_trait]
impl VectorDbAdapter for MockAdapter {
    fn db_type(&self) -> VectorDbType {
        VectorDbType::Mock
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        if self.config.seed_demo {
            self.seed_demo().await;
        }
        self.status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        ConnectionTestResult::ok("Mock adapter is always reachable")
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        ensure_connected(self.status)?;
        Ok(self
            .collections
            .read()
            .await
            .iter()
            .map(|(name, c)| c.info(name))
            .collect())
    }

    async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        ensure_connected(self.status)?;
        validate_collection_config(config)?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(&config.name) {
            return Err(AdapterError::Validation(format!(
                "collection '{}' already exists",
                config.name
            )));
        }
        let collection = MockCollection::new(config);
        let info = collection.info(&config.name);
        collections.insert(config.name.clone(), collection);
        Ok(info)
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        ensure_connected(self.status)?;
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.info(name))
            .ok_or_else(|| not_found(name))
    }

    async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        ensure_connected(self.status)?;
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| not_found(name))?;

        if let Some(description) = &updates.description {
            collection.description = Some(description.clone());
        }
        if let Some(metadata) = &updates.metadata {
            collection
                .metadata
                .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        collection.updated_at = Utc::now();
        Ok(collection.info(name))
    }

    async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError> {
        ensure_connected(self.status)?;
        let mut collections = self.collections.write().await;
        let collection = collections.get(name).ok_or_else(|| not_found(name))?;
        if !cascade && !collection.documents.is_empty() {
            return Err(AdapterError::Validation(format!(
                "collection '{name}' has {} documents; use cascade to delete them",
                collection.documents.len()
            )));
        }
        collections.remove(name);
        Ok(())
    }

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        ensure_connected(self.status)?;
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| not_found(name))?;
        let content_bytes: usize = collection.documents.iter().map(|d| d.content.len()).sum();
        Ok(CollectionStats {
            name: name.to_string(),
            document_count: collection.documents.len() as u64,
            dimensions: collection.dimensions,
            index_size_bytes: Some(content_bytes as u64),
            last_updated: Some(collection.updated_at),
        })
    }

    async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        ensure_connected(self.status)?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        for document in &documents {
            target.check_dimensions(document)?;
        }

        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = document.ensure_id();
            match target.position(&id) {
                Some(index) => target.documents[index] = document,
                None => target.documents.push(document),
            }
            ids.push(id);
        }
        target.updated_at = Utc::now();
        Ok(ids)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        ensure_connected(self.status)?;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| target.position(id).map(|i| target.documents[i].clone()))
            .collect())
    }

    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        require_ids(&documents)?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        let mut updated = 0;
        for partial in documents {
            target.check_dimensions(&partial)?;
            let Some(index) = partial.id.as_deref().and_then(|id| target.position(id)) else {
                continue;
            };
            let existing = &mut target.documents[index];
            if !partial.content.is_empty() {
                existing.content = partial.content;
            }
            if partial.embedding.is_some() {
                existing.embedding = partial.embedding;
            }
            existing.metadata.extend(partial.metadata);
            updated += 1;
        }
        target.updated_at = Utc::now();
        Ok(updated)
    }

    async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        let before = target.documents.len();
        target
            .documents
            .retain(|d| !d.id.as_ref().is_some_and(|id| ids.contains(id)));
        target.updated_at = Utc::now();
        Ok((before - target.documents.len()) as u64)
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        ensure_connected(self.status)?;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;
        Ok(target
            .documents
            .iter()
            .filter(|d| filter.is_none_or(|f| d.matches_filter(f)))
            .count() as u64)
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        ensure_connected(self.status)?;
        query.validate()?;
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;

        let vector = query.vector.as_deref().filter(|v| !v.is_empty());
        if let Some(v) = vector
            && v.len() != target.dimensions as usize
        {
            return Err(AdapterError::Validation(format!(
                "query vector has {} dimensions, collection expects {}",
                v.len(),
                target.dimensions
            )));
        }

        let hits = target
            .documents
            .iter()
            .filter(|d| query.filter.as_ref().is_none_or(|f| d.matches_filter(f)))
            .filter_map(|d| {
                let score = match (vector, &d.embedding, query.query_text()) {
                    (Some(v), Some(e), _) => target.distance_metric.score(v, e),
                    // Text hits need at least one shared term.
                    (Some(_), None, Some(text)) | (None, _, Some(text)) => {
                        let overlap = term_overlap(text, &d.content);
                        if overlap <= 0.0 {
                            return None;
                        }
                        overlap
                    }
                    _ => return None,
                };
                Some(SearchResult {
                    id: d.id.clone().unwrap_or_default(),
                    score,
                    content: d.content.clone(),
                    metadata: d.metadata.clone(),
                })
            })
            .collect();

        Ok(rank_results(hits, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn connected() -> MockAdapter {
        let mut adapter = MockAdapter::new(MockConfig {
            dimensions: 3,
            seed_demo: false,
        });
        adapter.connect().await.unwrap();
        adapter
            .create_collection(&CollectionConfig::new("docs", 3))
            .await
            .unwrap();
        adapter
    }

    fn doc(id: &str, content: &str, embedding: [f32; 3]) -> VectorDocument {
        VectorDocument::new(content)
            .with_id(id)
            .with_embedding(embedding.to_vec())
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let adapter = MockAdapter::new(MockConfig::default());
        assert!(matches!(
            adapter.list_collections().await,
            Err(AdapterError::NotConnected)
        ));
        assert!(matches!(
            adapter.count_documents("demo", None).await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_state_machine() {
        let mut adapter = MockAdapter::new(MockConfig::default());
        assert_eq!(adapter.connection_status(), ConnectionStatus::Disconnected);
        adapter.connect().await.unwrap();
        assert_eq!(adapter.connection_status(), ConnectionStatus::Connected);
        adapter.disconnect().await.unwrap();
        assert_eq!(adapter.connection_status(), ConnectionStatus::Disconnected);
        assert!(adapter.test_connection().await.success);
    }

    #[tokio::test]
    async fn test_seeded_demo_collection() {
        let mut adapter = MockAdapter::new(MockConfig::default());
        adapter.connect().await.unwrap();
        let collections = adapter.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, DEMO_COLLECTION);
        assert_eq!(collections[0].document_count, 3);

        let hits = adapter
            .search(DEMO_COLLECTION, &SearchQuery::text("webhooks notify"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "demo-3");
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let adapter = connected().await;
        assert!(
            adapter
                .create_collection(&CollectionConfig::new("docs", 3))
                .await
                .is_err()
        );

        let updated = adapter
            .update_collection(
                "docs",
                &CollectionUpdate {
                    description: Some("notes".to_string()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.dimensions, 3);
        assert_eq!(updated.description.as_deref(), Some("notes"));

        adapter
            .add_documents("docs", vec![doc("a", "alpha", [1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert!(matches!(
            adapter.delete_collection("docs", false).await,
            Err(AdapterError::Validation(_))
        ));
        adapter.delete_collection("docs", true).await.unwrap();
        assert!(matches!(
            adapter.get_collection("docs").await,
            Err(AdapterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_document_crud() {
        let adapter = connected().await;
        let ids = adapter
            .add_documents(
                "docs",
                vec![
                    doc("a", "alpha", [1.0, 0.0, 0.0]),
                    VectorDocument::new("generated id"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids[0], "a");
        assert_eq!(ids[1].len(), 36);

        let updated = adapter
            .update_documents(
                "docs",
                vec![
                    VectorDocument::new("").with_id("a").with_metadata("tag", "x"),
                    VectorDocument::new("ghost").with_id("missing"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let fetched = adapter
            .get_documents("docs", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, "alpha");
        assert_eq!(fetched[0].metadata["tag"], "x");

        let mut filter = Map::new();
        filter.insert("tag".to_string(), json!("x"));
        assert_eq!(adapter.count_documents("docs", Some(&filter)).await.unwrap(), 1);
        assert_eq!(adapter.count_documents("docs", None).await.unwrap(), 2);

        assert_eq!(
            adapter
                .delete_documents("docs", &["a".to_string()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(adapter.count_documents("docs", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_ids() {
        let adapter = connected().await;
        assert!(matches!(
            adapter
                .update_documents("docs", vec![VectorDocument::new("x")])
                .await,
            Err(AdapterError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimensions() {
        let adapter = connected().await;
        let bad = VectorDocument::new("x").with_embedding(vec![1.0, 2.0]);
        assert!(matches!(
            adapter.add_documents("docs", vec![bad]).await,
            Err(AdapterError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_vector_search_ranks_by_similarity() {
        let adapter = connected().await;
        adapter
            .add_documents(
                "docs",
                vec![
                    doc("x", "east", [1.0, 0.0, 0.0]),
                    doc("y", "north", [0.0, 1.0, 0.0]),
                    doc("xy", "north east", [0.7, 0.7, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = adapter
            .search("docs", &SearchQuery::vector(vec![1.0, 0.1, 0.0]).with_top_k(2))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_rejects_query_of_wrong_dimensions() {
        let adapter = connected().await;
        adapter
            .add_documents("docs", vec![doc("x", "east", [1.0, 0.0, 5.0])])
            .await
            .unwrap();

        assert!(matches!(
            adapter.search("docs", &SearchQuery::vector(vec![1.0, 0.0])).await,
            Err(AdapterError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_vector_search_keeps_non_positive_scores() {
        let adapter = connected().await;
        adapter
            .add_documents(
                "docs",
                vec![
                    doc("east", "east", [1.0, 0.0, 0.0]),
                    doc("north", "north", [0.0, 1.0, 0.0]),
                    doc("west", "west", [-1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let query = SearchQuery::vector(vec![1.0, 0.0, 0.0]);
        let ids: Vec<String> = adapter
            .search("docs", &query.clone().with_min_score(-1.0))
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["east", "north", "west"]);

        let hits = adapter
            .search("docs", &query.with_min_score(0.5))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "east");
    }

    #[tokio::test]
    async fn test_search_validates_query() {
        let adapter = connected().await;
        assert!(matches!(
            adapter.search("docs", &SearchQuery::default()).await,
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn test_term_overlap() {
        assert_eq!(term_overlap("Rust async", "async rust runtime"), 1.0);
        assert_eq!(term_overlap("rust python", "rust only"), 0.5);
        assert_eq!(term_overlap("", "anything"), 0.0);
    }
}
