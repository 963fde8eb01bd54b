//! MongoDB adapter using Atlas Vector Search.
//!
//! Documents are stored as `{_id, content, embedding, metadata, createdAt}`.
//! Per-collection settings that MongoDB itself does not track (dimensions,
//! metric, description) live in a small registry collection.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::{Client, Database, IndexModel};
use serde_json::{Map, Value};

use super::mock::term_overlap;
use super::{
    ConnectionTestResult, VectorDbAdapter, ensure_connected, lenient, require_ids,
    validate_collection_config,
};
use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionStatus,
    DistanceMetric, MongoDbConfig, SearchQuery, SearchResult, VectorDbType, VectorDocument,
    rank_results,
};

const REGISTRY_COLLECTION: &str = "vectorhub_collections";

/// Server error code for a `$text` query without a text index.
const INDEX_NOT_FOUND: i32 = 27;

pub struct MongoDbAdapter {
    config: MongoDbConfig,
    client: Option<Client>,
    status: ConnectionStatus,
}

impl MongoDbAdapter {
    pub fn new(config: MongoDbConfig) -> Self {
        Self {
            config,
            client: None,
            status: ConnectionStatus::Disconnected,
        }
    }

    fn database(&self) -> Result<Database, AdapterError> {
        ensure_connected(self.status)?;
        self.client
            .as_ref()
            .map(|client| client.database(&self.config.database))
            .ok_or(AdapterError::NotConnected)
    }

    async fn ping(client: &Client, database: &str) -> Result<(), AdapterError> {
        client
            .database(database)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn collection_names(db: &Database) -> Result<Vec<String>, AdapterError> {
        let mut names: Vec<String> = db
            .list_collection_names()
            .await?
            .into_iter()
            .filter(|name| name != REGISTRY_COLLECTION && !name.starts_with("system."))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn collection_info(&self, db: &Database, name: &str) -> Result<CollectionInfo, AdapterError> {
        let document_count = db
            .collection::<Document>(name)
            .count_documents(doc! {})
            .await?;
        let entry = db
            .collection::<Document>(REGISTRY_COLLECTION)
            .find_one(doc! { "_id": name })
            .await?;
        Ok(registry_info(name, document_count, entry.as_ref(), self.config.dimensions))
    }

    /// Atlas-only; other deployments log and keep the plain collection.
    async fn create_search_index(&self, db: &Database, config: &CollectionConfig) {
        let command = doc! {
            "createSearchIndexes": config.name.as_str(),
            "indexes": [{
                "name": self.config.vector_index.as_str(),
                "type": "vectorSearch",
                "definition": {
                    "fields": [{
                        "type": "vector",
                        "path": "embedding",
                        "numDimensions": i64::from(config.dimensions),
                        "similarity": similarity_name(config.distance_metric),
                    }],
                },
            }],
        };
        if let Err(e) = db.run_command(command).await {
            tracing::warn!(collection = %config.name, "vector search index not created: {e}");
        }

        let text_index = IndexModel::builder().keys(doc! { "content": "text" }).build();
        if let Err(e) = db
            .collection::<Document>(&config.name)
            .create_index(text_index)
            .await
        {
            tracing::warn!(collection = %config.name, "text index not created: {e}");
        }
    }

    async fn vector_search(
        &self,
        db: &Database,
        collection: &str,
        vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let pipeline = vector_search_pipeline(&self.config.vector_index, vector, query)?;
        let rows: Vec<Document> = db
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;
        Ok(rank_results(rows.into_iter().map(search_result).collect(), query))
    }

    async fn text_search(
        &self,
        db: &Database,
        collection: &str,
        text: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let coll = db.collection::<Document>(collection);
        let mut filter = metadata_filter(query.filter.as_ref())?;
        filter.insert("$text", doc! { "$search": text });

        let found = coll
            .find(filter)
            .projection(doc! { "content": 1, "metadata": 1, "score": { "$meta": "textScore" } })
            .sort(doc! { "score": { "$meta": "textScore" } })
            .limit(i64::from(query.top_k))
            .await;

        let rows: Vec<Document> = match found {
            Ok(cursor) => cursor.try_collect().await?,
            Err(e) if is_missing_index(&e) => {
                tracing::debug!(collection, "no text index, falling back to regex match");
                let cursor = coll.find(regex_filter(text, query.filter.as_ref())?).await?;
                let docs: Vec<Document> = cursor.try_collect().await?;
                docs.into_iter()
                    .map(|mut d| {
                        let content = d.get_str("content").unwrap_or_default().to_string();
                        d.insert("score", f64::from(term_overlap(text, &content).max(f32::EPSILON)));
                        d
                    })
                    .collect()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(rank_results(rows.into_iter().map(search_result).collect(), query))
    }
}

fn is_missing_index(error: &mongodb::error::Error) -> bool {
    matches!(error.kind.as_ref(), ErrorKind::Command(c) if c.code == INDEX_NOT_FOUND)
}

fn similarity_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine",
        DistanceMetric::Euclidean => "euclidean",
        DistanceMetric::DotProduct => "dotProduct",
    }
}

fn to_bson_error(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::Validation(format!("value cannot be stored in MongoDB: {e}"))
}

/// Equality filters on `metadata.<key>`.
fn metadata_filter(filter: Option<&Map<String, Value>>) -> Result<Document, AdapterError> {
    let mut document = Document::new();
    for (key, value) in filter.into_iter().flatten() {
        document.insert(format!("metadata.{key}"), bson::to_bson(value).map_err(to_bson_error)?);
    }
    Ok(document)
}

fn regex_filter(text: &str, filter: Option<&Map<String, Value>>) -> Result<Document, AdapterError> {
    let mut document = metadata_filter(filter)?;
    document.insert(
        "content",
        doc! { "$regex": regex::escape(text), "$options": "i" },
    );
    Ok(document)
}

fn vector_search_pipeline(
    index: &str,
    vector: &[f32],
    query: &SearchQuery,
) -> Result<Vec<Document>, AdapterError> {
    let limit = i64::from(query.top_k);
    let query_vector: Vec<f64> = vector.iter().map(|v| f64::from(*v)).collect();

    let mut pipeline = vec![
        doc! {
            "$vectorSearch": {
                "index": index,
                "path": "embedding",
                "queryVector": query_vector,
                "numCandidates": limit * 10,
                "limit": limit,
            }
        },
        doc! {
            "$project": {
                "content": 1,
                "metadata": 1,
                "score": { "$meta": "vectorSearchScore" },
            }
        },
    ];
    let filter = metadata_filter(query.filter.as_ref())?;
    if !filter.is_empty() {
        pipeline.push(doc! { "$match": filter });
    }
    Ok(pipeline)
}

fn to_mongo_document(document: &VectorDocument, id: String) -> Result<Document, AdapterError> {
    let mut stored = doc! {
        "_id": id,
        "content": document.content.as_str(),
        "metadata": bson::to_document(&document.metadata).map_err(to_bson_error)?,
        "createdAt": bson::DateTime::now(),
    };
    if let Some(embedding) = &document.embedding {
        stored.insert("embedding", embedding_bson(embedding));
    }
    Ok(stored)
}

fn embedding_bson(embedding: &[f32]) -> Bson {
    Bson::Array(embedding.iter().map(|v| Bson::Double(f64::from(*v))).collect())
}

fn bson_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

fn bson_id(value: Option<&Bson>) -> Option<String> {
    match value? {
        Bson::String(s) => Some(s.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        other => bson_number(other).map(|n| n.to_string()),
    }
}

fn metadata_map(document: &Document) -> Map<String, Value> {
    match document.get_document("metadata") {
        Ok(metadata) => match Bson::Document(metadata.clone()).into_relaxed_extjson() {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        Err(_) => Map::new(),
    }
}

fn from_mongo_document(document: &Document) -> VectorDocument {
    let embedding = document
        .get_array("embedding")
        .ok()
        .map(|values| values.iter().filter_map(bson_number).map(|v| v as f32).collect());
    VectorDocument {
        id: bson_id(document.get("_id")),
        content: document.get_str("content").unwrap_or_default().to_string(),
        embedding,
        metadata: metadata_map(document),
    }
}

fn search_result(document: Document) -> SearchResult {
    let score = document.get("score").and_then(bson_number).unwrap_or_default() as f32;
    let doc = from_mongo_document(&document);
    SearchResult {
        id: doc.id.unwrap_or_default(),
        score,
        content: doc.content,
        metadata: doc.metadata,
    }
}

fn registry_info(
    name: &str,
    document_count: u64,
    entry: Option<&Document>,
    default_dimensions: u32,
) -> CollectionInfo {
    let dimensions = entry
        .and_then(|e| e.get("dimensions").and_then(bson_number))
        .map(|d| d as u32)
        .unwrap_or(default_dimensions);
    let distance_metric = entry
        .and_then(|e| e.get_str("distanceMetric").ok())
        .and_then(|m| m.parse::<DistanceMetric>().ok())
        .unwrap_or_default();
    CollectionInfo {
        name: name.to_string(),
        document_count,
        dimensions,
        distance_metric,
        description: entry
            .and_then(|e| e.get_str("description").ok())
            .map(str::to_string),
        metadata: entry.map(metadata_map).unwrap_or_default(),
    }
}

/// `$set` document for a partial update. Metadata keys are merged.
fn update_document(document: &VectorDocument) -> Result<Document, AdapterError> {
    let mut set = Document::new();
    if !document.content.is_empty() {
        set.insert("content", document.content.as_str());
    }
    if let Some(embedding) = &document.embedding {
        set.insert("embedding", embedding_bson(embedding));
    }
    for (key, value) in &document.metadata {
        set.insert(format!("metadata.{key}"), bson::to_bson(value).map_err(to_bson_error)?);
    }
    Ok(set)
}

#[async_trait]
impl VectorDbAdapter for MongoDbAdapter {
    fn db_type(&self) -> VectorDbType {
        VectorDbType::MongoDb
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        let attempt = async {
            let client = Client::with_uri_str(&self.config.uri).await?;
            Self::ping(&client, &self.config.database).await?;
            Ok::<_, AdapterError>(client)
        }
        .await;

        match attempt {
            Ok(client) => {
                tracing::info!(database = %self.config.database, "connected to MongoDB");
                self.client = Some(client);
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
        self.client = None;
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        let result = match &self.client {
            Some(client) => Self::ping(client, &self.config.database).await,
            None => match Client::with_uri_str(&self.config.uri).await {
                Ok(client) => Self::ping(&client, &self.config.database).await,
                Err(e) => Err(e.into()),
            },
        };
        match result {
            Ok(()) => ConnectionTestResult::ok(format!(
                "MongoDB database '{}' reachable",
                self.config.database
            )),
            Err(e) => ConnectionTestResult::failed(e.to_string()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        let db = self.database()?;
        let result = async {
            let mut collections = Vec::new();
            for name in Self::collection_names(&db).await? {
                collections.push(self.collection_info(&db, &name).await?);
            }
            Ok::<_, AdapterError>(collections)
        }
        .await;
        lenient(self.config.strict_reads, "list_collections", result, Vec::new)
    }

    async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        let db = self.database()?;
        validate_collection_config(config)?;
        if Self::collection_names(&db).await?.contains(&config.name) {
            return Err(AdapterError::Validation(format!(
                "collection '{}' already exists",
                config.name
            )));
        }

        db.create_collection(&config.name).await?;
        let mut entry = doc! {
            "_id": config.name.as_str(),
            "dimensions": i64::from(config.dimensions),
            "distanceMetric": config.distance_metric.to_string(),
            "metadata": {},
        };
        if let Some(description) = &config.description {
            entry.insert("description", description.as_str());
        }
        db.collection::<Document>(REGISTRY_COLLECTION)
            .insert_one(entry)
            .await?;
        self.create_search_index(&db, config).await;

        tracing::info!(collection = %config.name, "created MongoDB collection");
        Ok(CollectionInfo::from_config(config))
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        let db = self.database()?;
        if !Self::collection_names(&db).await?.iter().any(|n| n == name) {
            return Err(AdapterError::NotFound(format!("collection '{name}'")));
        }
        self.collection_info(&db, name).await
    }

    async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        let db = self.database()?;
        let current = self.get_collection(name).await?;

        let mut set = doc! {
            "dimensions": i64::from(current.dimensions),
            "distanceMetric": current.distance_metric.to_string(),
        };
        if let Some(description) = &updates.description {
            set.insert("description", description.as_str());
        }
        if let Some(metadata) = &updates.metadata {
            for (key, value) in metadata {
                set.insert(format!("metadata.{key}"), bson::to_bson(value).map_err(to_bson_error)?);
            }
        }
        db.collection::<Document>(REGISTRY_COLLECTION)
            .update_one(doc! { "_id": name }, doc! { "$set": set })
            .upsert(true)
            .await?;
        self.collection_info(&db, name).await
    }

    async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError> {
        let db = self.database()?;
        let info = self.get_collection(name).await?;
        if !cascade && info.document_count > 0 {
            return Err(AdapterError::Validation(format!(
                "collection '{name}' holds {} documents; delete with cascade to drop it",
                info.document_count
            )));
        }
        db.collection::<Document>(name).drop().await?;
        db.collection::<Document>(REGISTRY_COLLECTION)
            .delete_one(doc! { "_id": name })
            .await?;
        tracing::info!(collection = name, "dropped MongoDB collection");
        Ok(())
    }

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        let db = self.database()?;
        let result = async {
            let stats = db.run_command(doc! { "collStats": name }).await?;
            let info = self.collection_info(&db, name).await?;
            Ok::<_, AdapterError>(CollectionStats {
                name: name.to_string(),
                document_count: info.document_count,
                dimensions: info.dimensions,
                index_size_bytes: stats.get("totalIndexSize").and_then(bson_number).map(|n| n as u64),
                last_updated: None,
            })
        }
        .await;
        lenient(self.config.strict_reads, "get_collection_stats", result, || {
            CollectionStats::empty(name, self.config.dimensions)
        })
    }

    async fn add_documents(
        &self,
        collection: &str,
        mut documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        let db = self.database()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::with_capacity(documents.len());
        let mut stored = Vec::with_capacity(documents.len());
        for document in documents.iter_mut() {
            let id = document.ensure_id();
            stored.push(to_mongo_document(document, id.clone())?);
            ids.push(id);
        }
        db.collection::<Document>(collection)
            .insert_many(stored)
            .await?;
        tracing::debug!(collection, count = ids.len(), "inserted documents");
        Ok(ids)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        let db = self.database()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<Document> = db
            .collection::<Document>(collection)
            .find(doc! { "_id": { "$in": ids.to_vec() } })
            .await?
            .try_collect()
            .await?;
        Ok(found.iter().map(from_mongo_document).collect())
    }

    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        let db = self.database()?;
        require_ids(&documents)?;
        let coll = db.collection::<Document>(collection);

        let mut updated = 0;
        for document in &documents {
            let set = update_document(document)?;
            if set.is_empty() {
                continue;
            }
            let id = document.id.as_deref().unwrap_or_default();
            let result = coll
                .update_one(doc! { "_id": id }, doc! { "$set": set })
                .await?;
            updated += result.matched_count;
        }
        Ok(updated)
    }

    async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        let db = self.database()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let result = db
            .collection::<Document>(collection)
            .delete_many(doc! { "_id": { "$in": ids.to_vec() } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        let db = self.database()?;
        let result = async {
            let filter = metadata_filter(filter)?;
            Ok::<_, AdapterError>(
                db.collection::<Document>(collection)
                    .count_documents(filter)
                    .await?,
            )
        }
        .await;
        lenient(self.config.strict_reads, "count_documents", result, || 0)
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let db = self.database()?;
        query.validate()?;

        let result = match (query.vector.as_deref().filter(|v| !v.is_empty()), query.query_text()) {
            (Some(vector), _) => self.vector_search(&db, collection, vector, query).await,
            (None, Some(text)) => self.text_search(&db, collection, text, query).await,
            (None, None) => Ok(Vec::new()),
        };
        lenient(self.config.strict_reads, "search", result, Vec::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(uri: &str) -> MongoDbConfig {
        MongoDbConfig {
            uri: uri.to_string(),
            database: "vectorhub".to_string(),
            vector_index: "vector_index".to_string(),
            dimensions: 3,
            strict_reads: false,
        }
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let adapter = MongoDbAdapter::new(config("mongodb://127.0.0.1:1"));
        assert!(matches!(
            adapter.list_collections().await,
            Err(AdapterError::NotConnected)
        ));
        assert!(matches!(
            adapter.search("docs", &SearchQuery::text("rust")).await,
            Err(AdapterError::NotConnected)
        ));
        assert!(matches!(
            adapter
                .add_documents("docs", vec![VectorDocument::new("hello")])
                .await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error_status() {
        let mut adapter = MongoDbAdapter::new(config(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
        ));
        assert!(adapter.connect().await.is_err());
        assert_eq!(adapter.connection_status(), ConnectionStatus::Error);
        assert!(!adapter.test_connection().await.success);
    }

    #[test]
    fn test_vector_search_pipeline() {
        let mut filter = Map::new();
        filter.insert("lang".to_string(), json!("rust"));
        let query = SearchQuery::vector(vec![0.5, 0.25])
            .with_top_k(4)
            .with_filter(filter);

        let pipeline = vector_search_pipeline("vector_index", &[0.5, 0.25], &query).unwrap();
        assert_eq!(pipeline.len(), 3);

        let stage = pipeline[0].get_document("$vectorSearch").unwrap();
        assert_eq!(stage.get_str("index").unwrap(), "vector_index");
        assert_eq!(stage.get_str("path").unwrap(), "embedding");
        assert_eq!(stage.get_i64("numCandidates").unwrap(), 40);
        assert_eq!(stage.get_i64("limit").unwrap(), 4);
        assert_eq!(stage.get_array("queryVector").unwrap().len(), 2);

        let project = pipeline[1].get_document("$project").unwrap();
        assert_eq!(
            project.get_document("score").unwrap().get_str("$meta").unwrap(),
            "vectorSearchScore"
        );
        let matched = pipeline[2].get_document("$match").unwrap();
        assert_eq!(matched.get_str("metadata.lang").unwrap(), "rust");
    }

    #[test]
    fn test_regex_filter_escapes_text() {
        let filter = regex_filter("c++ (fast)", None).unwrap();
        let content = filter.get_document("content").unwrap();
        assert_eq!(content.get_str("$regex").unwrap(), r"c\+\+ \(fast\)");
        assert_eq!(content.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_document_conversion() {
        let document = VectorDocument::new("hello")
            .with_embedding(vec![0.5, 1.0])
            .with_metadata("page", 3);
        let stored = to_mongo_document(&document, "doc-1".to_string()).unwrap();
        assert_eq!(stored.get_str("_id").unwrap(), "doc-1");
        assert!(stored.get_datetime("createdAt").is_ok());

        let restored = from_mongo_document(&stored);
        assert_eq!(restored.id.as_deref(), Some("doc-1"));
        assert_eq!(restored.content, "hello");
        assert_eq!(restored.embedding, Some(vec![0.5, 1.0]));
        assert_eq!(restored.metadata.get("page"), Some(&json!(3)));
    }

    #[test]
    fn test_partial_update_merges_metadata() {
        let mut document = VectorDocument::new("").with_id("a").with_metadata("tag", "new");
        let set = update_document(&document).unwrap();
        assert!(!set.contains_key("content"));
        assert_eq!(set.get_str("metadata.tag").unwrap(), "new");

        document.metadata.clear();
        assert!(update_document(&document).unwrap().is_empty());
    }

    #[test]
    fn test_registry_info_defaults() {
        let info = registry_info("docs", 2, None, 384);
        assert_eq!(info.dimensions, 384);
        assert_eq!(info.distance_metric, DistanceMetric::Cosine);

        let entry = doc! { "_id": "docs", "dimensions": 3_i64, "distanceMetric": "euclidean", "description": "notes" };
        let info = registry_info("docs", 2, Some(&entry), 384);
        assert_eq!(info.dimensions, 3);
        assert_eq!(info.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(info.description.as_deref(), Some("notes"));
    }
}
