//! File and text ingestion: read, chunk, embed, store.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::models::{ChunkingConfig, VectorDocument};
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingClient;
use crate::services::router::ClientRouter;
use crate::utils::{calculate_checksum, content_type, is_text_file, read_file_content};

const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    pub files_scanned: u64,
    pub files_ingested: u64,
    pub files_skipped: u64,
    pub chunks_created: u64,
    pub documents_added: u64,
    pub embedded: bool,
    pub duration_ms: u64,
}

/// Feeds documents through the chunker and optional embedder into the
/// active connection.
pub struct Ingestor<'a> {
    router: &'a ClientRouter,
    chunker: TextChunker,
    embedder: Option<&'a EmbeddingClient>,
    max_file_size: u64,
    exclude_patterns: Vec<String>,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(router: &'a ClientRouter, config: &ChunkingConfig) -> Result<Self, IngestError> {
        Ok(Self {
            router,
            chunker: TextChunker::from_config(config)?,
            embedder: None,
            max_file_size: config.max_file_size,
            exclude_patterns: config.exclude_patterns.clone(),
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        })
    }

    pub fn with_embedder(mut self, embedder: &'a EmbeddingClient, batch_size: usize) -> Self {
        self.embedder = Some(embedder);
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_excludes(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.exclude_patterns.extend(patterns);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Chunk and store a single piece of text.
    pub async fn ingest_text(
        &self,
        collection: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<IngestStats, IngestError> {
        let start = Instant::now();
        let document = VectorDocument {
            metadata,
            ..VectorDocument::new(text)
        };
        let chunks = self.chunker.chunk_document(&document);

        let mut stats = IngestStats {
            chunks_created: chunks.len() as u64,
            embedded: self.embedder.is_some(),
            ..Default::default()
        };
        let mut pending = chunks;
        stats.documents_added = self.flush(collection, &mut pending).await?;
        stats.duration_ms = start.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Ingest a file, or every text file below a directory.
    pub async fn ingest_path(
        &self,
        collection: &str,
        path: &Path,
    ) -> Result<IngestStats, IngestError> {
        let start = Instant::now();
        let files = collect_files(path, &self.exclude_patterns)?;
        if files.is_empty() {
            return Err(IngestError::NoFilesFound);
        }

        let pb = if self.show_progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut stats = IngestStats {
            files_scanned: files.len() as u64,
            embedded: self.embedder.is_some(),
            ..Default::default()
        };
        let mut pending = Vec::new();

        for file in &files {
            pb.inc(1);
            let document = match self.read_document(file) {
                Ok(Some(document)) => document,
                Ok(None) => {
                    stats.files_skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %file.display(), "skipping file: {e}");
                    stats.files_skipped += 1;
                    continue;
                }
            };

            let chunks = self.chunker.chunk_document(&document);
            stats.files_ingested += 1;
            stats.chunks_created += chunks.len() as u64;
            pending.extend(chunks);

            if pending.len() >= self.batch_size {
                stats.documents_added += self.flush(collection, &mut pending).await?;
            }
        }
        if !pending.is_empty() {
            stats.documents_added += self.flush(collection, &mut pending).await?;
        }

        pb.finish_and_clear();
        stats.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            collection,
            files = stats.files_ingested,
            chunks = stats.chunks_created,
            "ingest finished"
        );
        Ok(stats)
    }

    /// `None` for binary or empty files.
    fn read_document(&self, path: &Path) -> Result<Option<VectorDocument>, IngestError> {
        if !is_text_file(path) {
            return Ok(None);
        }
        let content = read_file_content(path, self.max_file_size)
            .map_err(|e| IngestError::FileReadError(format!("{}: {e}", path.display())))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let mut document = VectorDocument::new(content.as_str())
            .with_metadata("source", path.to_string_lossy().to_string())
            .with_metadata("contentType", content_type(path))
            .with_metadata("checksum", calculate_checksum(&content))
            .with_metadata("sizeBytes", content.len() as u64);
        if let Some(name) = path.file_name() {
            document = document.with_metadata("filename", name.to_string_lossy().to_string());
        }
        Ok(Some(document))
    }

    async fn flush(
        &self,
        collection: &str,
        pending: &mut Vec<VectorDocument>,
    ) -> Result<u64, IngestError> {
        if pending.is_empty() {
            return Ok(0);
        }
        let mut batch = std::mem::take(pending);

        if let Some(embedder) = self.embedder {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            for (document, vector) in batch.iter_mut().zip(vectors) {
                document.embedding = Some(vector);
            }
        }

        let ids = self.router.add_documents(collection, batch).await?;
        tracing::debug!(collection, count = ids.len(), "stored batch");
        Ok(ids.len() as u64)
    }
}

/// Files under `path`, skipping any whose path matches an exclude glob.
pub fn collect_files(path: &Path, exclude: &[String]) -> Result<Vec<PathBuf>, IngestError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        return Err(IngestError::FileReadError(format!(
            "{}: no such file or directory",
            path.display()
        )));
    }

    let patterns: Vec<glob::Pattern> = exclude
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, "ignoring invalid exclude pattern: {e}");
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::WalkError(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path_str = entry.path().to_string_lossy();
        if patterns.iter().any(|p| p.matches(&path_str)) {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendConfig, CollectionConfig, ConnectionConfig, EmbeddingConfig, MockConfig};
    use crate::test_support::spawn_server;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::fs;

    async fn router_with_collection(dimensions: u32) -> ClientRouter {
        let mut router = ClientRouter::new();
        router
            .connect(&ConnectionConfig::new(
                "local",
                BackendConfig::Mock(MockConfig {
                    dimensions,
                    seed_demo: false,
                }),
            ))
            .await
            .unwrap();
        router
            .create_collection(&CollectionConfig::new("docs", dimensions))
            .await
            .unwrap();
        router
    }

    fn chunking(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_files_honours_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("config"), "x").unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes").join("b.md"), "beta").unwrap();

        let files = collect_files(dir.path(), &ChunkingConfig::default().exclude_patterns).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string(), "b.md".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("short.txt"), "A short note.").unwrap();
        let long = "Sentence number one is here. ".repeat(10);
        fs::write(dir.path().join("long.md"), &long).unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
        fs::write(dir.path().join("empty.txt"), "  ").unwrap();

        let router = router_with_collection(3).await;
        let ingestor = Ingestor::new(&router, &chunking(100, 20)).unwrap();
        let stats = ingestor.ingest_path("docs", dir.path()).await.unwrap();

        assert_eq!(stats.files_scanned, 4);
        assert_eq!(stats.files_ingested, 2);
        assert_eq!(stats.files_skipped, 2);
        assert!(stats.chunks_created > 2);
        assert_eq!(stats.documents_added, stats.chunks_created);
        assert!(!stats.embedded);
        assert_eq!(
            router.count_documents("docs", None).await.unwrap(),
            stats.chunks_created
        );

        let mut filter = Map::new();
        filter.insert("filename".to_string(), json!("short.txt"));
        assert_eq!(router.count_documents("docs", Some(&filter)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let router = router_with_collection(3).await;
        let ingestor = Ingestor::new(&router, &chunking(100, 20)).unwrap();
        assert!(matches!(
            ingestor.ingest_path("docs", dir.path()).await,
            Err(IngestError::NoFilesFound)
        ));
    }

    #[tokio::test]
    async fn test_ingest_text_with_embeddings() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                let count = body["input"].as_array().map_or(0, Vec::len);
                let data: Vec<Value> = (0..count)
                    .map(|i| json!({"index": i, "embedding": [1.0, 0.0]}))
                    .collect();
                Json(json!({ "data": data }))
            }),
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

        let router = router_with_collection(2).await;
        let ingestor = Ingestor::new(&router, &chunking(60, 10))
            .unwrap()
            .with_embedder(&embedder, 2);
        let text = "First sentence goes here. Second sentence follows it. Third one closes.";
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("inline"));
        let stats = ingestor.ingest_text("docs", text, metadata).await.unwrap();

        assert!(stats.embedded);
        assert!(stats.chunks_created > 1);
        let hits = router
            .search("docs", &crate::models::SearchQuery::vector(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(hits.len() as u64, stats.chunks_created.min(10));
        assert!(hits.iter().all(|h| h.metadata["source"] == json!("inline")));
    }
}
