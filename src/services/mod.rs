pub mod chunker;
pub mod embedding;
pub mod ingest;
pub mod keystore;
pub mod repository;
pub mod router;
pub mod vector_store;
pub mod webhook;

pub use chunker::{TextChunker, split_text};
pub use embedding::{EmbeddingClient, resolve_api_key};
pub use ingest::{IngestStats, Ingestor, collect_files};
pub use keystore::KeyStore;
pub use repository::{
    CONNECTIONS_FILE, JsonFileRepository, MCP_SERVERS_FILE, MemoryRepository, Record, Repository,
    WEBHOOKS_FILE,
};
pub use router::ClientRouter;
pub use vector_store::{ConnectionTestResult, VectorDbAdapter, create_adapter};
pub use webhook::{
    DeliveryOptions, WebhookDispatcher, deliver_webhook, generate_signature, verify_signature,
};
