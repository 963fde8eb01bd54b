mod collection;
mod config;
mod connection;
mod document;
mod mcp;
mod search;
mod webhook;

pub use collection::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, DistanceMetric,
};
pub use config::{
    ChunkingConfig, Config, DEFAULT_API_KEY_ENV, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, EmbeddingConfig, LoggingConfig, SearchConfig,
    StorageConfig, WebhookDeliveryConfig,
};
pub use connection::{
    BackendConfig, ConnectionConfig, ConnectionStatus, DEFAULT_DIMENSIONS, McpAdapterConfig,
    McpCapabilities, MockConfig, MongoDbConfig, SupabaseConfig, VectorDbType,
    WebhookAdapterConfig, WebhookEndpoints,
};
pub use document::VectorDocument;
pub use mcp::McpConnection;
pub use search::{DEFAULT_TOP_K, OutputFormat, SearchQuery, SearchResult, SearchResults, rank_results};
pub use webhook::{DeliveryResult, WILDCARD_EVENT, WebhookConnection, WebhookPayload};
