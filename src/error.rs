//! Error types for vectorhub.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Machine-readable error taxonomy shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    InternalError,
    RateLimitExceeded,
    NotConnected,
    CapabilityUnsupported,
    UnsupportedOperation,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::CapabilityUnsupported => "CAPABILITY_UNSUPPORTED",
            ErrorCode::UnsupportedOperation => "UNSUPPORTED_OPERATION",
        }
    }

    /// HTTP status a route layer reports for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::ValidationError => 400,
            ErrorCode::RateLimitExceeded => 429,
            ErrorCode::NotConnected => 503,
            ErrorCode::CapabilityUnsupported | ErrorCode::UnsupportedOperation => 501,
            ErrorCode::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to text chunking.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding API key not configured (set {0})")]
    MissingApiKey(String),

    #[error("failed to connect to embedding API: {0}")]
    ConnectionError(String),

    #[error("embedding API error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::MissingApiKey(_) | EmbeddingError::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised by vector database adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Not connected")]
    NotConnected,

    #[error("operation requires capability '{capability}', which this server does not support")]
    CapabilityUnsupported { capability: &'static str },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("failed to connect: {0}")]
    ConnectionError(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Request timeout")]
    Timeout,

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl AdapterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::NotConnected => ErrorCode::NotConnected,
            AdapterError::CapabilityUnsupported { .. } => ErrorCode::CapabilityUnsupported,
            AdapterError::Unsupported(_) => ErrorCode::UnsupportedOperation,
            AdapterError::NotFound(_) => ErrorCode::NotFound,
            AdapterError::Validation(_) => ErrorCode::ValidationError,
            AdapterError::HttpStatus { status: 404, .. } => ErrorCode::NotFound,
            AdapterError::HttpStatus { status: 429, .. } => ErrorCode::RateLimitExceeded,
            AdapterError::HttpStatus { status, .. } if (400..500).contains(status) => {
                ErrorCode::ValidationError
            }
            _ => ErrorCode::InternalError,
        }
    }

    /// Convert a non-success HTTP response into an error, consuming the body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        AdapterError::HttpStatus { status, body }
    }
}

impl Retryable for AdapterError {
    fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Timeout | AdapterError::ConnectionError(_) => true,
            AdapterError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            AdapterError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Errors related to webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook not found: {0}")]
    NotFound(String),

    #[error("invalid webhook: {0}")]
    Validation(String),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid signing secret")]
    InvalidSecret,

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors related to connection/webhook/MCP registries.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Errors related to the `.env` key store.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse key file: {0}")]
    ParseError(#[from] dotenvy::Error),

    #[error("invalid key name: {0}")]
    InvalidKey(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file read error: {0}")]
    FileReadError(String),

    #[error("directory walk error: {0}")]
    WalkError(String),

    #[error("chunking error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("no files found")]
    NoFilesFound,
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Adapter(e) => e.code(),
            AppError::Ingest(IngestError::Adapter(e)) => e.code(),
            AppError::Webhook(WebhookError::NotFound(_))
            | AppError::Repository(RepositoryError::NotFound(_)) => ErrorCode::NotFound,
            AppError::Webhook(WebhookError::Validation(_))
            | AppError::Config(ConfigError::ValidationError(_)) => ErrorCode::ValidationError,
            _ => ErrorCode::InternalError,
        }
    }
}
