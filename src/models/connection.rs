//! Connection configuration for vector database backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_DIMENSIONS: u32 = 1536;

/// Kind of vector database behind a connection.
///
/// Only some kinds have an adapter; the rest are recognised so that stored
/// connections round-trip, and are served by the mock adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum VectorDbType {
    #[default]
    Mock,
    MongoDb,
    Supabase,
    Webhook,
    Mcp,
    Pinecone,
    Qdrant,
    Weaviate,
    Chroma,
    Milvus,
    PgVector,
    /// Any other backend name.
    Other(String),
}

impl VectorDbType {
    /// Whether a dedicated adapter exists for this type.
    pub fn has_adapter(&self) -> bool {
        matches!(
            self,
            VectorDbType::Mock
                | VectorDbType::MongoDb
                | VectorDbType::Supabase
                | VectorDbType::Webhook
                | VectorDbType::Mcp
        )
    }
}

impl fmt::Display for VectorDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VectorDbType::Mock => "mock",
            VectorDbType::MongoDb => "mongodb",
            VectorDbType::Supabase => "supabase",
            VectorDbType::Webhook => "webhook",
            VectorDbType::Mcp => "mcp",
            VectorDbType::Pinecone => "pinecone",
            VectorDbType::Qdrant => "qdrant",
            VectorDbType::Weaviate => "weaviate",
            VectorDbType::Chroma => "chroma",
            VectorDbType::Milvus => "milvus",
            VectorDbType::PgVector => "pgvector",
            VectorDbType::Other(s) => s,
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for VectorDbType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "mock" => VectorDbType::Mock,
            "mongodb" | "mongo" => VectorDbType::MongoDb,
            "supabase" => VectorDbType::Supabase,
            "webhook" => VectorDbType::Webhook,
            "mcp" => VectorDbType::Mcp,
            "pinecone" => VectorDbType::Pinecone,
            "qdrant" => VectorDbType::Qdrant,
            "weaviate" => VectorDbType::Weaviate,
            "chroma" => VectorDbType::Chroma,
            "milvus" => VectorDbType::Milvus,
            "pgvector" => VectorDbType::PgVector,
            other => VectorDbType::Other(other.to_string()),
        })
    }
}

impl Serialize for VectorDbType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VectorDbType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let Ok(db_type) = s.parse::<VectorDbType>();
        Ok(db_type)
    }
}

/// Connection state of an adapter, webhook or MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockConfig {
    pub dimensions: u32,
    /// Populate a small demo collection on connect.
    pub seed_demo: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            seed_demo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoDbConfig {
    pub uri: String,
    pub database: String,
    #[serde(default = "default_vector_index")]
    pub vector_index: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    /// Propagate errors from read paths instead of returning empty results.
    #[serde(default)]
    pub strict_reads: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_match_function")]
    pub match_function: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub strict_reads: bool,
}

/// Paths, relative to the base URL, used by the webhook adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookEndpoints {
    pub create: String,
    pub read: String,
    pub update: String,
    pub delete: String,
    pub search: String,
}

impl Default for WebhookEndpoints {
    fn default() -> Self {
        Self {
            create: "/create".to_string(),
            read: "/read".to_string(),
            update: "/update".to_string(),
            delete: "/delete".to_string(),
            search: "/search".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAdapterConfig {
    pub base_url: String,
    #[serde(default)]
    pub endpoints: WebhookEndpoints,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Path probed by `test_connection`; defaults to the read endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_adapter_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Vector capabilities an MCP server may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpCapabilities {
    pub vector_search: bool,
    pub vector_create: bool,
    pub vector_update: bool,
    pub vector_delete: bool,
}

impl Default for McpCapabilities {
    fn default() -> Self {
        Self {
            vector_search: true,
            vector_create: true,
            vector_update: true,
            vector_delete: true,
        }
    }
}

impl McpCapabilities {
    /// Capabilities allowed by both sides.
    pub fn intersect(self, other: McpCapabilities) -> McpCapabilities {
        McpCapabilities {
            vector_search: self.vector_search && other.vector_search,
            vector_create: self.vector_create && other.vector_create,
            vector_update: self.vector_update && other.vector_update,
            vector_delete: self.vector_delete && other.vector_delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpAdapterConfig {
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub capabilities: McpCapabilities,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_vector_index() -> String {
    "vector_index".to_string()
}

fn default_table() -> String {
    "documents".to_string()
}

fn default_match_function() -> String {
    "match_documents".to_string()
}

fn default_dimensions() -> u32 {
    DEFAULT_DIMENSIONS
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    3
}

fn default_adapter_retry_delay_ms() -> u64 {
    1000
}

/// Backend-specific settings, discriminated by the connection type.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Mock(MockConfig),
    MongoDb(MongoDbConfig),
    Supabase(SupabaseConfig),
    Webhook(WebhookAdapterConfig),
    Mcp(McpAdapterConfig),
    /// A type with no adapter; the raw settings are kept as-is.
    Unsupported { db_type: VectorDbType, raw: Value },
}

impl BackendConfig {
    pub fn db_type(&self) -> VectorDbType {
        match self {
            BackendConfig::Mock(_) => VectorDbType::Mock,
            BackendConfig::MongoDb(_) => VectorDbType::MongoDb,
            BackendConfig::Supabase(_) => VectorDbType::Supabase,
            BackendConfig::Webhook(_) => VectorDbType::Webhook,
            BackendConfig::Mcp(_) => VectorDbType::Mcp,
            BackendConfig::Unsupported { db_type, .. } => db_type.clone(),
        }
    }

    /// Parse the `config` object of a connection according to its type.
    pub fn from_json(db_type: VectorDbType, value: Value) -> Result<Self, serde_json::Error> {
        let value = if value.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            value
        };

        Ok(match db_type {
            VectorDbType::Mock => BackendConfig::Mock(serde_json::from_value(value)?),
            VectorDbType::MongoDb => BackendConfig::MongoDb(serde_json::from_value(value)?),
            VectorDbType::Supabase => BackendConfig::Supabase(serde_json::from_value(value)?),
            VectorDbType::Webhook => BackendConfig::Webhook(serde_json::from_value(value)?),
            VectorDbType::Mcp => BackendConfig::Mcp(serde_json::from_value(value)?),
            other => BackendConfig::Unsupported {
                db_type: other,
                raw: value,
            },
        })
    }

    pub fn to_json(&self) -> Value {
        let result = match self {
            BackendConfig::Mock(c) => serde_json::to_value(c),
            BackendConfig::MongoDb(c) => serde_json::to_value(c),
            BackendConfig::Supabase(c) => serde_json::to_value(c),
            BackendConfig::Webhook(c) => serde_json::to_value(c),
            BackendConfig::Mcp(c) => serde_json::to_value(c),
            BackendConfig::Unsupported { raw, .. } => Ok(raw.clone()),
        };
        result.unwrap_or(Value::Null)
    }
}

/// A saved connection to one vector database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConnectionConfig", into = "RawConnectionConfig")]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub backend: BackendConfig,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: ConnectionStatus::Disconnected,
            last_sync: None,
            backend,
        }
    }

    pub fn db_type(&self) -> VectorDbType {
        self.backend.db_type()
    }

    /// Record the outcome of a sync against the backend.
    pub fn mark_synced(&mut self, status: ConnectionStatus) {
        self.status = status;
        if status == ConnectionStatus::Connected {
            self.last_sync = Some(Utc::now());
        }
    }
}

/// Wire shape: `{id, name, type, status, lastSync, config}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConnectionConfig {
    id: String,
    name: String,
    #[serde(rename = "type")]
    db_type: VectorDbType,
    #[serde(default)]
    status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawConnectionConfig> for ConnectionConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawConnectionConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            name: raw.name,
            status: raw.status,
            last_sync: raw.last_sync,
            backend: BackendConfig::from_json(raw.db_type, raw.config)?,
        })
    }
}

impl From<ConnectionConfig> for RawConnectionConfig {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            db_type: config.backend.db_type(),
            config: config.backend.to_json(),
            id: config.id,
            name: config.name,
            status: config.status,
            last_sync: config.last_sync,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_db_type_parse_roundtrip() {
        assert_eq!("MongoDB".parse::<VectorDbType>().unwrap(), VectorDbType::MongoDb);
        assert_eq!(
            "faiss".parse::<VectorDbType>().unwrap(),
            VectorDbType::Other("faiss".to_string())
        );
        assert_eq!(VectorDbType::PgVector.to_string(), "pgvector");
    }

    #[test]
    fn test_connection_config_wire_shape() {
        let config = ConnectionConfig::new(
            "docs",
            BackendConfig::Supabase(SupabaseConfig {
                url: "https://x.supabase.co".to_string(),
                api_key: "key".to_string(),
                table: "documents".to_string(),
                match_function: "match_documents".to_string(),
                dimensions: 1536,
                timeout_ms: 30_000,
                strict_reads: false,
            }),
        );

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["type"], "supabase");
        assert_eq!(value["status"], "disconnected");
        assert_eq!(value["config"]["apiKey"], "key");

        let back: ConnectionConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_unknown_type_is_kept_raw() {
        let value = json!({
            "id": "1",
            "name": "pc",
            "type": "pinecone",
            "config": {"apiKey": "abc", "environment": "us-east"}
        });
        let config: ConnectionConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.db_type(), VectorDbType::Pinecone);
        assert!(matches!(config.backend, BackendConfig::Unsupported { .. }));
        assert_eq!(config.backend.to_json()["environment"], "us-east");
    }

    #[test]
    fn test_mock_config_accepts_missing_config() {
        let value = json!({"id": "1", "name": "m", "type": "mock"});
        let config: ConnectionConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.backend, BackendConfig::Mock(MockConfig::default()));
    }

    #[test]
    fn test_typed_config_rejects_missing_fields() {
        let value = json!({"id": "1", "name": "m", "type": "mongodb", "config": {}});
        assert!(serde_json::from_value::<ConnectionConfig>(value).is_err());
    }

    #[test]
    fn test_capabilities_intersect() {
        let declared = McpCapabilities {
            vector_create: false,
            ..Default::default()
        };
        let merged = McpCapabilities::default().intersect(declared);
        assert!(!merged.vector_create);
        assert!(merged.vector_search);
    }

    #[test]
    fn test_mark_synced() {
        let mut config = ConnectionConfig::new("m", BackendConfig::Mock(MockConfig::default()));
        config.mark_synced(ConnectionStatus::Error);
        assert!(config.last_sync.is_none());
        config.mark_synced(ConnectionStatus::Connected);
        assert!(config.last_sync.is_some());
    }
}
