mod chunk;
mod collection;
mod config;
mod connection;
mod document;
mod keys;
mod mcp;
mod search;
mod status;
mod webhook;

pub use chunk::ChunkArgs;
pub use collection::CollectionCommand;
pub use config::ConfigCommand;
pub use connection::ConnectionCommand;
pub use document::DocumentCommand;
pub use keys::KeysCommand;
pub use mcp::McpCommand;
pub use search::SearchArgs;
pub use webhook::WebhookCommand;

pub use chunk::handle_chunk;
pub use collection::handle_collection;
pub use config::handle_config;
pub use connection::handle_connection;
pub use document::handle_document;
pub use keys::handle_keys;
pub use mcp::handle_mcp;
pub use search::handle_search;
pub use status::handle_status;
pub use webhook::handle_webhook;

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::{Config, ConnectionConfig, McpConnection, WebhookConnection};
use crate::services::{
    CONNECTIONS_FILE, ClientRouter, EmbeddingClient, JsonFileRepository, KeyStore,
    MCP_SERVERS_FILE, Repository, WEBHOOKS_FILE,
};

/// Config, data directory and stores shared by the command handlers.
pub(crate) struct AppContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub keystore: KeyStore,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let config = Config::load().context("failed to load config")?;
        let data_dir = config.data_dir()?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let keystore = KeyStore::in_dir(&data_dir);
        Ok(Self {
            config,
            data_dir,
            keystore,
        })
    }

    pub fn connections(&self) -> JsonFileRepository<ConnectionConfig> {
        JsonFileRepository::new(self.data_dir.join(CONNECTIONS_FILE))
    }

    pub fn webhooks(&self) -> Arc<dyn Repository<WebhookConnection>> {
        Arc::new(JsonFileRepository::<WebhookConnection>::new(
            self.data_dir.join(WEBHOOKS_FILE),
        ))
    }

    pub fn mcp_servers(&self) -> JsonFileRepository<McpConnection> {
        JsonFileRepository::new(self.data_dir.join(MCP_SERVERS_FILE))
    }

    /// Embedding client, or `None` with a warning when no API key is set.
    pub fn embedder(&self) -> Option<EmbeddingClient> {
        match EmbeddingClient::from_config(&self.config.embedding, Some(&self.keystore)) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("embeddings disabled: {e}");
                None
            }
        }
    }

    /// Connect a router to a saved connection.
    pub async fn router(&self, connection: &str) -> Result<(ClientRouter, ConnectionConfig)> {
        let config = self
            .connections()
            .find(connection)
            .await
            .with_context(|| format!("unknown connection '{connection}'"))?;
        let mut router = ClientRouter::new();
        router
            .connect(&config)
            .await
            .with_context(|| format!("failed to connect to '{}'", config.name))?;
        Ok((router, config))
    }
}

/// Parse a JSON object given on the command line.
pub(crate) fn parse_object(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("expected a JSON object")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}
