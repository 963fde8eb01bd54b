use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::{ConnectionStatus, McpCapabilities};
use super::webhook::key_suffix;

/// A registered MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConnection {
    pub id: String,
    pub name: String,
    pub server_url: String,
    #[serde(default)]
    pub status: ConnectionStatus,
    #[serde(default)]
    pub capabilities: McpCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
}

impl McpConnection {
    pub fn new(name: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            server_url: server_url.into(),
            status: ConnectionStatus::Disconnected,
            capabilities: McpCapabilities::default(),
            protocol_version: None,
            last_connected: None,
        }
    }

    /// Key-store entry holding the server's API key, if one was given.
    pub fn api_key_name(&self) -> String {
        format!("MCP_API_KEY_{}", key_suffix(&self.id))
    }
}
