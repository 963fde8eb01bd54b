//! Outbound webhook registrations and payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::ConnectionStatus;

/// Event type that matches every subscription.
pub const WILDCARD_EVENT: &str = "*";

/// A registered webhook endpoint.
///
/// The signing secret itself is kept in the key store, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConnection {
    pub id: String,
    pub name: String,
    pub url: String,
    pub event_types: Vec<String>,
    #[serde(default)]
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secret_configured: bool,
}

impl WebhookConnection {
    pub fn new(name: impl Into<String>, url: impl Into<String>, event_types: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            event_types,
            status: ConnectionStatus::Connected,
            last_delivery: None,
            secret_configured: false,
        }
    }

    /// Exact event-type match, or a wildcard subscription.
    pub fn is_subscribed(&self, event_type: &str) -> bool {
        self.event_types
            .iter()
            .any(|t| t == event_type || t == WILDCARD_EVENT)
    }

    /// Key under which this webhook's secret lives in the key store.
    pub fn secret_key(&self) -> String {
        format!("WEBHOOK_SECRET_{}", key_suffix(&self.id))
    }
}

/// Upper-cased id with every non-alphanumeric character replaced by `_`,
/// usable in a key-store variable name.
pub(crate) fn key_suffix(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// An event sent to webhook endpoints. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl WebhookPayload {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Outcome of delivering one payload to one webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
}
