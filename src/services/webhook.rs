//! Signed webhook delivery with retries and fan-out.

use chrono::Utc;
use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::WebhookError;
use crate::models::{
    ConnectionStatus, DeliveryResult, WebhookConnection, WebhookDeliveryConfig, WebhookPayload,
};
use crate::services::keystore::KeyStore;
use crate::services::repository::Repository;
use crate::utils::{Backoff, RetryConfig, RetryResult, Retryable, with_retry};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const ID_HEADER: &str = "X-Webhook-Id";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const USER_AGENT: &str = concat!("vectorhub-webhook/", env!("CARGO_PKG_VERSION"));

/// Event type sent by [`WebhookDispatcher::test_webhook`].
pub const TEST_EVENT: &str = "webhook.test";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn generate_signature(payload: &str, secret: &str) -> Result<String, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature in constant time. Accepts bare or `sha256=`-prefixed hex.
pub fn verify_signature(payload: &str, signature: &str, secret: &str) -> bool {
    let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Retry and timeout settings for one delivery.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Delay after the first failure; doubled after each further one.
    pub retry_delay: Duration,
    /// Hard limit for each attempt.
    pub timeout: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self::from_config(&WebhookDeliveryConfig::default())
    }
}

impl DeliveryOptions {
    pub fn from_config(config: &WebhookDeliveryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(self.retry_delay)
            .with_max_delay(Duration::from_secs(300))
            .with_backoff(Backoff::Exponential)
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    Status { status: u16, body: String },
    Timeout,
    Network(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            AttemptError::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            AttemptError::Timeout => write!(f, "Request timeout"),
            AttemptError::Network(msg) => write!(f, "{msg}"),
        }
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status { status, .. } => !(400..500).contains(status),
            AttemptError::Timeout | AttemptError::Network(_) => true,
        }
    }
}

async fn send_once(
    client: &Client,
    connection: &WebhookConnection,
    payload: &WebhookPayload,
    body: &str,
    signature: Option<&str>,
    timeout: Duration,
) -> Result<u16, AttemptError> {
    let mut request = client
        .post(&connection.url)
        .timeout(timeout)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .header(EVENT_HEADER, &payload.event_type)
        .header(ID_HEADER, &payload.id)
        .header(TIMESTAMP_HEADER, payload.timestamp.to_rfc3339())
        .body(body.to_string());

    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, format!("{SIGNATURE_PREFIX}{signature}"));
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AttemptError::Timeout
        } else {
            AttemptError::Network(e.to_string())
        }
    })?;

    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(status);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AttemptError::Status { status, body })
}

/// Deliver one payload to one webhook, retrying transient failures.
///
/// 4xx responses fail immediately. 5xx responses, network errors and
/// timeouts are retried until `max_retries` attempts have been made.
pub async fn deliver_webhook(
    client: &Client,
    connection: &WebhookConnection,
    payload: &WebhookPayload,
    secret: Option<&str>,
    options: &DeliveryOptions,
) -> DeliveryResult {
    let started = Instant::now();
    let failed = |error: String| DeliveryResult {
        success: false,
        status_code: None,
        error: Some(error),
        duration_ms: started.elapsed().as_millis() as u64,
        attempts: 0,
    };

    let body = match serde_json::to_string(payload) {
        Ok(body) => body,
        Err(e) => return failed(WebhookError::from(e).to_string()),
    };
    let signature = match secret.map(|s| generate_signature(&body, s)).transpose() {
        Ok(signature) => signature,
        Err(e) => return failed(e.to_string()),
    };

    let result = with_retry(&options.retry_config(), |attempt| {
        tracing::debug!(
            webhook = %connection.id,
            event = %payload.event_type,
            attempt,
            "delivering webhook"
        );
        send_once(
            client,
            connection,
            payload,
            &body,
            signature.as_deref(),
            options.timeout,
        )
    })
    .await;

    let duration_ms = started.elapsed().as_millis() as u64;
    match result {
        RetryResult::Success {
            value: status,
            attempts,
        } => DeliveryResult {
            success: true,
            status_code: Some(status),
            error: None,
            duration_ms,
            attempts,
        },
        RetryResult::Failed {
            last_error,
            attempts,
        } => {
            tracing::warn!(
                webhook = %connection.id,
                url = %connection.url,
                attempts,
                "webhook delivery failed: {last_error}"
            );
            let status_code = match &last_error {
                AttemptError::Status { status, .. } => Some(*status),
                _ => None,
            };
            DeliveryResult {
                success: false,
                status_code,
                error: Some(last_error.to_string()),
                duration_ms,
                attempts,
            }
        }
    }
}

/// Manages registered webhooks and fans events out to them.
pub struct WebhookDispatcher {
    client: Client,
    repository: Arc<dyn Repository<WebhookConnection>>,
    keystore: Option<KeyStore>,
    options: DeliveryOptions,
}

impl WebhookDispatcher {
    pub fn new(
        repository: Arc<dyn Repository<WebhookConnection>>,
        keystore: Option<KeyStore>,
        options: DeliveryOptions,
    ) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;
        Ok(Self {
            client,
            repository,
            keystore,
            options,
        })
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    pub async fn list(&self) -> Result<Vec<WebhookConnection>, WebhookError> {
        Ok(self.repository.list().await?)
    }

    /// Register a webhook; the secret, if any, goes to the key store.
    pub async fn register(
        &self,
        name: &str,
        url: &str,
        event_types: Vec<String>,
        secret: Option<&str>,
    ) -> Result<WebhookConnection, WebhookError> {
        validate_url(url)?;
        if event_types.is_empty() {
            return Err(WebhookError::Validation(
                "at least one event type is required".to_string(),
            ));
        }

        let mut hook = WebhookConnection::new(name, url, event_types);
        if let Some(secret) = secret {
            let store = self.keystore.as_ref().ok_or_else(|| {
                WebhookError::Validation("no key store available for the secret".to_string())
            })?;
            store
                .set(&hook.secret_key(), secret)
                .map_err(|e| WebhookError::Validation(e.to_string()))?;
            hook.secret_configured = true;
        }

        self.repository.upsert(hook.clone()).await?;
        tracing::info!(webhook = %hook.id, url = %hook.url, "registered webhook");
        Ok(hook)
    }

    /// Remove a webhook and its stored secret.
    pub async fn unregister(&self, id_or_name: &str) -> Result<WebhookConnection, WebhookError> {
        let hook = self.find(id_or_name).await?;
        self.repository.remove(&hook.id).await?;
        if let Some(store) = &self.keystore
            && let Err(e) = store.remove(&hook.secret_key())
        {
            tracing::warn!(webhook = %hook.id, "failed to remove webhook secret: {e}");
        }
        Ok(hook)
    }

    pub async fn find(&self, id_or_name: &str) -> Result<WebhookConnection, WebhookError> {
        self.repository
            .find(id_or_name)
            .await
            .map_err(|_| WebhookError::NotFound(id_or_name.to_string()))
    }

    fn secret_for(&self, hook: &WebhookConnection) -> Option<String> {
        if !hook.secret_configured {
            return None;
        }
        let store = self.keystore.as_ref()?;
        match store.get(&hook.secret_key()) {
            Ok(secret) => secret,
            Err(e) => {
                tracing::warn!(webhook = %hook.id, "failed to read webhook secret: {e}");
                None
            }
        }
    }

    async fn deliver_and_record(
        &self,
        mut hook: WebhookConnection,
        payload: &WebhookPayload,
        options: &DeliveryOptions,
    ) -> (String, DeliveryResult) {
        let secret = self.secret_for(&hook);
        let result = deliver_webhook(&self.client, &hook, payload, secret.as_deref(), options).await;

        hook.status = if result.success {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Error
        };
        hook.last_delivery = Some(Utc::now());
        if let Err(e) = self.repository.upsert(hook.clone()).await {
            tracing::warn!(webhook = %hook.id, "failed to record delivery: {e}");
        }

        (hook.id, result)
    }

    /// Deliver an event to every webhook subscribed to it.
    ///
    /// Only `Disconnected` hooks are skipped. A hook left in `Error` by a
    /// failed delivery stays a target and returns to `Connected` on its next
    /// success. Deliveries run concurrently; the map is keyed by webhook id.
    pub async fn broadcast_webhook(
        &self,
        event_type: &str,
        data: Value,
    ) -> Result<BTreeMap<String, DeliveryResult>, WebhookError> {
        let payload = WebhookPayload::new(event_type, data);
        let targets: Vec<WebhookConnection> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|h| h.status != ConnectionStatus::Disconnected && h.is_subscribed(event_type))
            .collect();

        tracing::debug!(event = event_type, targets = targets.len(), "broadcasting event");

        let deliveries = targets
            .into_iter()
            .map(|hook| self.deliver_and_record(hook, &payload, &self.options));
        Ok(join_all(deliveries).await.into_iter().collect())
    }

    /// Send a single `webhook.test` event without retries.
    pub async fn test_webhook(&self, id_or_name: &str) -> Result<DeliveryResult, WebhookError> {
        let hook = self.find(id_or_name).await?;
        let payload = WebhookPayload::new(
            TEST_EVENT,
            serde_json::json!({
                "message": "Test webhook from vectorhub",
                "webhookId": hook.id,
            }),
        );
        let options = DeliveryOptions {
            max_retries: 1,
            ..self.options.clone()
        };
        let (_, result) = self.deliver_and_record(hook, &payload, &options).await;
        Ok(result)
    }
}

fn validate_url(url: &str) -> Result<(), WebhookError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| WebhookError::Validation(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WebhookError::Validation(format!(
            "unsupported URL scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::repository::MemoryRepository;
    use crate::test_support::{spawn_server, unused_url};
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        hits: Arc<Mutex<Vec<(Instant, HeaderMap, String)>>>,
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.hits.lock().unwrap().len()
        }
    }

    async fn record(State(rec): State<Recorder>, headers: HeaderMap, body: Bytes) -> StatusCode {
        let body = String::from_utf8_lossy(&body).to_string();
        rec.hits.lock().unwrap().push((Instant::now(), headers, body));
        StatusCode::OK
    }

    async fn server_with(status: StatusCode) -> (String, Recorder) {
        let rec = Recorder::default();
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(rec): State<Recorder>, headers: HeaderMap, body: Bytes| async move {
                        record(State(rec), headers, body).await;
                        status
                    },
                ),
            )
            .with_state(rec.clone());
        (format!("{}/hook", spawn_server(router).await), rec)
    }

    fn fast_options(max_retries: u32) -> DeliveryOptions {
        DeliveryOptions {
            max_retries,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        }
    }

    fn hook(url: &str) -> WebhookConnection {
        WebhookConnection::new("test", url, vec!["*".to_string()])
    }

    #[test]
    fn test_signature_roundtrip() {
        let payload = r#"{"type":"document.created"}"#;
        let signature = generate_signature(payload, "s3cret").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(payload, &signature, "s3cret"));
        assert!(verify_signature(payload, &format!("sha256={signature}"), "s3cret"));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let payload = r#"{"type":"document.created"}"#;
        let signature = generate_signature(payload, "s3cret").unwrap();
        assert!(!verify_signature(r#"{"type":"document.deleted"}"#, &signature, "s3cret"));
        assert!(!verify_signature(payload, &signature, "other"));
        assert!(!verify_signature(payload, "not-hex", "s3cret"));
    }

    #[tokio::test]
    async fn test_delivery_success_sends_headers() {
        let (url, rec) = server_with(StatusCode::OK).await;
        let payload = WebhookPayload::new("document.created", serde_json::json!({"id": "1"}));

        let result =
            deliver_webhook(&Client::new(), &hook(&url), &payload, Some("key"), &fast_options(3))
                .await;

        assert!(result.success);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.attempts, 1);

        let hits = rec.hits.lock().unwrap();
        let (_, headers, body) = &hits[0];
        assert_eq!(headers[EVENT_HEADER], "document.created");
        assert_eq!(headers[ID_HEADER], payload.id.as_str());
        assert!(headers.contains_key(TIMESTAMP_HEADER));
        let signature = headers[SIGNATURE_HEADER].to_str().unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature(body, signature, "key"));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, rec) = server_with(StatusCode::NOT_FOUND).await;
        let payload = WebhookPayload::new("x", Value::Null);

        let result =
            deliver_webhook(&Client::new(), &hook(&url), &payload, None, &fast_options(3)).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(rec.count(), 1);
    }

    #[tokio::test]
    async fn test_server_error_retries_with_growing_delay() {
        let (url, rec) = server_with(StatusCode::INTERNAL_SERVER_ERROR).await;
        let payload = WebhookPayload::new("x", Value::Null);
        let options = DeliveryOptions {
            retry_delay: Duration::from_millis(60),
            ..fast_options(3)
        };

        let result = deliver_webhook(&Client::new(), &hook(&url), &payload, None, &options).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(rec.count(), 3);

        let hits = rec.hits.lock().unwrap();
        let first_gap = hits[1].0 - hits[0].0;
        let second_gap = hits[2].0 - hits[1].0;
        assert!(first_gap >= Duration::from_millis(60));
        assert!(second_gap >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_network_error_is_retried() {
        let url = unused_url().await;
        let payload = WebhookPayload::new("x", Value::Null);

        let result =
            deliver_webhook(&Client::new(), &hook(&url), &payload, None, &fast_options(2)).await;

        assert!(!result.success);
        assert_eq!(result.attempts, 2);
        assert!(result.status_code.is_none());
    }

    #[tokio::test]
    async fn test_timeout_message() {
        let router = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                StatusCode::OK
            }),
        );
        let url = format!("{}/slow", spawn_server(router).await);
        let options = DeliveryOptions {
            timeout: Duration::from_millis(100),
            ..fast_options(1)
        };

        let result = deliver_webhook(
            &Client::new(),
            &hook(&url),
            &WebhookPayload::new("x", Value::Null),
            None,
            &options,
        )
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Request timeout"));
    }

    fn dispatcher(keystore: Option<KeyStore>) -> (WebhookDispatcher, Arc<MemoryRepository<WebhookConnection>>) {
        let repo = Arc::new(MemoryRepository::new());
        let dispatcher = WebhookDispatcher::new(repo.clone(), keystore, fast_options(2)).unwrap();
        (dispatcher, repo)
    }

    #[tokio::test]
    async fn test_broadcast_targets_subscribed_connected_hooks() {
        let (ok_url, ok_rec) = server_with(StatusCode::OK).await;
        let (other_url, other_rec) = server_with(StatusCode::OK).await;
        let (down_url, down_rec) = server_with(StatusCode::OK).await;
        let (dispatcher, repo) = dispatcher(None);

        let subscribed = dispatcher
            .register("ok", &ok_url, vec!["document.created".to_string()], None)
            .await
            .unwrap();
        dispatcher
            .register("other", &other_url, vec!["document.deleted".to_string()], None)
            .await
            .unwrap();
        let mut disconnected = dispatcher
            .register("down", &down_url, vec!["*".to_string()], None)
            .await
            .unwrap();
        disconnected.status = ConnectionStatus::Disconnected;
        repo.upsert(disconnected).await.unwrap();

        let results = dispatcher
            .broadcast_webhook("document.created", serde_json::json!({"id": "42"}))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[&subscribed.id].success);
        assert_eq!(ok_rec.count(), 1);
        assert_eq!(other_rec.count(), 0);
        assert_eq!(down_rec.count(), 0);

        let stored = repo.get(&subscribed.id).await.unwrap().unwrap();
        assert!(stored.last_delivery.is_some());
        assert_eq!(stored.status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_broadcast_marks_failed_hook_and_keeps_targeting_it() {
        let (url, rec) = server_with(StatusCode::BAD_REQUEST).await;
        let (dispatcher, repo) = dispatcher(None);
        let hook = dispatcher
            .register("bad", &url, vec!["*".to_string()], None)
            .await
            .unwrap();

        let results = dispatcher
            .broadcast_webhook("anything", Value::Null)
            .await
            .unwrap();
        assert!(!results[&hook.id].success);

        let stored = repo.get(&hook.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Error);

        let results = dispatcher
            .broadcast_webhook("anything", Value::Null)
            .await
            .unwrap();
        assert!(results.contains_key(&hook.id));
        assert_eq!(rec.count(), 2);
    }

    #[tokio::test]
    async fn test_webhook_test_event_is_signed_with_stored_secret() {
        let (url, rec) = server_with(StatusCode::SERVICE_UNAVAILABLE).await;
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::in_dir(dir.path());
        let (dispatcher, _) = dispatcher(Some(store.clone()));

        let hook = dispatcher
            .register("signed", &url, vec!["*".to_string()], Some("topsecret"))
            .await
            .unwrap();
        assert!(hook.secret_configured);
        assert_eq!(
            store.get(&hook.secret_key()).unwrap().as_deref(),
            Some("topsecret")
        );

        let result = dispatcher.test_webhook("signed").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 1);

        let hits = rec.hits.lock().unwrap();
        let (_, headers, body) = &hits[0];
        assert_eq!(headers[EVENT_HEADER], TEST_EVENT);
        let signature = headers[SIGNATURE_HEADER].to_str().unwrap();
        assert!(verify_signature(body, signature, "topsecret"));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (dispatcher, _) = dispatcher(None);
        assert!(matches!(
            dispatcher
                .register("x", "ftp://example.com", vec!["*".to_string()], None)
                .await,
            Err(WebhookError::Validation(_))
        ));
        assert!(dispatcher
            .register("x", "http://example.com", vec![], None)
            .await
            .is_err());
        assert!(dispatcher
            .register("x", "http://example.com", vec!["*".to_string()], Some("s"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unregister_removes_secret() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::in_dir(dir.path());
        let (dispatcher, _) = dispatcher(Some(store.clone()));
        let hook = dispatcher
            .register("gone", "http://example.com/hook", vec!["*".to_string()], Some("s"))
            .await
            .unwrap();

        dispatcher.unregister("gone").await.unwrap();
        assert!(dispatcher.list().await.unwrap().is_empty());
        assert_eq!(store.get(&hook.secret_key()).unwrap(), None);
        assert!(matches!(
            dispatcher.unregister("gone").await,
            Err(WebhookError::NotFound(_))
        ));
    }
}
