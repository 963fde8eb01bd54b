//! Adapter for a vector store exposed through a custom REST service.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::time::Duration;

use super::{ConnectionTestResult, VectorDbAdapter, decode, ensure_connected, require_ids};
use crate::error::AdapterError;
use crate::models::{
    CollectionConfig, CollectionInfo, CollectionStats, CollectionUpdate, ConnectionStatus,
    SearchQuery, SearchResult, VectorDbType, VectorDocument, WebhookAdapterConfig,
};
use crate::utils::{Backoff, RetryConfig, with_retry};

/// Which configured endpoint an operation is sent to.
#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Create,
    Read,
    Update,
    Delete,
    Search,
}

/// Adapter posting `{operation, collection, ...}` bodies to a REST service.
pub struct WebhookAdapter {
    config: WebhookAdapterConfig,
    client: Client,
    status: ConnectionStatus,
}

impl WebhookAdapter {
    pub fn new(config: WebhookAdapterConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::ConnectionError(e.to_string()))?;
        Ok(Self {
            config,
            client,
            status: ConnectionStatus::Disconnected,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn endpoint(&self, endpoint: Endpoint) -> String {
        let endpoints = &self.config.endpoints;
        let path = match endpoint {
            Endpoint::Create => &endpoints.create,
            Endpoint::Read => &endpoints.read,
            Endpoint::Update => &endpoints.update,
            Endpoint::Delete => &endpoints.delete,
            Endpoint::Search => &endpoints.search,
        };
        self.url(path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<Value, AdapterError> {
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout
                } else {
                    AdapterError::Request(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(AdapterError::from_response(response).await);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    /// Post an operation, retrying transient failures with linear backoff.
    async fn call(&self, endpoint: Endpoint, body: Value) -> Result<Value, AdapterError> {
        ensure_connected(self.status)?;
        let url = self.endpoint(endpoint);
        let retry = RetryConfig::new(self.config.retries)
            .with_initial_delay(Duration::from_millis(self.config.retry_delay_ms))
            .with_backoff(Backoff::Linear);

        with_retry(&retry, |_| self.send_once(&url, &body))
            .await
            .into_result()
    }
}

#[async_trait]
impl VectorDbAdapter for WebhookAdapter {
    fn db_type(&self) -> VectorDbType {
        VectorDbType::Webhook
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        let probe = self.test_connection().await;
        if probe.success {
            self.status = ConnectionStatus::Connected;
            Ok(())
        } else {
            self.status = ConnectionStatus::Error;
            Err(AdapterError::ConnectionError(probe.message))
        }
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        let path = self
            .config
            .health_path
            .as_deref()
            .unwrap_or(&self.config.endpoints.read);
        let url = self.url(path);

        match self.request(reqwest::Method::GET, &url).send().await {
            Ok(response) if response.status().is_success() => {
                ConnectionTestResult::ok(format!("{url} responded {}", response.status()))
            }
            Ok(response) => {
                ConnectionTestResult::failed(format!("{url} responded {}", response.status()))
            }
            Err(e) if e.is_timeout() => ConnectionTestResult::failed("Request timeout"),
            Err(e) => ConnectionTestResult::failed(e.to_string()),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, AdapterError> {
        let value = self
            .call(Endpoint::Read, json!({"operation": "list_collections"}))
            .await?;
        decode(value, "collections")
    }

    async fn create_collection(
        &self,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo, AdapterError> {
        super::validate_collection_config(config)?;
        let value = self
            .call(
                Endpoint::Create,
                json!({
                    "operation": "create_collection",
                    "collection": config.name,
                    "config": config,
                }),
            )
            .await?;
        if value.is_null() {
            return Ok(CollectionInfo::from_config(config));
        }
        decode(value, "collection")
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo, AdapterError> {
        let value = self
            .call(
                Endpoint::Read,
                json!({"operation": "get_collection", "collection": name}),
            )
            .await?;
        if value.is_null() {
            return Err(AdapterError::NotFound(format!("collection '{name}'")));
        }
        decode(value, "collection")
    }

    async fn update_collection(
        &self,
        name: &str,
        updates: &CollectionUpdate,
    ) -> Result<CollectionInfo, AdapterError> {
        let value = self
            .call(
                Endpoint::Update,
                json!({
                    "operation": "update_collection",
                    "collection": name,
                    "updates": updates,
                }),
            )
            .await?;
        if value.is_null() {
            return self.get_collection(name).await;
        }
        decode(value, "collection")
    }

    async fn delete_collection(&self, name: &str, cascade: bool) -> Result<(), AdapterError> {
        self.call(
            Endpoint::Delete,
            json!({
                "operation": "delete_collection",
                "collection": name,
                "cascade": cascade,
            }),
        )
        .await?;
        Ok(())
    }

    async fn get_collection_stats(&self, name: &str) -> Result<CollectionStats, AdapterError> {
        let value = self
            .call(
                Endpoint::Read,
                json!({"operation": "get_collection_stats", "collection": name}),
            )
            .await?;
        decode(value, "stats")
    }

    async fn add_documents(
        &self,
        collection: &str,
        mut documents: Vec<VectorDocument>,
    ) -> Result<Vec<String>, AdapterError> {
        let ids: Vec<String> = documents.iter_mut().map(VectorDocument::ensure_id).collect();
        let value = self
            .call(
                Endpoint::Create,
                json!({
                    "operation": "add_documents",
                    "collection": collection,
                    "documents": documents,
                }),
            )
            .await?;
        if value.get("ids").is_some() {
            return decode(value, "ids");
        }
        Ok(ids)
    }

    async fn get_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<VectorDocument>, AdapterError> {
        let value = self
            .call(
                Endpoint::Read,
                json!({
                    "operation": "get_documents",
                    "collection": collection,
                    "ids": ids,
                }),
            )
            .await?;
        decode(value, "documents")
    }

    async fn update_documents(
        &self,
        collection: &str,
        documents: Vec<VectorDocument>,
    ) -> Result<u64, AdapterError> {
        require_ids(&documents)?;
        let submitted = documents.len() as u64;
        let value = self
            .call(
                Endpoint::Update,
                json!({
                    "operation": "update_documents",
                    "collection": collection,
                    "documents": documents,
                }),
            )
            .await?;
        Ok(value
            .get("updated")
            .and_then(Value::as_u64)
            .unwrap_or(submitted))
    }

    async fn delete_documents(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<u64, AdapterError> {
        let value = self
            .call(
                Endpoint::Delete,
                json!({
                    "operation": "delete_documents",
                    "collection": collection,
                    "ids": ids,
                }),
            )
            .await?;
        Ok(value
            .get("deleted")
            .and_then(Value::as_u64)
            .unwrap_or(ids.len() as u64))
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&Map<String, Value>>,
    ) -> Result<u64, AdapterError> {
        let value = self
            .call(
                Endpoint::Read,
                json!({
                    "operation": "count_documents",
                    "collection": collection,
                    "filter": filter,
                }),
            )
            .await?;
        decode(value, "count")
    }

    async fn search(
        &self,
        collection: &str,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        query.validate()?;
        let value = self
            .call(
                Endpoint::Search,
                json!({
                    "operation": "search",
                    "collection": collection,
                    "query": query,
                }),
            )
            .await?;
        decode(value, "results")
    }
}
