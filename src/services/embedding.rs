//! Embedding client for the OpenAI-compatible `/v1/embeddings` API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::services::keystore::KeyStore;
use crate::utils::{RetryConfig, with_retry};

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Resolve the API key: environment variable first, then the key store.
pub fn resolve_api_key(
    config: &EmbeddingConfig,
    keystore: Option<&KeyStore>,
) -> Result<String, EmbeddingError> {
    if let Ok(key) = std::env::var(&config.api_key_env)
        && !key.trim().is_empty()
    {
        return Ok(key);
    }

    if let Some(store) = keystore {
        match store.get(&config.api_key_env) {
            Ok(Some(key)) if !key.trim().is_empty() => return Ok(key),
            Ok(_) => {}
            Err(e) => tracing::warn!("failed to read key store: {e}"),
        }
    }

    Err(EmbeddingError::MissingApiKey(config.api_key_env.clone()))
}

/// Client for generating embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    dimensions: u32,
    batch_size: usize,
    retry: RetryConfig,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1) as usize,
            retry: RetryConfig::default(),
        })
    }

    /// Build a client, resolving the key from the environment or key store.
    pub fn from_config(
        config: &EmbeddingConfig,
        keystore: Option<&KeyStore>,
    ) -> Result<Self, EmbeddingError> {
        let api_key = resolve_api_key(config, keystore)?;
        Self::new(config, api_key)
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Embed many texts, one request per batch.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let embeddings = with_retry(&self.retry, |_| self.embed_single_batch(chunk))
                .await
                .into_result()?;
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let mut embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if embed_response.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embed_response.data.len()
            )));
        }

        embed_response.data.sort_by_key(|item| item.index);
        Ok(embed_response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector width configured for this model.
    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }
}
