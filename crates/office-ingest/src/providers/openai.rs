//! OpenAI embedding provider
//!
//! Talks to any OpenAI-compatible `/embeddings` endpoint. Retries are left to
//! the caller's `RetryPolicy` so failed batches can be split per chunk.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::providers::embedding::EmbeddingProvider;
use crate::types::EmbeddingVector;

/// OpenAI embedding provider
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    /// * `api_key` - Bearer token for the service
    /// * `config` - Model, base URL, dimensions and timeout
    pub fn new(api_key: &str, config: &EmbeddingConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing embedding API key".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| Error::Config("embedding API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .pool_max_idle_per_host(20)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbedResponse {
    /// Vectors in input order
    fn into_vectors(mut self, expected: usize) -> Result<Vec<EmbeddingVector>> {
        if self.data.len() != expected {
            return Err(Error::embedding(format!(
                "service returned {} embeddings for {} inputs",
                self.data.len(),
                expected
            )));
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self
            .data
            .into_iter()
            .map(|entry| EmbeddingVector::new(entry.embedding))
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding in response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Upstream {
                service: "embedding service",
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        parsed.into_vectors(texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}
