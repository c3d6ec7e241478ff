use crate::cache::EmbeddingCache;
use crate::error::{DocragError, Result};
use crate::models::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Maximum texts per request accepted by OpenAI-compatible endpoints
const MAX_BATCH: usize = 2048;

const MAX_RETRIES: usize = 3;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedding client for an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Splits large inputs into batches, retries rate-limit and server
/// errors with exponential backoff, and optionally caches query
/// embeddings in an LRU.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_size: usize,
    cache: Option<Arc<EmbeddingCache>>,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DocragError::Model(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            dimension,
            batch_size: batch_size.clamp(1, MAX_BATCH),
            cache: None,
        })
    }

    /// Attach an LRU cache for query embeddings.
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DocragError::Model(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocragError::Model(format!(
                "embedding endpoint error {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DocragError::Model(format!("embedding response parse failed: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(DocragError::Model(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(DocragError::Model(format!(
                    "unexpected embedding dimension: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }
        Ok(vectors)
    }

    async fn request_batch_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    log::warn!("Embedding retry {}/{} after: {}", attempt + 1, MAX_RETRIES, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(e: &DocragError) -> bool {
    let text = e.to_string();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| text.contains(code))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(ref cache) = self.cache {
            if let Some(hit) = cache.get(text) {
                log::debug!("Embedding cache hit");
                return Ok(hit);
            }
        }

        let mut vectors = self.request_batch_with_retry(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| DocragError::Model("empty embedding response".to_string()))?;

        if let Some(ref cache) = self.cache {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.request_batch_with_retry(batch).await?);
        }
        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
