use crate::error::{DocragError, Result};
use crate::models::CrossEncoder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    texts: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

/// Cross-encoder client for a text-embeddings-inference style `/rerank`
/// endpoint.
///
/// The endpoint scores each (query, text) pair jointly and returns
/// entries keyed by input index; this client restores input order so
/// callers get one score per pair, positionally.
pub struct HttpCrossEncoder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpCrossEncoder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
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
        })
    }

    async fn rerank_one_query(&self, query: &str, texts: Vec<&str>) -> Result<Vec<f32>> {
        let expected = texts.len();
        let request = RerankRequest {
            model: &self.model,
            query,
            texts,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DocragError::Model(format!("rerank request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocragError::Model(format!(
                "rerank endpoint error {}: {}",
                status, body
            )));
        }

        let entries: Vec<RerankEntry> = response
            .json()
            .await
            .map_err(|e| DocragError::Model(format!("rerank response parse failed: {}", e)))?;

        let mut scores = vec![f32::NEG_INFINITY; expected];
        for entry in entries {
            if entry.index >= expected {
                return Err(DocragError::Model(format!(
                    "rerank endpoint returned index {} for {} inputs",
                    entry.index, expected
                )));
            }
            scores[entry.index] = entry.score;
        }
        if scores.iter().any(|s| s.is_infinite()) {
            return Err(DocragError::Model(
                "rerank endpoint left some inputs unscored".to_string(),
            ));
        }
        Ok(scores)
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score_many(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        // The endpoint takes one query and many passages; group
        // consecutive pairs sharing a query so the common case (one
        // query, n passages) is a single round-trip.
        let mut scores = Vec::with_capacity(pairs.len());
        let mut start = 0;
        while start < pairs.len() {
            let query = &pairs[start].0;
            let mut end = start + 1;
            while end < pairs.len() && pairs[end].0 == *query {
                end += 1;
            }
            let texts: Vec<&str> = pairs[start..end].iter().map(|(_, t)| t.as_str()).collect();
            scores.extend(self.rerank_one_query(query, texts).await?);
            start = end;
        }
        Ok(scores)
    }
}
