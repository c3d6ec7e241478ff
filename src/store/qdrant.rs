use crate::error::{DocragError, Result};
use crate::payload::ChunkPayload;
use crate::store::{ScoredPoint, VectorRecord, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Page size for scroll pagination
const SCROLL_PAGE: usize = 256;

/// Vector store client for a Qdrant instance, over its REST API.
///
/// One collection per corpus, cosine distance, dimension fixed by the
/// embedder. Wire types stay private to this module; callers only ever
/// see the unified store types and the unified error taxonomy.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    score: Option<f32>,
    payload: Option<ChunkPayload>,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<RawPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    points_count: Option<usize>,
}

#[derive(Serialize)]
struct UpsertPoint<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a ChunkPayload,
}

impl QdrantStore {
    /// Connect to `base_url` (e.g. `http://localhost:6333`) and ensure
    /// `collection` exists with the right dimension and cosine distance.
    pub async fn connect(base_url: &str, collection: &str, vector_size: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DocragError::Upstream(format!("HTTP client init failed: {}", e)))?;

        let store = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            vector_size,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url, self.collection, suffix
        )
    }

    fn transport_err(&self, op: &str, e: reqwest::Error) -> DocragError {
        DocragError::Upstream(format!("{} failed against {}: {}", op, self.base_url, e))
    }

    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<()> {
        let existing = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| self.transport_err("collection lookup", e))?;

        if existing.status().is_success() {
            log::debug!("Collection already exists: {}", self.collection);
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_err("collection create", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DocragError::Upstream(format!(
                "collection create rejected ({}): {}",
                status, detail
            )));
        }
        log::info!(
            "Created collection {} (dim {}, cosine)",
            self.collection,
            self.vector_size
        );
        Ok(())
    }

    async fn check(&self, op: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(DocragError::Upstream(format!(
            "{} rejected ({}): {}",
            op, status, detail
        )))
    }

    fn doc_filter(doc_ids: Option<&[String]>) -> Option<Value> {
        doc_ids.map(|ids| {
            json!({
                "must": [ { "key": "doc_id", "match": { "any": ids } } ]
            })
        })
    }

    fn parse_chunk_id(raw: &Value) -> Result<Uuid> {
        raw.as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                DocragError::Upstream(format!("backend returned a non-UUID point id: {}", raw))
            })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, points: Vec<VectorRecord>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        for record in &points {
            if record.vector.len() != self.vector_size {
                return Err(DocragError::InvalidArgument(format!(
                    "vector dimension {} does not match collection dimension {}",
                    record.vector.len(),
                    self.vector_size
                )));
            }
        }

        let body = json!({
            "points": points
                .iter()
                .map(|r| UpsertPoint {
                    id: r.chunk_id.to_string(),
                    vector: &r.vector,
                    payload: &r.payload,
                })
                .collect::<Vec<_>>()
        });

        let response = self
            .client
            .put(self.url("/points?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_err("upsert", e))?;
        self.check("upsert", response).await?;
        log::debug!("Upserted {} points into {}", points.len(), self.collection);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        doc_ids: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = Self::doc_filter(doc_ids) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(self.url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_err("search", e))?;
        let response = self.check("search", response).await?;

        let parsed: ApiResponse<Vec<RawPoint>> = response
            .json()
            .await
            .map_err(|e| DocragError::Upstream(format!("search response parse failed: {}", e)))?;

        parsed
            .result
            .into_iter()
            .map(|point| {
                let payload = point.payload.ok_or_else(|| {
                    DocragError::Upstream("search hit carried no payload".to_string())
                })?;
                Ok(ScoredPoint {
                    chunk_id: Self::parse_chunk_id(&point.id)?,
                    score: point.score.unwrap_or(0.0),
                    payload,
                })
            })
            .collect()
    }

    async fn delete_where(&self, doc_id: &str) -> Result<()> {
        let body = json!({
            "filter": { "must": [ { "key": "doc_id", "match": { "value": doc_id } } ] }
        });
        let response = self
            .client
            .post(self.url("/points/delete?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_err("delete", e))?;
        self.check("delete", response).await?;
        log::debug!("Deleted points for doc {} from {}", doc_id, self.collection);
        Ok(())
    }

    async fn scroll(&self) -> Result<Vec<ChunkPayload>> {
        let mut payloads = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(ref cursor) = offset {
                body["offset"] = cursor.clone();
            }

            let response = self
                .client
                .post(self.url("/points/scroll"))
                .json(&body)
                .send()
                .await
                .map_err(|e| self.transport_err("scroll", e))?;
            let response = self.check("scroll", response).await?;

            let parsed: ApiResponse<ScrollResult> = response.json().await.map_err(|e| {
                DocragError::Upstream(format!("scroll response parse failed: {}", e))
            })?;

            for point in parsed.result.points {
                if let Some(payload) = point.payload {
                    payloads.push(payload);
                }
            }

            match parsed.result.next_page_offset {
                Some(cursor) => offset = Some(cursor),
                None => break,
            }
        }

        Ok(payloads)
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_err("ping", e))?;
        self.check("ping", response).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map_err(|e| self.transport_err("collection info", e))?;
        let response = self.check("collection info", response).await?;

        let parsed: ApiResponse<CollectionInfo> = response.json().await.map_err(|e| {
            DocragError::Upstream(format!("collection info parse failed: {}", e))
        })?;
        Ok(parsed.result.points_count.unwrap_or(0))
    }
}
