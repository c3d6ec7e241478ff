use crate::error::{DocragError, Result};
use crate::payload::ChunkPayload;
use crate::store::{cosine_similarity, ScoredPoint, VectorRecord, VectorStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory vector store with brute-force cosine search.
///
/// Same trait, same filter semantics as the Qdrant client; intended for
/// tests, demos, and air-gapped runs. Points are keyed by chunk id in a
/// BTreeMap so `scroll` completes in a deterministic order.
#[derive(Default)]
pub struct MemoryStore {
    points: RwLock<BTreeMap<Uuid, (Vec<f32>, ChunkPayload)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, points: Vec<VectorRecord>) -> Result<()> {
        let mut guard = self.points.write().unwrap();
        for record in points {
            if let Some((existing, _)) = guard.values().next() {
                if existing.len() != record.vector.len() {
                    return Err(DocragError::InvalidArgument(format!(
                        "vector dimension {} does not match store dimension {}",
                        record.vector.len(),
                        existing.len()
                    )));
                }
            }
            guard.insert(record.chunk_id, (record.vector, record.payload));
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        doc_ids: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>> {
        let guard = self.points.read().unwrap();

        let mut scored: Vec<ScoredPoint> = guard
            .iter()
            .filter(|(_, (_, payload))| match doc_ids {
                Some(ids) => ids.iter().any(|id| *id == payload.doc_id),
                None => true,
            })
            .map(|(chunk_id, (stored, payload))| ScoredPoint {
                chunk_id: *chunk_id,
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_where(&self, doc_id: &str) -> Result<()> {
        let mut guard = self.points.write().unwrap();
        guard.retain(|_, (_, payload)| payload.doc_id != doc_id);
        Ok(())
    }

    async fn scroll(&self) -> Result<Vec<ChunkPayload>> {
        let guard = self.points.read().unwrap();
        Ok(guard.values().map(|(_, payload)| payload.clone()).collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.read().unwrap().len())
    }
}
