pub mod memory;
pub mod qdrant;

use crate::error::Result;
use crate::payload::ChunkPayload;
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

/// One point to upsert: a chunk, its dense vector, and its payload.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk_id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// One ANN search hit, already sorted by the backend.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub chunk_id: Uuid,
    /// Cosine similarity against the query vector
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Facade over the external ANN database.
///
/// Implementations never leak backend-specific types: callers see
/// `VectorRecord`/`ScoredPoint`/`ChunkPayload` only, and every failure
/// maps into the unified error taxonomy (`Upstream` for backend
/// trouble). The vector store is the source of truth for the corpus;
/// the BM25 index is rebuilt from `scroll`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace points by chunk id.
    async fn upsert(&self, points: Vec<VectorRecord>) -> Result<()>;

    /// Nearest-neighbor search by cosine similarity, descending.
    ///
    /// When `doc_ids` is present, only points whose payload `doc_id` is
    /// in the set may be returned; the filter is applied inside the
    /// backend, never as a post-filter.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        doc_ids: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Remove every point belonging to `doc_id`.
    async fn delete_where(&self, doc_id: &str) -> Result<()>;

    /// Stream every payload in the collection, with deterministic
    /// completion. Used exclusively by the index coordinator to rebuild
    /// the BM25 index.
    async fn scroll(&self) -> Result<Vec<ChunkPayload>>;

    /// Health check.
    async fn ping(&self) -> Result<()>;

    /// Number of points currently stored.
    async fn count(&self) -> Result<usize>;
}

/// Cosine similarity between two equal-length vectors; zero-magnitude
/// inputs score 0.0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must share a dimension");

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.6, 0.8, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_magnitude_independent() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[2.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
