use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unit of retrieval: one contiguous text span carved out of a document
/// page. Immutable once indexed.
///
/// The fixed fields replace the string-keyed maps the payload used to
/// travel in; anything the caller wants passed through unchanged goes in
/// `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Globally unique 128-bit identifier; also the vector-store point id
    pub chunk_id: Uuid,
    pub doc_id: String,
    pub doc_title: String,
    /// Zero-based ordinal within the document
    pub chunk_index: usize,
    /// 1-based page number, when the extractor provides one.
    /// Serialized unconditionally: the payload round-trips through the
    /// binary BM25 snapshot, which needs a fixed field layout.
    #[serde(default)]
    pub page_num: Option<u32>,
    /// UTF-8 body used for BM25 scoring and prompt construction
    pub text: String,
    /// Opaque key/value bag, passed through unchanged
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl ChunkPayload {
    /// Convenience constructor for the common case of no page number and
    /// no extra metadata.
    pub fn new(
        doc_id: impl Into<String>,
        doc_title: impl Into<String>,
        chunk_index: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: Uuid::new_v4(),
            doc_id: doc_id.into(),
            doc_title: doc_title.into(),
            chunk_index,
            page_num: None,
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Blend weights applied by the position-aware reranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub retrieval: f32,
    pub rerank: f32,
}

/// One ranked candidate surviving the pipeline.
///
/// `retrieval_score`, `rerank_score`, and `blend_weights` are populated
/// only when the reranker ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk_id: Uuid,
    pub score: f32,
    pub payload: ChunkPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_weights: Option<BlendWeights>,
}

impl RetrievalResult {
    pub fn new(chunk_id: Uuid, score: f32, payload: ChunkPayload) -> Self {
        Self {
            chunk_id,
            score,
            payload,
            retrieval_score: None,
            rerank_score: None,
            blend_weights: None,
        }
    }
}

/// Engine output for one query.
///
/// A low-confidence envelope is a successful outcome, not an error: it
/// still carries whatever candidates were retrieved so the caller can
/// show them as best-guess context. Answer synthesis is delegated to the
/// LLM collaborator; the engine only returns `sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    /// Ordered highest score first
    pub sources: Vec<RetrievalResult>,
    /// Number of candidates surviving the pipeline
    pub retrieved_count: usize,
    /// Set when the top score fails the configured threshold (or when
    /// nothing was retrieved at all)
    pub low_confidence: bool,
    /// Top-1 score, populated on the below-threshold low-confidence path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,
}

impl AnswerEnvelope {
    /// Envelope for the no-candidates case.
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            retrieved_count: 0,
            low_confidence: true,
            top_score: None,
        }
    }
}

/// Envelope plus the synthesized natural-language answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedAnswer {
    pub answer: String,
    pub envelope: AnswerEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serde_round_trip() {
        let mut payload = ChunkPayload::new("doc1", "Python Guide", 0, "Python is a language");
        payload.page_num = Some(3);
        payload
            .metadata
            .insert("lang".to_string(), Value::String("en".to_string()));

        let json = serde_json::to_string(&payload).unwrap();
        let back: ChunkPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_metadata_passes_through_unknown_keys() {
        let json = r#"{
            "chunk_id": "9b8e7c1a-1111-4222-8333-444455556666",
            "doc_id": "d",
            "doc_title": "T",
            "chunk_index": 2,
            "text": "body",
            "metadata": {"source_system": "legacy", "weight": 4}
        }"#;
        let payload: ChunkPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.metadata.get("source_system").unwrap(), "legacy");
        assert_eq!(payload.metadata.get("weight").unwrap(), 4);
    }

    #[test]
    fn test_result_optional_fields_absent_by_default() {
        let payload = ChunkPayload::new("d", "T", 0, "body");
        let result = RetrievalResult::new(payload.chunk_id, 0.8, payload);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("retrieval_score").is_none());
        assert!(json.get("rerank_score").is_none());
        assert!(json.get("blend_weights").is_none());
    }

    #[test]
    fn test_empty_envelope_is_low_confidence() {
        let envelope = AnswerEnvelope::empty();
        assert!(envelope.low_confidence);
        assert_eq!(envelope.retrieved_count, 0);
        assert!(envelope.top_score.is_none());
        assert!(envelope.sources.is_empty());
    }
}
