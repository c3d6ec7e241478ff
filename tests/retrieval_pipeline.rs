//! End-to-end pipeline scenarios against the in-memory vector store,
//! with a deterministic topic-vocabulary embedder, a token-overlap
//! cross-encoder, and a scripted LLM.

use async_trait::async_trait;
use docrag::config::RetrievalConfig;
use docrag::error::{DocragError, Result};
use docrag::models::{CrossEncoder, Embedder, Llm};
use docrag::payload::ChunkPayload;
use docrag::store::MemoryStore;
use docrag::tokenizer::tokenize;
use docrag::{RetrievalEngine, SearchOptions};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

/// Maps tokens onto three topic dimensions (python/ml, web, weather),
/// so vocabulary-different but topic-related texts land close together
/// in cosine space. Unknown tokens are ignored.
struct TopicEmbedder;

const PYTHON_ML: &[&str] = &[
    "python", "language", "languages", "programming", "high-level", "data", "analysis",
    "machine", "learning", "scikit-learn", "classifier", "train", "uses", "basics", "tutorial",
];
const WEB: &[&str] = &["javascript", "browsers", "web", "development", "runs"];
const WEATHER: &[&str] = &["weather", "forecast", "tomorrow"];

impl TopicEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; 3];
        for token in tokenize(text) {
            if PYTHON_ML.contains(&token.as_str()) {
                vector[0] += 1.0;
            } else if WEB.contains(&token.as_str()) {
                vector[1] += 1.0;
            } else if WEATHER.contains(&token.as_str()) {
                vector[2] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Cross-encoder behaving like a real ms-marco model: strongly negative
/// for irrelevant pairs, rising with query/passage token overlap.
struct MarginEncoder;

#[async_trait]
impl CrossEncoder for MarginEncoder {
    async fn score_many(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, text)| {
                let q: HashSet<String> = tokenize(query).into_iter().collect();
                let overlap = tokenize(text).iter().filter(|t| q.contains(*t)).count();
                overlap as f32 * 2.0 - 4.0
            })
            .collect())
    }
}

struct ParaphraseLlm;

#[async_trait]
impl Llm for ParaphraseLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("alternative phrasings") {
            return Ok("1. Python machine learning\n2. scikit-learn uses".to_string());
        }
        Ok("Synthesized from sources.".to_string())
    }
}

struct OfflineLlm;

#[async_trait]
impl Llm for OfflineLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(DocragError::Model("generation endpoint error 503".to_string()))
    }
}

fn corpus_a() -> Vec<ChunkPayload> {
    let mut c1 = ChunkPayload::new("p", "Python Guide", 0, "Python is a high-level programming language");
    c1.page_num = Some(1);
    let mut c2 = ChunkPayload::new("p", "Python Guide", 1, "Machine learning with Python uses scikit-learn");
    c2.page_num = Some(2);
    let mut c3 = ChunkPayload::new("j", "JavaScript Guide", 0, "JavaScript runs in browsers for web development");
    c3.page_num = Some(1);
    vec![c1, c2, c3]
}

fn engine_with_llm(dir: &TempDir, llm: Arc<dyn Llm>) -> RetrievalEngine {
    RetrievalEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(TopicEmbedder),
        Arc::new(MarginEncoder),
        llm,
        dir.path(),
        RetrievalConfig::default(),
    )
}

fn engine(dir: &TempDir) -> RetrievalEngine {
    engine_with_llm(dir, Arc::new(ParaphraseLlm))
}

#[tokio::test]
async fn test_bm25_only_keyword_hit() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        use_hybrid: Some(true),
        hybrid_alpha: Some(0.0),
        use_rrf: Some(false),
        use_reranker: Some(false),
        ..Default::default()
    };
    let envelope = engine.retrieve("scikit-learn", &opts).await.unwrap();

    assert!(!envelope.low_confidence);
    let top = &envelope.sources[0];
    assert!(top.payload.text.contains("scikit-learn"));
    assert!((top.score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_vector_only_semantic_hit() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        use_hybrid: Some(false),
        use_reranker: Some(false),
        ..Default::default()
    };
    let envelope = engine
        .retrieve("language for data analysis", &opts)
        .await
        .unwrap();

    // Both Python chunks outrank the JavaScript one; the top two never
    // include it
    assert!(envelope.retrieved_count >= 2);
    for source in &envelope.sources[..2] {
        assert_eq!(source.payload.doc_id, "p");
    }
}

#[tokio::test]
async fn test_doc_id_filter_scopes_retrieval() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        doc_ids: Some(vec!["j".to_string()]),
        use_reranker: Some(false),
        ..Default::default()
    };
    let envelope = engine.retrieve("programming", &opts).await.unwrap();

    assert_eq!(envelope.retrieved_count, 1);
    assert_eq!(envelope.sources[0].payload.doc_id, "j");
    assert!(envelope.sources[0].payload.text.contains("JavaScript"));
}

#[tokio::test]
async fn test_low_confidence_gate_for_off_corpus_question() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        min_score: Some(0.6),
        ..Default::default()
    };
    let envelope = engine
        .retrieve("weather forecast tomorrow", &opts)
        .await
        .unwrap();

    assert!(envelope.low_confidence);
    assert!(!envelope.sources.is_empty(), "best-guess sources are still returned");
    let top = envelope.top_score.expect("top_score populated on the gate path");
    assert!(top < 0.6);
}

#[tokio::test]
async fn test_consistency_after_delete() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    engine.delete_document("p").await.unwrap();
    engine.coordinator().verify().await.unwrap();
    assert_eq!(engine.coordinator().bm25_len().await, 1);

    let opts = SearchOptions {
        use_reranker: Some(false),
        ..Default::default()
    };
    let envelope = engine.retrieve("Python", &opts).await.unwrap();
    assert!(envelope.sources.iter().all(|s| s.payload.doc_id != "p"));
}

#[tokio::test]
async fn test_reranker_keeps_relevant_chunk_on_top() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let mut chunks = corpus_a();
    chunks.push(ChunkPayload::new("p", "Python Guide", 2, "Python basics tutorial"));
    engine.ingest(chunks).await.unwrap();

    let envelope = engine
        .retrieve(
            "how do I train a classifier with scikit-learn",
            &SearchOptions::default(),
        )
        .await
        .unwrap();

    // The scikit-learn chunk wins and carries full blend provenance
    let top = &envelope.sources[0];
    assert!(top.payload.text.contains("scikit-learn"));
    assert!(top.retrieval_score.is_some());
    assert!(top.rerank_score.is_some());
    let weights = top.blend_weights.expect("position-aware blending records weights");
    assert!((weights.retrieval + weights.rerank - 1.0).abs() < 1e-6);
    // Blended score stays between its two inputs
    let lo = top.retrieval_score.unwrap().min(top.rerank_score.unwrap());
    let hi = top.retrieval_score.unwrap().max(top.rerank_score.unwrap());
    assert!(top.score >= lo - 1e-6 && top.score <= hi + 1e-6);
}

#[tokio::test]
async fn test_query_expansion_end_to_end() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        use_query_expansion: Some(true),
        expansion_variants: Some(2),
        use_reranker: Some(false),
        ..Default::default()
    };
    let envelope = engine.retrieve("What is Python?", &opts).await.unwrap();

    assert!(!envelope.low_confidence);
    assert_eq!(envelope.sources[0].payload.doc_id, "p");
    // Fusion across variants must not duplicate chunks
    let ids: HashSet<_> = envelope.sources.iter().map(|s| s.chunk_id).collect();
    assert_eq!(ids.len(), envelope.sources.len());
}

#[tokio::test]
async fn test_expansion_llm_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_llm(&dir, Arc::new(OfflineLlm));
    engine.ingest(corpus_a()).await.unwrap();

    let opts = SearchOptions {
        use_query_expansion: Some(true),
        use_reranker: Some(false),
        ..Default::default()
    };
    // Falls back to the original query alone; retrieval still succeeds
    let envelope = engine.retrieve("scikit-learn", &opts).await.unwrap();
    assert!(!envelope.low_confidence);
    assert!(envelope.sources[0].payload.text.contains("scikit-learn"));
}

#[tokio::test]
async fn test_doc_filter_soundness_across_option_combinations() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    for use_hybrid in [true, false] {
        for use_rrf in [true, false] {
            for doc_ids in [vec!["p".to_string()], vec!["j".to_string()]] {
                let allowed: HashSet<&str> = doc_ids.iter().map(String::as_str).collect();
                let opts = SearchOptions {
                    doc_ids: Some(doc_ids.clone()),
                    use_hybrid: Some(use_hybrid),
                    use_rrf: Some(use_rrf),
                    use_reranker: Some(false),
                    ..Default::default()
                };
                let envelope = engine
                    .retrieve("python programming development", &opts)
                    .await
                    .unwrap();
                for source in &envelope.sources {
                    assert!(
                        allowed.contains(source.payload.doc_id.as_str()),
                        "doc {} leaked through filter {:?}",
                        source.payload.doc_id,
                        doc_ids
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_index_consistency_over_write_sequences() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);

    engine.ingest(corpus_a()).await.unwrap();
    engine.coordinator().verify().await.unwrap();

    engine
        .ingest(vec![ChunkPayload::new("k", "Kubernetes Guide", 0, "container orchestration")])
        .await
        .unwrap();
    engine.coordinator().verify().await.unwrap();

    engine.delete_document("j").await.unwrap();
    engine.coordinator().verify().await.unwrap();

    // Deleting twice leaves the same final state as deleting once
    engine.delete_document("j").await.unwrap();
    engine.coordinator().verify().await.unwrap();
    assert_eq!(engine.coordinator().bm25_len().await, 3);

    engine.delete_document("p").await.unwrap();
    engine.delete_document("k").await.unwrap();
    engine.coordinator().verify().await.unwrap();
    assert_eq!(engine.coordinator().bm25_len().await, 0);
}

#[tokio::test]
async fn test_grounded_answer_paths() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine.ingest(corpus_a()).await.unwrap();

    let confident = engine
        .answer_question("scikit-learn machine learning", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(confident.answer, "Synthesized from sources.");

    let gated = engine
        .answer_question(
            "weather forecast tomorrow",
            &SearchOptions {
                min_score: Some(0.6),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(gated.envelope.low_confidence);
    assert!(gated.answer.contains("don't have enough information"));
}
