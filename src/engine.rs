use crate::config::RetrievalConfig;
use crate::error::{DocragError, Result};
use crate::index::IndexCoordinator;
use crate::models::{CrossEncoder, Embedder, Llm};
use crate::payload::{AnswerEnvelope, ChunkPayload, GroundedAnswer, RetrievalResult};
use crate::search::{
    rrf_fuse, weighted_linear_fuse, BlendStrategy, Candidate, ExpandedQuery, QueryExpander,
    RankedList, Reranker,
};
use crate::store::{ScoredPoint, VectorRecord, VectorStore};
use futures_util::future::try_join_all;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed answer for the empty-candidate path.
const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant information in the documents to answer this question.";

/// Fixed answer for the below-threshold path.
const LOW_CONFIDENCE_ANSWER: &str = "I don't have enough information to answer that question \
     confidently. This could mean:\n\
     - The information isn't in the uploaded documents\n\
     - The question needs to be more specific\n\
     - Try rephrasing or check if the right documents are uploaded";

/// Per-request overrides; every `None` falls back to the configured
/// default.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    /// Scope retrieval to this document set
    pub doc_ids: Option<Vec<String>>,
    pub use_hybrid: Option<bool>,
    /// Weight used only in weighted-linear fusion
    pub hybrid_alpha: Option<f32>,
    pub use_rrf: Option<bool>,
    pub use_reranker: Option<bool>,
    pub rerank_blending: Option<BlendStrategy>,
    pub use_query_expansion: Option<bool>,
    pub expansion_variants: Option<usize>,
    pub min_score: Option<f32>,
    /// Per-query deadline; on expiry between stages the engine returns
    /// whatever partial candidates it has as a low-confidence envelope
    pub timeout: Option<Duration>,
}

/// Fully resolved parameters for one query.
struct SearchParams {
    top_k: usize,
    doc_ids: Option<Vec<String>>,
    use_hybrid: bool,
    hybrid_alpha: f32,
    use_rrf: bool,
    use_reranker: bool,
    rerank_blending: BlendStrategy,
    use_query_expansion: bool,
    expansion_variants: usize,
    min_score: f32,
    deadline: Option<Instant>,
}

/// Top-level retrieval orchestrator.
///
/// Drives one query through
/// `expand → embed → retrieve → fuse → rerank → gate` and one ingest
/// through `embed → upsert → BM25 rebuild`. All models and the vector
/// store are injected; the engine owns no process-wide state.
pub struct RetrievalEngine {
    coordinator: Arc<IndexCoordinator>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn Llm>,
    expander: QueryExpander,
    reranker: Reranker,
    defaults: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cross_encoder: Arc<dyn CrossEncoder>,
        llm: Arc<dyn Llm>,
        snapshot_dir: &Path,
        defaults: RetrievalConfig,
    ) -> Self {
        Self {
            coordinator: Arc::new(IndexCoordinator::new(store, snapshot_dir)),
            embedder,
            llm: llm.clone(),
            expander: QueryExpander::new(llm),
            reranker: Reranker::new(cross_encoder),
            defaults,
        }
    }

    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.coordinator
    }

    /// Embed `chunks` in batch, upsert them into the vector store, and
    /// rebuild the BM25 index. Returns the number of chunks ingested.
    pub async fn ingest(&self, chunks: Vec<ChunkPayload>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(DocragError::Model(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(payload, vector)| VectorRecord {
                chunk_id: payload.chunk_id,
                vector,
                payload,
            })
            .collect();

        self.coordinator.add(records).await
    }

    /// Remove a document's chunks from the vector store and the BM25
    /// index. Idempotent.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.coordinator.delete(doc_id).await
    }

    /// Health check against the vector store.
    pub async fn health(&self) -> Result<()> {
        self.coordinator.store().ping().await
    }

    /// Run the full retrieval pipeline for one question.
    pub async fn retrieve(&self, question: &str, opts: &SearchOptions) -> Result<AnswerEnvelope> {
        let params = self.resolve(opts)?;

        if question.trim().is_empty() && !params.use_query_expansion {
            return Err(DocragError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }

        // EXPANDED
        let expanded = if params.use_query_expansion {
            self.expander
                .expand(question, params.expansion_variants)
                .await
        } else {
            ExpandedQuery {
                variants: vec![question.to_string()],
                weights: vec![1.0],
            }
        };
        if deadline_expired(params.deadline) {
            return Ok(partial_envelope(Vec::new()));
        }

        // EMBEDDED
        let embeddings = self.embedder.embed_many(&expanded.variants).await?;
        if embeddings.len() != expanded.variants.len() {
            return Err(DocragError::Model(format!(
                "embedder returned {} vectors for {} variants",
                embeddings.len(),
                expanded.variants.len()
            )));
        }
        for vector in &embeddings {
            if vector.len() != self.embedder.dimension() {
                return Err(DocragError::Model(format!(
                    "unexpected embedding dimension: expected {}, got {}",
                    self.embedder.dimension(),
                    vector.len()
                )));
            }
        }
        if deadline_expired(params.deadline) {
            return Ok(partial_envelope(Vec::new()));
        }

        // RETRIEVED — doc-id filtering happens inside each leaf, never
        // after fusion (a post-filter would distort normalized scores)
        let multi = expanded.len() > 1;
        let fetch_k = if multi {
            params.top_k * 4
        } else if params.use_reranker {
            params.top_k * 2
        } else {
            params.top_k
        };

        let store = self.coordinator.store();
        let doc_slice = params.doc_ids.as_deref();
        let vector_lists: Vec<Vec<ScoredPoint>> = try_join_all(
            embeddings
                .iter()
                .map(|vector| store.query(vector, fetch_k, doc_slice)),
        )
        .await?;

        let bm25_lists: Vec<Vec<Candidate>> = if params.use_hybrid {
            // One shared guard across all variants: the whole BM25 scan
            // sees a single index snapshot
            let guard = self.coordinator.bm25_read(params.deadline).await?;
            let doc_set: Option<HashSet<String>> = params
                .doc_ids
                .as_ref()
                .map(|ids| ids.iter().cloned().collect());
            expanded
                .variants
                .iter()
                .map(|variant| {
                    guard
                        .search(variant, fetch_k, doc_set.as_ref())
                        .into_iter()
                        .map(|hit| {
                            Candidate::from_bm25(hit.payload.chunk_id, hit.score, hit.payload)
                        })
                        .collect()
                })
                .collect()
        } else {
            vec![Vec::new(); expanded.len()]
        };

        // FUSED
        let fused = fuse(&params, multi, &expanded.weights, vector_lists, bm25_lists);

        // RERANKED (skipped when disabled); an expired deadline returns
        // the fused head instead — completed sub-calls are not rolled
        // back, the reranker round-trip is simply never started
        let results = if params.use_reranker && !fused.is_empty() {
            if deadline_expired(params.deadline) {
                let mut partial = fused;
                partial.truncate(params.top_k);
                return Ok(partial_envelope(partial));
            }
            let mut pool = fused;
            pool.truncate(params.top_k * 2);
            self.reranker
                .rerank(question, pool, params.top_k, params.rerank_blending)
                .await?
        } else {
            let mut head = fused;
            head.truncate(params.top_k);
            head
        };

        // GATED
        Ok(gate(results, params.min_score))
    }

    /// Retrieve, then delegate answer synthesis to the LLM with a
    /// strict grounding prompt. Low-confidence envelopes map to fixed
    /// insufficiency messages without an LLM round-trip.
    pub async fn answer_question(
        &self,
        question: &str,
        opts: &SearchOptions,
    ) -> Result<GroundedAnswer> {
        let envelope = self.retrieve(question, opts).await?;

        if envelope.retrieved_count == 0 {
            return Ok(GroundedAnswer {
                answer: NO_RESULTS_ANSWER.to_string(),
                envelope,
            });
        }
        if envelope.low_confidence {
            return Ok(GroundedAnswer {
                answer: LOW_CONFIDENCE_ANSWER.to_string(),
                envelope,
            });
        }

        let prompt = grounding_prompt(question, &envelope.sources);
        let answer = self.llm.generate(&prompt).await?;
        Ok(GroundedAnswer { answer, envelope })
    }

    fn resolve(&self, opts: &SearchOptions) -> Result<SearchParams> {
        let top_k = opts.top_k.unwrap_or(self.defaults.top_k);
        if top_k == 0 {
            return Err(DocragError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }

        let hybrid_alpha = opts.hybrid_alpha.unwrap_or(self.defaults.hybrid_alpha);
        if !(0.0..=1.0).contains(&hybrid_alpha) {
            return Err(DocragError::InvalidArgument(format!(
                "hybrid_alpha must be within [0, 1], got {}",
                hybrid_alpha
            )));
        }

        let rerank_blending = match opts.rerank_blending {
            Some(strategy) => strategy,
            None => BlendStrategy::from_str(&self.defaults.rerank_blending)?,
        };

        Ok(SearchParams {
            top_k,
            doc_ids: opts.doc_ids.clone(),
            use_hybrid: opts.use_hybrid.unwrap_or(self.defaults.use_hybrid),
            hybrid_alpha,
            use_rrf: opts.use_rrf.unwrap_or(self.defaults.use_rrf),
            use_reranker: opts.use_reranker.unwrap_or(self.defaults.use_reranker),
            rerank_blending,
            use_query_expansion: opts
                .use_query_expansion
                .unwrap_or(self.defaults.use_query_expansion),
            expansion_variants: opts
                .expansion_variants
                .unwrap_or(self.defaults.expansion_variants),
            min_score: opts.min_score.unwrap_or(self.defaults.min_score),
            deadline: opts.timeout.map(|t| Instant::now() + t),
        })
    }
}

fn deadline_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Envelope for a deadline-expired query: whatever was already ranked,
/// flagged low-confidence.
fn partial_envelope(sources: Vec<RetrievalResult>) -> AnswerEnvelope {
    let top_score = sources.first().map(|r| r.score);
    AnswerEnvelope {
        retrieved_count: sources.len(),
        low_confidence: true,
        top_score,
        sources,
    }
}

/// Select the fusion mode for the retrieved candidate lists.
///
/// Multi-variant retrieval always fuses with RRF across every
/// (variant × index) list, weighted per variant. Single-variant hybrid
/// fuses vector+BM25 with RRF or the legacy weighted-linear blend.
/// Pure vector search skips fusion: the cosine similarity itself
/// (clamped to [0, 1]) is the confidence signal the gate sees.
fn fuse(
    params: &SearchParams,
    multi: bool,
    weights: &[f32],
    vector_lists: Vec<Vec<ScoredPoint>>,
    bm25_lists: Vec<Vec<Candidate>>,
) -> Vec<RetrievalResult> {
    let to_candidates = |points: Vec<ScoredPoint>| -> Vec<Candidate> {
        points
            .into_iter()
            .map(|p| Candidate::from_vector(p.chunk_id, p.score, p.payload))
            .collect()
    };

    if multi || (params.use_hybrid && params.use_rrf) {
        let mut lists = Vec::with_capacity(vector_lists.len() * 2);
        for (idx, (vector, bm25)) in vector_lists.into_iter().zip(bm25_lists).enumerate() {
            let weight = weights.get(idx).copied().unwrap_or(1.0);
            lists.push(RankedList::weighted(weight, to_candidates(vector)));
            if !bm25.is_empty() {
                lists.push(RankedList::weighted(weight, bm25));
            }
        }
        return rrf_fuse(lists);
    }

    let mut vector_lists = vector_lists;
    let mut bm25_lists = bm25_lists;
    let vector = to_candidates(vector_lists.remove(0));
    let bm25 = bm25_lists.remove(0);

    if params.use_hybrid {
        weighted_linear_fuse(vector, bm25, params.hybrid_alpha)
    } else {
        vector
            .into_iter()
            .map(|c| {
                let score = c.vector_score.unwrap_or(0.0).clamp(0.0, 1.0);
                RetrievalResult::new(c.chunk_id, score, c.payload)
            })
            .collect()
    }
}

/// Confidence gate: empty candidates and below-threshold top scores are
/// both successful low-confidence outcomes, never errors.
fn gate(results: Vec<RetrievalResult>, min_score: f32) -> AnswerEnvelope {
    if results.is_empty() {
        return AnswerEnvelope::empty();
    }

    let top = results[0].score;
    if top < min_score {
        return AnswerEnvelope {
            retrieved_count: results.len(),
            low_confidence: true,
            top_score: Some(top),
            sources: results,
        };
    }

    AnswerEnvelope {
        retrieved_count: results.len(),
        low_confidence: false,
        top_score: None,
        sources: results,
    }
}

/// Build the answer-synthesis prompt: numbered context passages under
/// strict use-only-the-context instructions.
fn grounding_prompt(question: &str, sources: &[RetrievalResult]) -> String {
    let context = sources
        .iter()
        .map(|result| {
            format!(
                "[Document: \"{}\", Chunk {}]: {}",
                result.payload.doc_title,
                result.payload.chunk_index + 1,
                result.payload.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a precise document assistant. Answer the question using ONLY \
         information explicitly stated in the context below.\n\n\
         RULES:\n\
         1. Answer only from the context; never from general knowledge\n\
         2. Quote the specific passages that support the answer\n\
         3. Cite which document(s) you used\n\
         4. If the context does not contain the answer, say \"I cannot find \
         information about this in the available documents\" and suggest \
         rephrasing\n\n\
         Context from documents:\n{context}\n\n\
         User Question: {question}\n\nAnswer:"
    )
}
