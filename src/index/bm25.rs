use crate::error::{DocragError, Result};
use crate::payload::ChunkPayload;
use crate::tokenizer::tokenize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

/// Okapi BM25 term-frequency saturation parameter
pub const BM25_K1: f32 = 1.5;
/// Okapi BM25 length-normalization parameter
pub const BM25_B: f32 = 0.75;

/// Sentinel assigned to chunks outside a requested doc-id set; search
/// only returns strictly positive scores, so these never surface.
const EXCLUDED_SCORE: f32 = -1.0;

/// One BM25 search hit.
///
/// Carries the full payload so fusion can build a first-class candidate
/// even when the chunk never appeared in the vector results.
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    /// Position of the chunk in the index's insertion order
    pub chunk_index: usize,
    pub score: f32,
    pub doc_id: String,
    pub payload: ChunkPayload,
}

/// Serialized snapshot state. The payload array is ordered; everything
/// else is parallel to it.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    chunk_ids: Vec<Uuid>,
    tokenized: Vec<Vec<String>>,
    doc_lengths: Vec<usize>,
    avg_doc_len: f32,
    doc_freqs: HashMap<String, usize>,
    payloads: Vec<ChunkPayload>,
}

/// In-memory Okapi BM25 index over chunk texts.
///
/// The index is a cache derived from the vector store: it is rebuilt
/// wholesale on every add or delete rather than patched incrementally.
/// Tokenization is shared with query time via [`tokenize`].
#[derive(Debug, Default)]
pub struct Bm25Index {
    chunk_ids: Vec<Uuid>,
    payloads: Vec<ChunkPayload>,
    tokenized: Vec<Vec<String>>,
    /// term -> per-chunk occurrence count, derived from `tokenized`
    term_freqs: Vec<HashMap<String, u32>>,
    doc_freqs: HashMap<String, usize>,
    doc_lengths: Vec<usize>,
    avg_doc_len: f32,
    /// When the restored snapshot was written; `None` for an index
    /// built in memory
    snapshot_saved_at: Option<DateTime<Utc>>,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire index state with one built from `chunks`.
    ///
    /// Empty input yields an empty index and a warning; it is not an
    /// error (an empty corpus is a legal state).
    pub fn build(&mut self, chunks: Vec<ChunkPayload>) {
        if chunks.is_empty() {
            log::warn!("Building BM25 index from zero chunks");
            *self = Self::default();
            return;
        }

        let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
        let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.chunk_id).collect();
        let doc_lengths: Vec<usize> = tokenized.iter().map(Vec::len).collect();
        let total: usize = doc_lengths.iter().sum();
        let avg_doc_len = total as f32 / chunks.len() as f32;

        let (term_freqs, doc_freqs) = Self::derive_stats(&tokenized);

        log::info!("Built BM25 index with {} chunks", chunks.len());

        *self = Self {
            chunk_ids,
            payloads: chunks,
            tokenized,
            term_freqs,
            doc_freqs,
            doc_lengths,
            avg_doc_len,
            snapshot_saved_at: None,
        };
    }

    fn derive_stats(
        tokenized: &[Vec<String>],
    ) -> (Vec<HashMap<String, u32>>, HashMap<String, usize>) {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let term_freqs: Vec<HashMap<String, u32>> = tokenized
            .iter()
            .map(|tokens| {
                let mut freqs: HashMap<String, u32> = HashMap::new();
                for token in tokens {
                    *freqs.entry(token.clone()).or_insert(0) += 1;
                }
                for term in freqs.keys() {
                    *doc_freqs.entry(term.clone()).or_insert(0) += 1;
                }
                freqs
            })
            .collect();
        (term_freqs, doc_freqs)
    }

    /// Inverse document frequency in the always-positive Lucene form,
    /// so a matching term can never subtract from a chunk's score.
    fn idf(&self, term: &str) -> f32 {
        let n = self.payloads.len() as f32;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score the query against every indexed chunk and return the top_k
    /// hits with strictly positive scores.
    ///
    /// When `doc_ids` is supplied, chunks outside the set are forced to
    /// a sentinel score and thereby excluded. Ordering is strictly
    /// descending by score; ties break by ascending `chunk_index`.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        doc_ids: Option<&HashSet<String>>,
    ) -> Vec<Bm25Hit> {
        if self.payloads.is_empty() {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.payloads.len())
            .map(|idx| {
                if let Some(allowed) = doc_ids {
                    if !allowed.contains(&self.payloads[idx].doc_id) {
                        return (idx, EXCLUDED_SCORE);
                    }
                }
                (idx, self.score_chunk(idx, &query_terms))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .take(top_k)
            .map(|(idx, score)| Bm25Hit {
                chunk_index: idx,
                score,
                doc_id: self.payloads[idx].doc_id.clone(),
                payload: self.payloads[idx].clone(),
            })
            .collect()
    }

    fn score_chunk(&self, idx: usize, query_terms: &[String]) -> f32 {
        let freqs = &self.term_freqs[idx];
        let len_norm = 1.0 - BM25_B + BM25_B * self.doc_lengths[idx] as f32 / self.avg_doc_len;

        query_terms
            .iter()
            .map(|term| {
                let tf = freqs.get(term).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                self.idf(term) * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm)
            })
            .sum()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Chunk-id set, for consistency checks against the vector store.
    pub fn chunk_id_set(&self) -> HashSet<Uuid> {
        self.chunk_ids.iter().copied().collect()
    }

    /// When the snapshot this index was restored from was written.
    /// `None` for an index built in memory. Useful for judging how
    /// stale an on-disk snapshot is before trusting it.
    pub fn snapshot_saved_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot_saved_at
    }

    /// Payload for a given insertion-order index.
    pub fn payload(&self, chunk_index: usize) -> Option<&ChunkPayload> {
        self.payloads.get(chunk_index)
    }

    /// Serialize the entire state to one binary blob.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            chunk_ids: self.chunk_ids.clone(),
            tokenized: self.tokenized.clone(),
            doc_lengths: self.doc_lengths.clone(),
            avg_doc_len: self.avg_doc_len,
            doc_freqs: self.doc_freqs.clone(),
            payloads: self.payloads.clone(),
        };
        bincode::serialize(&snapshot)
            .map_err(|e| DocragError::IndexCorrupt(format!("snapshot encode failed: {}", e)))
    }

    /// Restore an index from a snapshot blob. Atomic: either the whole
    /// state is replaced or the error is returned and nothing changes.
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(bytes)
            .map_err(|e| DocragError::IndexCorrupt(format!("snapshot decode failed: {}", e)))?;

        let n = snapshot.payloads.len();
        if snapshot.chunk_ids.len() != n
            || snapshot.tokenized.len() != n
            || snapshot.doc_lengths.len() != n
        {
            return Err(DocragError::IndexCorrupt(format!(
                "snapshot arrays disagree on length ({} payloads, {} ids, {} token lists, {} lengths)",
                n,
                snapshot.chunk_ids.len(),
                snapshot.tokenized.len(),
                snapshot.doc_lengths.len()
            )));
        }

        let (term_freqs, doc_freqs) = Self::derive_stats(&snapshot.tokenized);
        if doc_freqs != snapshot.doc_freqs {
            return Err(DocragError::IndexCorrupt(
                "snapshot document frequencies do not match its token lists".to_string(),
            ));
        }

        Ok(Self {
            chunk_ids: snapshot.chunk_ids,
            payloads: snapshot.payloads,
            tokenized: snapshot.tokenized,
            term_freqs,
            doc_freqs,
            doc_lengths: snapshot.doc_lengths,
            avg_doc_len: snapshot.avg_doc_len,
            snapshot_saved_at: Some(snapshot.saved_at),
        })
    }

    /// Write the snapshot blob to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.snapshot()?)?;
        log::debug!("Saved BM25 snapshot to {}", path.display());
        Ok(())
    }

    /// Load an index from a snapshot file. Corruption is reported as
    /// `IndexCorrupt`; the caller decides whether to rebuild.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::restore(&bytes)
    }
}
