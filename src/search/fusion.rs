use crate::payload::{ChunkPayload, RetrievalResult};
use crate::search::normalize::min_max;
use std::collections::HashMap;
use uuid::Uuid;

/// Reciprocal Rank Fusion constant (Cormack et al. 2009; the common
/// default across OpenSearch, LanceDB, and friends)
pub const RRF_K: f32 = 60.0;

/// One fusion input candidate. Either score may be absent: a candidate
/// found only by BM25 carries no vector similarity and vice versa.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: Uuid,
    pub payload: ChunkPayload,
    /// Raw cosine similarity, when the candidate came from vector search
    pub vector_score: Option<f32>,
    /// Raw BM25 score, when the candidate came from keyword search
    pub bm25_score: Option<f32>,
}

impl Candidate {
    pub fn from_vector(chunk_id: Uuid, score: f32, payload: ChunkPayload) -> Self {
        Self {
            chunk_id,
            payload,
            vector_score: Some(score),
            bm25_score: None,
        }
    }

    pub fn from_bm25(chunk_id: Uuid, score: f32, payload: ChunkPayload) -> Self {
        Self {
            chunk_id,
            payload,
            vector_score: None,
            bm25_score: Some(score),
        }
    }
}

/// One ranked input list with its fusion weight (query-expansion
/// variants upweight the original question's lists).
#[derive(Debug, Clone)]
pub struct RankedList {
    pub weight: f32,
    pub candidates: Vec<Candidate>,
}

impl RankedList {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            weight: 1.0,
            candidates,
        }
    }

    pub fn weighted(weight: f32, candidates: Vec<Candidate>) -> Self {
        Self { weight, candidates }
    }
}

/// Top-of-list bonus: the head of each input list gets a nudge beyond
/// its reciprocal-rank mass.
fn rank_bonus(rank: usize) -> f32 {
    match rank {
        1 => 0.05,
        2 | 3 => 0.02,
        _ => 0.0,
    }
}

struct Accumulated {
    score: f32,
    best_vector_score: Option<f32>,
    payload: ChunkPayload,
}

/// Fuse any number of ranked lists with Reciprocal Rank Fusion.
///
/// For each list and each 1-based rank `r`, the candidate at `r` gains
/// `weight * (1/(RRF_K + r) + bonus(r))`. Matching across lists is by
/// `chunk_id`; a candidate appearing in a single list is first-class.
/// The fused list is min-max normalized so downstream thresholds are
/// comparable, and ordered descending with ties broken by higher raw
/// vector similarity, then ascending `chunk_id`.
pub fn rrf_fuse(lists: Vec<RankedList>) -> Vec<RetrievalResult> {
    let mut fused: HashMap<Uuid, Accumulated> = HashMap::new();

    for list in lists {
        for (idx, candidate) in list.candidates.into_iter().enumerate() {
            let rank = idx + 1;
            let mass = list.weight * (1.0 / (RRF_K + rank as f32) + rank_bonus(rank));

            match fused.entry(candidate.chunk_id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let acc = entry.get_mut();
                    acc.score += mass;
                    acc.best_vector_score =
                        max_opt(acc.best_vector_score, candidate.vector_score);
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(Accumulated {
                        score: mass,
                        best_vector_score: candidate.vector_score,
                        payload: candidate.payload,
                    });
                }
            }
        }
    }

    finish(fused)
}

/// Legacy weighted-linear fusion: each list is normalized to [0, 1] on
/// its own, then combined as `alpha * vector + (1 - alpha) * bm25`,
/// joined by `chunk_id`. BM25-only results are preserved rather than
/// dropped. The combined list is min-max normalized like the RRF path.
pub fn weighted_linear_fuse(
    vector: Vec<Candidate>,
    bm25: Vec<Candidate>,
    alpha: f32,
) -> Vec<RetrievalResult> {
    let vector_norms = min_max(
        &vector
            .iter()
            .map(|c| c.vector_score.unwrap_or(0.0))
            .collect::<Vec<_>>(),
    );
    let bm25_norms = min_max(
        &bm25
            .iter()
            .map(|c| c.bm25_score.unwrap_or(0.0))
            .collect::<Vec<_>>(),
    );

    let mut fused: HashMap<Uuid, Accumulated> = HashMap::new();

    for (candidate, norm) in vector.into_iter().zip(vector_norms) {
        fused.insert(
            candidate.chunk_id,
            Accumulated {
                score: alpha * norm,
                best_vector_score: candidate.vector_score,
                payload: candidate.payload,
            },
        );
    }

    for (candidate, norm) in bm25.into_iter().zip(bm25_norms) {
        match fused.entry(candidate.chunk_id) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().score += (1.0 - alpha) * norm;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Accumulated {
                    score: (1.0 - alpha) * norm,
                    best_vector_score: None,
                    payload: candidate.payload,
                });
            }
        }
    }

    finish(fused)
}

fn max_opt(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

/// Sort, tie-break, and normalize the accumulated candidates.
fn finish(fused: HashMap<Uuid, Accumulated>) -> Vec<RetrievalResult> {
    let mut entries: Vec<(Uuid, Accumulated)> = fused.into_iter().collect();
    entries.sort_by(|(id_a, a), (id_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let va = a.best_vector_score.unwrap_or(f32::NEG_INFINITY);
                let vb = b.best_vector_score.unwrap_or(f32::NEG_INFINITY);
                vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| id_a.cmp(id_b))
    });

    let normalized = min_max(&entries.iter().map(|(_, a)| a.score).collect::<Vec<_>>());

    entries
        .into_iter()
        .zip(normalized)
        .map(|((chunk_id, acc), score)| RetrievalResult::new(chunk_id, score, acc.payload))
        .collect()
}
