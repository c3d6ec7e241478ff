use crate::error::{DocragError, Result};
use crate::models::CrossEncoder;
use crate::payload::{BlendWeights, RetrievalResult};
use std::str::FromStr;
use std::sync::Arc;

/// How cross-encoder scores combine with first-stage retrieval scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendStrategy {
    /// The cross-encoder score becomes the result score outright
    Replace,
    /// Blend weights depend on the candidate's first-stage rank: the
    /// retriever is trusted at the head of the list, the cross-encoder
    /// further down
    #[default]
    PositionAware,
}

impl FromStr for BlendStrategy {
    type Err = DocragError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace" => Ok(Self::Replace),
            "position_aware" => Ok(Self::PositionAware),
            other => Err(DocragError::InvalidArgument(format!(
                "unknown blend strategy: {:?} (expected \"replace\" or \"position_aware\")",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BlendStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::PositionAware => write!(f, "position_aware"),
        }
    }
}

/// Weight schedule for position-aware blending. The first-stage
/// retriever is typically right at the very top but noisier further
/// down, while the cross-encoder is uniformly accurate but globally
/// miscalibrated; the blend keeps the strong head and lets the
/// reranker rescue the tail.
fn position_weights(rank: usize) -> BlendWeights {
    if rank <= 3 {
        BlendWeights {
            retrieval: 0.75,
            rerank: 0.25,
        }
    } else if rank <= 10 {
        BlendWeights {
            retrieval: 0.5,
            rerank: 0.5,
        }
    } else {
        BlendWeights {
            retrieval: 0.25,
            rerank: 0.75,
        }
    }
}

/// Second-stage reranker over an injected cross-encoder.
pub struct Reranker {
    cross_encoder: Arc<dyn CrossEncoder>,
}

impl Reranker {
    pub fn new(cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { cross_encoder }
    }

    /// Score every candidate against the query and re-rank.
    ///
    /// Both strategies preserve `retrieval_score` and `rerank_score` on
    /// the output records; `PositionAware` additionally records the
    /// blend weights it applied. Cross-encoder failure propagates as
    /// `Model` — the orchestrator does not degrade silently here.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
        top_k: usize,
        strategy: BlendStrategy,
    ) -> Result<Vec<RetrievalResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (query.to_string(), c.payload.text.clone()))
            .collect();
        let scores = self.cross_encoder.score_many(&pairs).await?;

        if scores.len() != candidates.len() {
            return Err(DocragError::Model(format!(
                "cross-encoder returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let mut reranked: Vec<RetrievalResult> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(idx, (mut candidate, rerank_score))| {
                let rank = idx + 1;
                let retrieval_score = candidate.score;
                candidate.retrieval_score = Some(retrieval_score);
                candidate.rerank_score = Some(rerank_score);
                match strategy {
                    BlendStrategy::Replace => {
                        candidate.score = rerank_score;
                    }
                    BlendStrategy::PositionAware => {
                        let weights = position_weights(rank);
                        candidate.blend_weights = Some(weights);
                        candidate.score = weights.retrieval * retrieval_score
                            + weights.rerank * rerank_score;
                    }
                }
                candidate
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(top_k);
        Ok(reranked)
    }
}
