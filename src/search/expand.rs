use crate::models::Llm;
use std::sync::Arc;

/// Weight given to the original question relative to its paraphrases.
const ORIGINAL_WEIGHT: f32 = 2.0;
const VARIANT_WEIGHT: f32 = 1.0;

/// Query variants with their fusion weights, parallel vectors.
/// The original question is always first.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub variants: Vec<String>,
    pub weights: Vec<f32>,
}

impl ExpandedQuery {
    /// The no-expansion (or failed-expansion) case.
    fn original_only(question: &str) -> Self {
        Self {
            variants: vec![question.to_string()],
            weights: vec![VARIANT_WEIGHT],
        }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// LLM-driven paraphrase generation for multi-query retrieval.
///
/// Expansion is best-effort: any failure (endpoint down, unparseable
/// output) falls back to the original question alone and is logged,
/// never surfaced as an error.
pub struct QueryExpander {
    llm: Arc<dyn Llm>,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    /// Generate up to `num_variants` paraphrases of `question`.
    ///
    /// Returns `[original, v1, …, vn]` with weights `[2.0, 1.0, …]`
    /// (the original is upweighted), or `[original]` with weight
    /// `[1.0]` when expansion yields nothing.
    pub async fn expand(&self, question: &str, num_variants: usize) -> ExpandedQuery {
        if num_variants == 0 || question.trim().is_empty() {
            return ExpandedQuery::original_only(question);
        }

        let prompt = expansion_prompt(question, num_variants);
        let raw = match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Query expansion failed, falling back to original: {}", e);
                return ExpandedQuery::original_only(question);
            }
        };

        let paraphrases = parse_variants(&raw, num_variants, question);
        if paraphrases.is_empty() {
            log::warn!("Query expansion produced no usable variants, falling back to original");
            return ExpandedQuery::original_only(question);
        }

        let mut variants = Vec::with_capacity(paraphrases.len() + 1);
        let mut weights = Vec::with_capacity(paraphrases.len() + 1);
        variants.push(question.to_string());
        weights.push(ORIGINAL_WEIGHT);
        for paraphrase in paraphrases {
            variants.push(paraphrase);
            weights.push(VARIANT_WEIGHT);
        }
        ExpandedQuery { variants, weights }
    }
}

fn expansion_prompt(question: &str, num_variants: usize) -> String {
    format!(
        "You rewrite search queries for a document retrieval system.\n\
         Generate {n} alternative phrasings of the question below. Keep the \
         meaning identical, vary the vocabulary and structure, and do not \
         answer the question.\n\n\
         Question: {q}\n\n\
         Return exactly {n} lines, one phrasing per line, numbered 1 to {n}.",
        n = num_variants,
        q = question
    )
}

/// Pull paraphrase lines out of the LLM response: strip list markers
/// and surrounding quotes, drop blanks and echoes of the original.
fn parse_variants(raw: &str, num_variants: usize, original: &str) -> Vec<String> {
    raw.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')', '-', '*'])
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .filter(|line| !line.eq_ignore_ascii_case(original.trim()))
        .take(num_variants)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DocragError, Result};
    use async_trait::async_trait;

    struct CannedLlm {
        response: String,
    }

    #[async_trait]
    impl Llm for CannedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    struct DownLlm;

    #[async_trait]
    impl Llm for DownLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(DocragError::Model("generation endpoint error 503".to_string()))
        }
    }

    fn expander(response: &str) -> QueryExpander {
        QueryExpander::new(Arc::new(CannedLlm {
            response: response.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_expand_original_first_and_upweighted() {
        let expanded = expander("1. What is Python used for?\n2. Python use cases")
            .expand("What is Python?", 2)
            .await;

        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded.variants[0], "What is Python?");
        assert_eq!(expanded.weights, vec![2.0, 1.0, 1.0]);
        assert_eq!(expanded.variants[1], "What is Python used for?");
    }

    #[tokio::test]
    async fn test_expand_strips_bullets_and_quotes() {
        let expanded = expander("- \"Python purpose\"\n* Python applications")
            .expand("What is Python?", 2)
            .await;

        assert_eq!(expanded.variants[1], "Python purpose");
        assert_eq!(expanded.variants[2], "Python applications");
    }

    #[tokio::test]
    async fn test_expand_drops_echo_of_original() {
        let expanded = expander("1. What is Python?\n2. Python overview")
            .expand("What is Python?", 2)
            .await;

        // The echoed original is filtered, leaving one real variant
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded.variants[1], "Python overview");
    }

    #[tokio::test]
    async fn test_expand_truncates_to_requested_count() {
        let expanded = expander("1. a\n2. b\n3. c\n4. d")
            .expand("question", 2)
            .await;
        assert_eq!(expanded.len(), 3);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_original() {
        let expander = QueryExpander::new(Arc::new(DownLlm));
        let expanded = expander.expand("What is Python?", 2).await;

        assert_eq!(expanded.variants, vec!["What is Python?".to_string()]);
        assert_eq!(expanded.weights, vec![1.0]);
    }

    #[tokio::test]
    async fn test_blank_output_falls_back_to_original() {
        let expanded = expander("\n\n   \n").expand("What is Python?", 2).await;
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded.weights, vec![1.0]);
    }

    #[tokio::test]
    async fn test_zero_variants_requested() {
        let expanded = expander("1. something").expand("q", 0).await;
        assert_eq!(expanded.variants, vec!["q".to_string()]);
    }
}
