pub mod cross_encoder;
pub mod embedder;
pub mod llm;

use crate::error::Result;
use async_trait::async_trait;

pub use cross_encoder::HttpCrossEncoder;
pub use embedder::HttpEmbedder;
pub use llm::HttpLlm;

/// Bi-encoder producing one dense vector per text.
///
/// The engine treats this as a pure function; implementations may call
/// a remote endpoint or run locally, as long as the output dimension is
/// the configured constant for the corpus.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Output dimension `D`
    fn dimension(&self) -> usize;
}

/// Cross-encoder scoring (query, passage) pairs jointly. Output is not
/// bounded to any particular range.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score_many(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

/// Text-generation collaborator used for query expansion and answer
/// synthesis. May fail; expansion treats failure as non-fatal.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
