use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub docrag: DocragConfig,
    pub vector_store: VectorStoreConfig,
    pub embeddings: EmbeddingsConfig,
    pub cross_encoder: CrossEncoderConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Engine-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DocragConfig {
    /// Directory holding the per-corpus BM25 snapshot file
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Vector database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreConfig {
    /// Base URL of the Qdrant instance, e.g. http://localhost:6333
    pub url: String,
    pub collection: String,
    /// Embedding dimension D; the collection is created with this size
    pub vector_size: usize,
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// OpenAI-compatible /v1/embeddings endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Cross-encoder endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrossEncoderConfig {
    /// TEI-style /rerank endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// LLM endpoint configuration (query expansion + answer synthesis)
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible /v1/chat/completions endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Default retrieval parameters; every field can be overridden per
/// request through `SearchOptions`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub use_hybrid: bool,
    #[serde(default = "default_alpha")]
    pub hybrid_alpha: f32,
    #[serde(default = "default_true")]
    pub use_rrf: bool,
    #[serde(default = "default_true")]
    pub use_reranker: bool,
    #[serde(default = "default_blending")]
    pub rerank_blending: String,
    #[serde(default)]
    pub use_query_expansion: bool,
    #[serde(default = "default_expansion_variants")]
    pub expansion_variants: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            use_hybrid: true,
            hybrid_alpha: default_alpha(),
            use_rrf: true,
            use_reranker: true,
            rerank_blending: default_blending(),
            use_query_expansion: false,
            expansion_variants: default_expansion_variants(),
            min_score: default_min_score(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> f32 {
    0.5
}

fn default_blending() -> String {
    "position_aware".to_string()
}

fn default_expansion_variants() -> usize {
    2
}

fn default_min_score() -> f32 {
    0.3
}

impl Config {
    /// Load configuration.
    ///
    /// Loads environment variables from .env (if present), then reads
    /// the config file named by DOCRAG_CONFIG, falling back to
    /// ./config.toml.
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DOCRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.vector_store.vector_size == 0 {
            anyhow::bail!("vector_store.vector_size must be greater than 0");
        }

        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            anyhow::bail!("retrieval.hybrid_alpha must be between 0.0 and 1.0");
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            anyhow::bail!("retrieval.min_score must be between 0.0 and 1.0");
        }

        crate::search::BlendStrategy::from_str(&self.retrieval.rerank_blending)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        if self.retrieval.use_query_expansion && self.retrieval.expansion_variants == 0 {
            anyhow::bail!("retrieval.expansion_variants must be greater than 0 when expansion is enabled");
        }

        Ok(())
    }

    /// Read the API key for a model endpoint, when one is configured.
    pub fn api_key(env_name: &Option<String>) -> Option<String> {
        env_name
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config_toml() -> &'static str {
        r#"
[docrag]
snapshot_dir = "data/bm25"
log_level = "debug"

[vector_store]
url = "http://localhost:6333"
collection = "documents"
vector_size = 384

[embeddings]
endpoint = "http://localhost:8080/v1/embeddings"
model = "bge-small-en-v1.5"
batch_size = 64

[cross_encoder]
endpoint = "http://localhost:8081/rerank"
model = "ms-marco-MiniLM-L-6-v2"

[llm]
endpoint = "http://localhost:8082/v1/chat/completions"
model = "qwen2.5-7b-instruct"

[retrieval]
top_k = 5
min_score = 0.4
"#
    }

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_success_with_defaults_filled() {
        let (_dir, path) = write_config(test_config_toml());
        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.docrag.log_level, "debug");
        assert_eq!(config.vector_store.vector_size, 384);
        assert_eq!(config.embeddings.batch_size, 64);
        // Explicit overrides
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.min_score - 0.4).abs() < 1e-6);
        // Defaults
        assert!(config.retrieval.use_hybrid);
        assert!(config.retrieval.use_rrf);
        assert!(!config.retrieval.use_query_expansion);
        assert_eq!(config.retrieval.rerank_blending, "position_aware");
        assert_eq!(config.retrieval.expansion_variants, 2);
        assert_eq!(config.embeddings.cache_capacity, 1000);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let content = test_config_toml().replace("min_score = 0.4", "hybrid_alpha = 1.5");
        let (_dir, path) = write_config(&content);
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("hybrid_alpha"));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let content = test_config_toml().replace("top_k = 5", "top_k = 0");
        let (_dir, path) = write_config(&content);
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_unknown_blend_strategy_rejected() {
        let content = test_config_toml().replace(
            "min_score = 0.4",
            "rerank_blending = \"alchemy\"",
        );
        let (_dir, path) = write_config(&content);
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("blend strategy"));
    }

    #[test]
    fn test_zero_vector_size_rejected() {
        let content = test_config_toml().replace("vector_size = 384", "vector_size = 0");
        let (_dir, path) = write_config(&content);
        assert!(Config::load_from(&path).is_err());
    }
}
