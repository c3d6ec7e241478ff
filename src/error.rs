use thiserror::Error;

/// Main error type for docrag
#[derive(Error, Debug)]
pub enum DocragError {
    /// Retrieval called while a BM25 rebuild holds the exclusive lock
    /// and no deadline remains. Transient; callers may retry.
    #[error("Index not ready: {0}")]
    NotReady(String),

    /// Vector database unreachable or rejected the request
    #[error("Vector store error: {0}")]
    Upstream(String),

    /// Embedding, cross-encoder, or LLM failure
    #[error("Model error: {0}")]
    Model(String),

    /// BM25 snapshot failed to deserialize or is inconsistent with the
    /// vector store; a rebuild is required
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Invalid request parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient Result type using DocragError
pub type Result<T> = std::result::Result<T, DocragError>;
