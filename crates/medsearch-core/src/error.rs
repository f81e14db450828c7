use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index unavailable at {}: {reason}", path.display())]
    MissingIndex { path: PathBuf, reason: String },

    #[error("Embedding model unavailable: {0}")]
    MissingModel(String),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn missing_index(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MissingIndex { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
