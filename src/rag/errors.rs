//! Pipeline error taxonomy.

use thiserror::Error;

use crate::config::ConfigError;
use crate::embeddings::EmbeddingError;
use crate::loader::LoadError;
use crate::store::StoreError;

/// Fatal pipeline failures. Empty questions and unmatched questions are
/// reported through [`QueryOutcome`](super::QueryOutcome) instead.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Dimension mismatch: index '{index}' has {expected} dimensions, embedding model produces {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index '{0}' does not exist; build it first")]
    IndexMissing(String),

    #[error("Rebuilt {rebuilt} chunks but the index holds {indexed}; chunk ids would not line up")]
    CatalogMismatch { indexed: usize, rebuilt: usize },

    #[error("Store returned an id that is not a chunk position: {0}")]
    InvalidChunkId(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
