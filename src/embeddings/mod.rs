//! Embedding providers.

mod openai;

use thiserror::Error;

pub use openai::OpenAiCompatibleEmbedder;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Request failed ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Response(String),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Maps text to fixed-length vectors.
///
/// Implementations must be deterministic for a given model and return one
/// vector per input, in input order.
pub trait Embedder {
    /// Embed a batch of texts.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Response("no embedding returned".to_string()))
    }

    /// Model identity, for logs.
    fn model(&self) -> &str;
}
