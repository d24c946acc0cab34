//! Vector stores: named indexes of (id, vector, metadata) entries with
//! nearest-neighbour search.

mod pinecone;
mod sqlite;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use pinecone::PineconeStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::DotProduct => "dotproduct",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(Metric::Cosine),
            "dotproduct" => Some(Metric::DotProduct),
            _ => None,
        }
    }
}

/// Where a serverless index lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub cloud: String,
    pub region: String,
}

/// Everything needed to create an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub placement: Placement,
}

/// Description of an existing index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub vector_count: usize,
}

/// An entry written to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// An entry read back without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub metadata: Map<String, Value>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMatch {
    pub id: String,
    pub score: f32,
    /// Empty unless metadata was requested
    pub metadata: Map<String, Value>,
}

/// A vector database holding named indexes.
pub trait VectorStore {
    /// Describe the named index, or `None` if it does not exist.
    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>>;

    /// Create an index. Creating an index that already exists is not an error
    /// and leaves it unchanged.
    fn create_index(&mut self, spec: &IndexSpec) -> Result<()>;

    /// Insert or overwrite entries by id.
    fn upsert(&mut self, index: &str, entries: &[IndexEntry]) -> Result<usize>;

    /// The `top_k` entries most similar to `vector`, best first.
    fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoreMatch>>;

    /// Every entry's id and metadata, in no particular order.
    fn fetch_all(&self, index: &str) -> Result<Vec<StoredRecord>>;

    /// Delete entries by id. Unknown ids are ignored.
    fn delete(&mut self, index: &str, ids: &[String]) -> Result<()>;

    /// Delete every entry, keeping the index itself.
    fn delete_all(&mut self, index: &str) -> Result<()>;
}

/// Calculate cosine similarity between two vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}

pub(crate) fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);

        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_metric_names() {
        for metric in [Metric::Cosine, Metric::DotProduct] {
            assert_eq!(Metric::parse(metric.as_str()), Some(metric));
            let json = serde_json::to_value(metric).unwrap();
            assert_eq!(json, serde_json::Value::String(metric.as_str().to_string()));
        }
        assert_eq!(Metric::parse("euclidean"), None);
    }
}
