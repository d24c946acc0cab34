//! Data models for RAG operations.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of source text, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Zero-based position of the page within the document
    pub index: usize,
    /// Raw page text as produced by the loader
    pub text: String,
    /// Document the page was loaded from
    pub source: PathBuf,
}

impl Page {
    pub fn new(index: usize, text: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            index,
            text: text.into(),
            source: source.into(),
        }
    }
}

/// A chunk of page text with its positional identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Rank of this chunk in the document's chunk sequence
    pub id: usize,
    /// The text content of the chunk
    pub text: String,
    /// Index of the page the chunk was cut from
    pub source_page: usize,
    /// Start position (in characters) within the page
    pub start: usize,
    /// End position (in characters, exclusive) within the page
    pub end: usize,
}

/// How a presented result was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchSource {
    /// Accepted from the top-K vector search results
    VectorSearch,
    /// Found by the linear substring scan
    LexicalFallback,
}

/// A single result shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedResult {
    pub chunk_id: usize,
    /// Similarity score; 0.0 for lexical fallback hits
    pub score: f32,
    /// Source page, when known
    pub page: Option<usize>,
    pub snippet: String,
    pub source: MatchSource,
}

/// Outcome of answering one question.
///
/// Empty input and "nothing matched" are outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum QueryOutcome {
    /// The question was blank; nothing was embedded or searched.
    EmptyQuestion,
    /// Every token was a stopword or too short.
    TooVague,
    /// At least one result passed the keyword gate or the fallback scan.
    Answered {
        keywords: Vec<String>,
        source: MatchSource,
        results: Vec<PresentedResult>,
    },
    /// Neither the vector results nor the fallback scan contained a keyword.
    NoMatch { keywords: Vec<String> },
}

impl QueryOutcome {
    /// Results to present, empty for every outcome but `Answered`.
    pub fn results(&self) -> &[PresentedResult] {
        match self {
            QueryOutcome::Answered { results, .. } => results,
            _ => &[],
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub index_name: String,
    pub dimension: usize,
    pub page_count: usize,
    pub chunk_count: usize,
    /// Whether this run created the index
    pub created: bool,
    /// Whether every entry was deleted before upserting
    pub reset: bool,
    /// Number of stale entries deleted after upserting
    pub pruned: usize,
    pub finished_at: DateTime<Utc>,
}
