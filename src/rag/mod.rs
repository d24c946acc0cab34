//! Retrieval pipeline: chunking, indexing, and keyword-gated question answering.

mod catalog;
mod chunker;
mod errors;
mod indexer;
mod keywords;
mod models;
mod query;
#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{CatalogEntry, ChunkCatalog};
pub use chunker::chunk_pages;
pub use errors::{RagError, Result};
pub use indexer::{Indexer, IndexerOptions, METADATA_PAGE, METADATA_SOURCE, METADATA_TEXT};
pub use keywords::{contains_any, KeywordExtractor};
pub use models::{Chunk, IndexReport, MatchSource, Page, PresentedResult, QueryOutcome};
pub use query::{snippet, QueryEngine};
