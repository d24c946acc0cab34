//! The full chunk list used by the fallback scan.

use serde_json::{Map, Value};

use crate::store::StoredRecord;

use super::errors::{RagError, Result};
use super::indexer::{METADATA_PAGE, METADATA_TEXT};
use super::keywords::contains_any;
use super::models::Chunk;

/// A chunk as known to the query side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: usize,
    pub text: String,
    pub page: Option<usize>,
}

/// Chunks ordered by id.
#[derive(Debug, Clone, Default)]
pub struct ChunkCatalog {
    entries: Vec<CatalogEntry>,
}

impl ChunkCatalog {
    /// Build from chunks produced by the chunker.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut entries: Vec<CatalogEntry> = chunks
            .into_iter()
            .map(|chunk| CatalogEntry {
                id: chunk.id,
                text: chunk.text,
                page: Some(chunk.source_page),
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        Self { entries }
    }

    /// Build from entries read back from a vector store.
    ///
    /// Records without text metadata are skipped. An id that is not a chunk
    /// position is an error.
    pub fn from_records(records: Vec<StoredRecord>) -> Result<Self> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let id = parse_chunk_id(&record.id)?;
            let Some(text) = metadata_text(&record.metadata) else {
                log::warn!("Entry {} has no text metadata, skipping", record.id);
                continue;
            };
            entries.push(CatalogEntry {
                id,
                text: text.to_string(),
                page: metadata_page(&record.metadata),
            });
        }
        entries.sort_by_key(|e| e.id);
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&CatalogEntry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// The lowest-id entry whose text contains any keyword.
    pub fn first_containing(&self, keywords: &[String]) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| contains_any(&e.text, keywords))
    }
}

pub(crate) fn parse_chunk_id(id: &str) -> Result<usize> {
    id.trim()
        .parse()
        .map_err(|_| RagError::InvalidChunkId(id.to_string()))
}

pub(crate) fn metadata_text(metadata: &Map<String, Value>) -> Option<&str> {
    metadata.get(METADATA_TEXT).and_then(Value::as_str)
}

/// Page numbers may come back as floats from stores that keep all numbers as doubles.
pub(crate) fn metadata_page(metadata: &Map<String, Value>) -> Option<usize> {
    let value = metadata.get(METADATA_PAGE)?;
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize))
}
