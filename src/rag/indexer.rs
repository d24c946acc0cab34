//! Batch indexing: chunk, embed, and upsert a document into a vector store.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::config::{ChunkingConfig, Settings};
use crate::embeddings::{Embedder, EmbeddingError};
use crate::store::{IndexEntry, IndexSpec, Metric, Placement, VectorStore};

use super::chunker::chunk_pages;
use super::errors::{RagError, Result};
use super::models::{Chunk, IndexReport, Page};

/// Metadata key holding the chunk text.
pub const METADATA_TEXT: &str = "text";
/// Metadata key holding the source page index.
pub const METADATA_PAGE: &str = "page";
/// Metadata key holding the document path.
pub const METADATA_SOURCE: &str = "source";

/// Text embedded once to learn the model's output dimension.
const DIMENSION_PROBE: &str = "dimension probe";

/// Indexing settings, usually taken from [`Settings`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub index_name: String,
    pub chunking: ChunkingConfig,
    pub placement: Placement,
    pub upsert_batch_size: usize,
    /// Delete ids left over from a previous run that produced more chunks
    pub prune_stale: bool,
}

impl IndexerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            index_name: settings.index_name.clone(),
            chunking: settings.chunking,
            placement: Placement {
                cloud: settings.store.cloud.clone(),
                region: settings.store.region.clone(),
            },
            upsert_batch_size: settings.store.upsert_batch_size.max(1),
            prune_stale: settings.indexing.prune_stale,
        }
    }
}

/// Writes a document's chunks into a vector store.
pub struct Indexer<'a> {
    embedder: &'a dyn Embedder,
    store: &'a mut dyn VectorStore,
    options: IndexerOptions,
}

impl<'a> Indexer<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a mut dyn VectorStore,
        options: IndexerOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    /// Index `pages`, overwriting entries with the same ids.
    pub fn build(&mut self, pages: &[Page]) -> Result<IndexReport> {
        self.run(pages, false)
    }

    /// Delete every entry of the index, then index `pages`.
    pub fn rebuild(&mut self, pages: &[Page]) -> Result<IndexReport> {
        self.run(pages, true)
    }

    fn run(&mut self, pages: &[Page], reset: bool) -> Result<IndexReport> {
        self.options.chunking.validate()?;
        let index_name = self.options.index_name.clone();

        let dimension = self.probe_dimension()?;
        let (created, previous_count) = self.ensure_index(&index_name, dimension)?;

        if reset && previous_count > 0 {
            log::info!("Clearing {} entries from '{}'", previous_count, index_name);
            self.store.delete_all(&index_name)?;
        }

        let chunks = chunk_pages(pages, &self.options.chunking);
        log::info!("Split {} pages into {} chunks", pages.len(), chunks.len());

        let vectors = self.embed_chunks(&chunks, dimension, &index_name)?;
        let entries = build_entries(pages, &chunks, vectors);

        let mut upserted = 0;
        for batch in entries.chunks(self.options.upsert_batch_size) {
            upserted += self.store.upsert(&index_name, batch)?;
            log::debug!("Upserted {}/{} entries", upserted, entries.len());
        }
        log::info!("Upserted {} entries into '{}'", entries.len(), index_name);

        let pruned = if !reset && self.options.prune_stale && previous_count > chunks.len() {
            let stale: Vec<String> = (chunks.len()..previous_count).map(|id| id.to_string()).collect();
            self.store.delete(&index_name, &stale)?;
            log::info!("Pruned {} stale entries from '{}'", stale.len(), index_name);
            stale.len()
        } else {
            0
        };

        Ok(IndexReport {
            index_name,
            dimension,
            page_count: pages.len(),
            chunk_count: chunks.len(),
            created,
            reset,
            pruned,
            finished_at: Utc::now(),
        })
    }

    fn probe_dimension(&self) -> Result<usize> {
        let dimension = self.embedder.embed_one(DIMENSION_PROBE)?.len();
        if dimension == 0 {
            return Err(EmbeddingError::Response(format!(
                "model '{}' returned an empty embedding",
                self.embedder.model()
            ))
            .into());
        }
        log::debug!("Model '{}' produces {} dimensions", self.embedder.model(), dimension);
        Ok(dimension)
    }

    /// Create the index if absent. Returns (created, entry count before this run).
    fn ensure_index(&mut self, index_name: &str, dimension: usize) -> Result<(bool, usize)> {
        match self.store.describe_index(index_name)? {
            Some(info) => {
                if info.dimension != dimension {
                    return Err(RagError::DimensionMismatch {
                        index: index_name.to_string(),
                        expected: info.dimension,
                        actual: dimension,
                    });
                }
                log::info!(
                    "Reusing index '{}' ({} dims, {} entries)",
                    index_name,
                    info.dimension,
                    info.vector_count
                );
                Ok((false, info.vector_count))
            }
            None => {
                self.store.create_index(&IndexSpec {
                    name: index_name.to_string(),
                    dimension,
                    metric: Metric::Cosine,
                    placement: self.options.placement.clone(),
                })?;
                log::info!("Created index '{}' ({} dims)", index_name, dimension);
                Ok((true, 0))
            }
        }
    }

    fn embed_chunks(
        &self,
        chunks: &[Chunk],
        dimension: usize,
        index_name: &str,
    ) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        log::info!(
            "Creating embeddings for {} chunks using '{}'",
            texts.len(),
            self.embedder.model()
        );
        let vectors = self.embedder.embed(&texts)?;

        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::Response(format!(
                "{} embeddings returned for {} chunks",
                vectors.len(),
                chunks.len()
            ))
            .into());
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                index: index_name.to_string(),
                expected: dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

/// Pair each chunk with its vector and page metadata, keyed by chunk position.
fn build_entries(pages: &[Page], chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Vec<IndexEntry> {
    let pages_by_index: HashMap<usize, &Page> = pages.iter().map(|p| (p.index, p)).collect();

    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            let mut metadata = Map::new();
            if let Some(page) = pages_by_index.get(&chunk.source_page) {
                metadata.insert(
                    METADATA_SOURCE.to_string(),
                    Value::String(page.source.to_string_lossy().into_owned()),
                );
            }
            metadata.insert(METADATA_PAGE.to_string(), json!(chunk.source_page));
            metadata.insert(METADATA_TEXT.to_string(), Value::String(chunk.text.clone()));

            IndexEntry {
                id: chunk.id.to_string(),
                vector,
                metadata,
            }
        })
        .collect()
}
