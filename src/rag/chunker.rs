//! Content chunking for RAG indexing.
//!
//! Pages are split independently into fixed-size, overlapping character windows.
//! Chunk ids are assigned in one pass over the pages, so the same pages and the
//! same [`ChunkingConfig`] always produce the same sequence.

use crate::config::ChunkingConfig;

use super::models::{Chunk, Page};

/// Chunk every page in order, numbering chunks across the whole document.
pub fn chunk_pages(pages: &[Page], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for (text, start, end) in sliding_window(&page.text, config) {
            chunks.push(Chunk {
                id: chunks.len(),
                text,
                source_page: page.index,
                start,
                end,
            });
        }
    }

    chunks
}

/// Split text into overlapping windows measured in characters.
/// Returns tuples of (chunk_text, start_offset, end_offset).
fn sliding_window(text: &str, config: &ChunkingConfig) -> Vec<(String, usize, usize)> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every character boundary, including the end of the text,
    // so windows can be sliced without splitting a multi-byte character.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let step = config.step();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + config.segment_length).min(char_count);
        let content = &text[boundaries[start]..boundaries[end]];
        chunks.push((content.to_string(), start, end));

        if end == char_count {
            break;
        }
        start += step;
    }

    chunks
}
