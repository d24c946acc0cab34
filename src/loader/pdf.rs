use std::fs;
use std::path::Path;

use crate::rag::Page;

use super::{LoadError, Result};

/// Extract the text of every PDF page, in page order.
pub fn load_pdf(path: &Path) -> Result<Vec<Page>> {
    let bytes = fs::read(path)?;
    let texts = pdf_extract::extract_text_from_mem_by_pages(&bytes)
        .map_err(|e| LoadError::Pdf(format!("{}: {}", path.display(), e)))?;

    if texts.iter().all(|t| t.trim().is_empty()) {
        log::warn!(
            "{} contains no extractable text (image-based or encrypted?)",
            path.display()
        );
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page::new(index, text, path))
        .collect())
}
