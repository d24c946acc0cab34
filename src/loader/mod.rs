//! Document loading: turns a file into an ordered list of pages.

mod pdf;
mod text;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::rag::Page;

pub use pdf::load_pdf;
pub use text::{load_text, split_pages};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction error: {0}")]
    Pdf(String),

    #[error("Document is not valid UTF-8 text: {}", .0.display())]
    NotText(PathBuf),
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Load a document, choosing the reader by file extension.
///
/// `.pdf` files yield one page per PDF page; anything else is read as UTF-8
/// text split into pages on form feeds.
pub fn load_document(path: &Path) -> Result<Vec<Page>> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"));

    let pages = if is_pdf { load_pdf(path)? } else { load_text(path)? };
    log::info!("Loaded {} pages from {}", pages.len(), path.display());
    Ok(pages)
}
