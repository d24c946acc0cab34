use std::fs;
use std::path::Path;

use crate::rag::Page;

use super::{LoadError, Result};

/// Page separator used by plain-text exports of paginated documents.
const FORM_FEED: char = '\x0c';

pub fn load_text(path: &Path) -> Result<Vec<Page>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|_| LoadError::NotText(path.to_path_buf()))?;
    Ok(split_pages(&text, path))
}

/// Split text on form feeds. A trailing form feed does not start a new page.
pub fn split_pages(text: &str, source: &Path) -> Vec<Page> {
    let body = text.strip_suffix(FORM_FEED).unwrap_or(text);
    body.split(FORM_FEED)
        .enumerate()
        .map(|(index, page)| Page::new(index, page, source))
        .collect()
}
