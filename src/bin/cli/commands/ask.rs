use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use folio_lib::config::CatalogSource;
use folio_lib::rag::QueryEngine;

use crate::app::App;
use crate::render::terminal::render_outcome;
use crate::OutputFormat;

/// Read one question from stdin.
pub fn prompt_question() -> Result<String> {
    print!("Enter a question: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read question")?;
    Ok(line)
}

pub fn run(app: &App, question: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let retrieval = app.settings.retrieval.clone();
    let top_k = retrieval.top_k;

    let store = app.open_store()?;
    let mut engine = QueryEngine::new(
        &app.embedder,
        &*store,
        app.settings.index_name.clone(),
        retrieval,
    );
    // Rechunking needs the document, but only for a real question
    if app.settings.retrieval.catalog == CatalogSource::Document && !question.trim().is_empty() {
        engine = engine.with_document(app.load_pages()?, app.settings.chunking);
    }

    let outcome = engine.answer(question).context("Query failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Plain => println!("{}", render_outcome(question, top_k, &outcome, use_color)),
    }

    Ok(())
}
