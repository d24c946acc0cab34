use anyhow::{Context, Result};

use folio_lib::rag::{Indexer, IndexerOptions};

use crate::app::App;
use crate::render::terminal::render_report;
use crate::OutputFormat;

pub fn run(app: &App, reset: bool, format: &OutputFormat, use_color: bool) -> Result<()> {
    // A missing document must fail before the store is touched
    let pages = app.load_pages()?;
    let mut store = app.open_store()?;
    let options = IndexerOptions::from_settings(&app.settings);

    let mut indexer = Indexer::new(&app.embedder, &mut *store, options);
    let report = if reset {
        indexer.rebuild(&pages)
    } else {
        indexer.build(&pages)
    }
    .context("Indexing failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => println!("{}", render_report(&report, use_color)),
    }

    Ok(())
}
