use anyhow::{Context, Result};

use folio_lib::rag::chunk_pages;

use crate::app::App;
use crate::render::terminal::Color;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let settings = &app.settings;
    let info = app
        .open_store()?
        .describe_index(&settings.index_name)
        .context("Failed to describe index")?;

    // The document is optional here; stats still work without one
    let chunk_count = match settings.document.as_ref() {
        Some(_) => Some(chunk_pages(&app.load_pages()?, &settings.chunking).len()),
        None => None,
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "indexName": settings.index_name,
                "store": app.store_label(),
                "index": info,
                "document": settings.document,
                "documentChunks": chunk_count,
                "segmentLength": settings.chunking.segment_length,
                "overlapLength": settings.chunking.overlap_length,
                "embeddingModel": settings.embedding.model,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            let (bold, reset) = if use_color {
                (Color::BOLD, Color::RESET)
            } else {
                ("", "")
            };

            println!("{}Index:{}     {}", bold, reset, settings.index_name);
            println!("{}Store:{}     {}", bold, reset, app.store_label());
            match &info {
                Some(info) => {
                    println!("{}Metric:{}    {}", bold, reset, info.metric.as_str());
                    println!("{}Dimension:{} {}", bold, reset, info.dimension);
                    println!("{}Entries:{}   {}", bold, reset, info.vector_count);
                }
                None => println!("  (index does not exist yet; run `folio-cli index`)"),
            }
            println!(
                "{}Model:{}     {} ({})",
                bold,
                reset,
                settings.embedding.model,
                settings.embedding.base_url()
            );
            println!(
                "{}Chunking:{}  {} chars, {} overlap",
                bold, reset, settings.chunking.segment_length, settings.chunking.overlap_length
            );

            if let (Some(path), Some(count)) = (&settings.document, chunk_count) {
                println!("{}Document:{}  {} ({} chunks)", bold, reset, path.display(), count);
                if let Some(info) = &info {
                    if info.vector_count != count {
                        println!(
                            "  warning: index holds {} entries, document yields {} chunks",
                            info.vector_count, count
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
