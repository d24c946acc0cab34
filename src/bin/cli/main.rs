mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "folio-cli",
    about = "Index a document and ask questions about it",
    version
)]
struct Cli {
    /// Config file (default: ./folio.toml, then the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document to index or query (overrides the config file)
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed, and upsert the document into the index
    Index {
        /// Delete every entry of the index before upserting
        #[arg(long)]
        reset: bool,
    },

    /// Answer a question from the indexed document
    Ask {
        /// Question text (prompted for when omitted)
        question: Option<String>,
        /// Number of nearest chunks to check
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show the index and the active configuration
    Stats,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();

    match cli.command {
        Command::Index { reset } => {
            let app = app::App::new(cli.config.as_deref(), cli.document, None)?;
            commands::index::run(&app, reset, &cli.format, use_color)?;
        }
        Command::Ask { question, top_k } => {
            let app = app::App::new(cli.config.as_deref(), cli.document, top_k)?;
            let question = match question {
                Some(q) => q,
                None => commands::ask::prompt_question()?,
            };
            commands::ask::run(&app, &question, &cli.format, use_color)?;
        }
        Command::Stats => {
            let app = app::App::new(cli.config.as_deref(), cli.document, None)?;
            commands::stats::run(&app, &cli.format, use_color)?;
        }
    }

    Ok(())
}
