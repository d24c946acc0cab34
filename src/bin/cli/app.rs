use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use folio_lib::config::{Settings, StoreBackend};
use folio_lib::embeddings::OpenAiCompatibleEmbedder;
use folio_lib::loader::load_document;
use folio_lib::rag::Page;
use folio_lib::store::{PineconeStore, SqliteStore, VectorStore};

/// Shared application state for CLI commands
pub struct App {
    pub settings: Settings,
    pub embedder: OpenAiCompatibleEmbedder,
}

impl App {
    /// Load settings and apply command-line overrides.
    pub fn new(
        config_path: Option<&Path>,
        document: Option<PathBuf>,
        top_k: Option<usize>,
    ) -> Result<Self> {
        let mut settings = Settings::load(config_path).context("Failed to load settings")?;
        if let Some(document) = document {
            settings.document = Some(document);
        }
        if let Some(top_k) = top_k {
            settings.retrieval.top_k = top_k;
        }
        Self::from_settings(settings)
    }

    /// Validate settings and set up the embedding client. No store is opened
    /// and nothing is sent over the network.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let embedder = OpenAiCompatibleEmbedder::new(&settings.embedding)
            .context("Failed to set up the embedding client")?;

        Ok(Self { settings, embedder })
    }

    /// Open the configured vector store. A SQLite store creates its file.
    pub fn open_store(&self) -> Result<Box<dyn VectorStore>> {
        let store: Box<dyn VectorStore> = match self.settings.store.backend {
            StoreBackend::Sqlite => {
                let path = self.settings.store.sqlite_path()?;
                log::debug!("Opening SQLite store at {}", path.display());
                Box::new(
                    SqliteStore::open(path.clone())
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )
            }
            StoreBackend::Pinecone => Box::new(
                PineconeStore::new(&self.settings.store)
                    .context("Failed to set up the Pinecone client")?,
            ),
        };
        Ok(store)
    }

    /// Load the configured document as pages.
    pub fn load_pages(&self) -> Result<Vec<Page>> {
        let path = self.settings.document()?;
        load_document(path).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Where the index lives, for display.
    pub fn store_label(&self) -> String {
        match self.settings.store.backend {
            StoreBackend::Sqlite => match self.settings.store.sqlite_path() {
                Ok(path) => format!("sqlite ({})", path.display()),
                Err(_) => "sqlite".to_string(),
            },
            StoreBackend::Pinecone => format!(
                "pinecone ({}/{})",
                self.settings.store.cloud, self.settings.store.region
            ),
        }
    }
}
