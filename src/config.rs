//! Layered configuration: defaults, then a TOML file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up in the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "folio.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing setting: {0}")]
    Missing(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid chunking: {0}")]
    InvalidChunking(String),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Segment and overlap lengths, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub segment_length: usize,
    pub overlap_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            segment_length: 1000,
            overlap_length: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn new(segment_length: usize, overlap_length: usize) -> Result<Self, ConfigError> {
        let config = Self {
            segment_length,
            overlap_length,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_length == 0 {
            return Err(ConfigError::InvalidChunking(
                "segment_length must be greater than zero".to_string(),
            ));
        }
        if self.overlap_length >= self.segment_length {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap_length ({}) must be smaller than segment_length ({})",
                self.overlap_length, self.segment_length
            )));
        }
        Ok(())
    }

    /// Distance between the starts of two consecutive chunks of a page.
    pub fn step(&self) -> usize {
        self.segment_length - self.overlap_length
    }
}

/// What to do when a question has no keywords left after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyKeywordPolicy {
    /// Report the question as too vague without searching
    #[default]
    Reject,
    /// Present every top-K vector result unfiltered
    AcceptAll,
    /// Go straight to the substring scan, which cannot match without keywords
    Fallback,
}

/// Where the query engine gets the full chunk list from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    /// Read chunk text back from the vector store's metadata
    #[default]
    Store,
    /// Rechunk the source document with the current chunking settings
    Document,
}

/// Generic English stopwords. Domain terms belong in `extra_stopwords`.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "is", "of", "what", "when", "where", "which",
    "who", "whom", "why", "how", "his", "her", "its", "him", "she", "they", "their",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours requested from the store
    pub top_k: usize,
    /// Maximum snippet length in characters
    pub snippet_length: usize,
    /// Base stopword list
    pub stopwords: Vec<String>,
    /// Additional, usually domain-specific, stopwords
    pub extra_stopwords: Vec<String>,
    pub empty_keywords: EmptyKeywordPolicy,
    pub catalog: CatalogSource,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            snippet_length: 200,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            extra_stopwords: Vec::new(),
            empty_keywords: EmptyKeywordPolicy::default(),
            catalog: CatalogSource::default(),
        }
    }
}

impl RetrievalConfig {
    /// Base and extra stopwords, lowercased.
    pub fn all_stopwords(&self) -> impl Iterator<Item = String> + '_ {
        self.stopwords
            .iter()
            .chain(self.extra_stopwords.iter())
            .map(|s| s.trim().to_lowercase())
    }
}

/// Embedding provider speaking the OpenAI `/embeddings` protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAi,
    #[default]
    Ollama,
    LmStudio,
}

impl EmbeddingProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            EmbeddingProvider::OpenAi => "https://api.openai.com/v1",
            EmbeddingProvider::Ollama => "http://localhost:11434/v1",
            EmbeddingProvider::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, EmbeddingProvider::OpenAi)
    }

    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "ollama" => Ok(EmbeddingProvider::Ollama),
            "lmstudio" | "lm-studio" => Ok(EmbeddingProvider::LmStudio),
            other => Err(ConfigError::Invalid(format!(
                "unknown embedding provider '{}'",
                other
            ))),
        }
    }
}

/// Configuration for embedding generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Model identifier (e.g., "all-minilm", "text-embedding-3-small")
    pub model: String,
    /// Requested output dimensions, for models that support shortening
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the provider's default base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: "all-minilm".to_string(),
            dimensions: None,
            api_key: None,
            base_url: None,
            batch_size: 64,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Pinecone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database file; defaults to the local data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Pinecone control-plane URL
    pub controller_url: String,
    /// Serverless placement
    pub cloud: String,
    pub region: String,
    pub upsert_batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            api_key: None,
            controller_url: "https://api.pinecone.io".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl StoreConfig {
    /// Resolved SQLite database path.
    pub fn sqlite_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        dirs::data_local_dir()
            .map(|p| p.join("folio").join("vectors.db"))
            .ok_or_else(|| ConfigError::Missing("store.path (no local data directory)".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Delete entries left over from a previous, larger run
    pub prune_stale: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { prune_stale: true }
    }
}

/// Complete runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Document to index and query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<PathBuf>,
    pub index_name: String,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub indexing: IndexingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            document: None,
            index_name: "pdf-index".to_string(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the first default location that exists,
    /// then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) => {
                    log::debug!("Using config file {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(document) = get("FOLIO_DOCUMENT") {
            self.document = Some(PathBuf::from(document));
        }
        if let Some(index_name) = get("FOLIO_INDEX_NAME") {
            self.index_name = index_name;
        }
        if let Some(provider) = get("FOLIO_EMBEDDING_PROVIDER") {
            self.embedding.provider = EmbeddingProvider::parse(&provider)?;
        }
        if let Some(model) = get("FOLIO_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(key) = get("PINECONE_API_KEY") {
            self.store.api_key = Some(key);
        }
        if let Some(region) = get("PINECONE_ENV") {
            self.store.region = region;
        }
        Ok(())
    }

    /// Check everything that must hold before any external call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;

        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Missing("index_name".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be at least 1".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.store.upsert_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "store.upsert_batch_size must be at least 1".to_string(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Missing("embedding.model".to_string()));
        }
        if self.embedding.provider.requires_api_key() && !has_value(&self.embedding.api_key) {
            return Err(ConfigError::MissingCredentials(
                "OPENAI_API_KEY must be set in the environment or embedding.api_key".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Pinecone && !has_value(&self.store.api_key) {
            return Err(ConfigError::MissingCredentials(
                "PINECONE_API_KEY must be set in the environment or store.api_key".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured document, or an error naming the missing setting.
    pub fn document(&self) -> Result<&Path, ConfigError> {
        self.document
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("document (set --document or FOLIO_DOCUMENT)".to_string()))
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|p| p.join("folio").join("config.toml"))
        .filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.segment_length, 1000);
        assert_eq!(settings.chunking.overlap_length, 200);
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.retrieval.snippet_length, 200);
        assert_eq!(settings.index_name, "pdf-index");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_chunking_validation() {
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(100, 100).is_err());
        assert!(ChunkingConfig::new(100, 150).is_err());
        assert_eq!(ChunkingConfig::new(100, 0).unwrap().step(), 100);
        assert_eq!(ChunkingConfig::new(1000, 200).unwrap().step(), 800);
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            document = "Alexander_the_Great.pdf"
            index_name = "history"

            [chunking]
            segment_length = 500
            overlap_length = 50

            [retrieval]
            top_k = 5
            extra_stopwords = ["Alexander"]
            empty_keywords = "accept_all"

            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            api_key = "sk-test"

            [store]
            backend = "pinecone"
            api_key = "pc-test"
            region = "eu-west-1"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();

        assert_eq!(settings.index_name, "history");
        assert_eq!(settings.chunking, ChunkingConfig::new(500, 50).unwrap());
        assert_eq!(settings.retrieval.top_k, 5);
        assert_eq!(settings.retrieval.snippet_length, 200);
        assert_eq!(settings.retrieval.empty_keywords, EmptyKeywordPolicy::AcceptAll);
        assert!(settings.retrieval.all_stopwords().any(|s| s == "alexander"));
        assert_eq!(settings.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(settings.embedding.base_url(), "https://api.openai.com/v1");
        assert_eq!(settings.store.backend, StoreBackend::Pinecone);
        assert_eq!(settings.store.cloud, "aws");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let mut settings = Settings::default();
        settings.embedding.provider = EmbeddingProvider::OpenAi;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingCredentials(_))
        ));

        let mut settings = Settings::default();
        settings.store.backend = StoreBackend::Pinecone;
        settings.store.api_key = Some("   ".to_string());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FOLIO_DOCUMENT", "book.pdf"),
            ("FOLIO_EMBEDDING_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-env"),
            ("PINECONE_API_KEY", "pc-env"),
            ("PINECONE_ENV", "us-west-2"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.document().unwrap(), Path::new("book.pdf"));
        assert_eq!(settings.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(settings.embedding.api_key.as_deref(), Some("sk-env"));
        assert_eq!(settings.store.api_key.as_deref(), Some("pc-env"));
        assert_eq!(settings.store.region, "us-west-2");
    }

    #[test]
    fn test_env_keys_override_file() {
        let mut settings: Settings = toml::from_str(
            r#"
            [embedding]
            api_key = "sk-file"

            [store]
            api_key = "pc-file"
            "#,
        )
        .unwrap();
        settings
            .apply_env(|key| match key {
                "OPENAI_API_KEY" => Some("sk-env".to_string()),
                "PINECONE_API_KEY" => Some("pc-env".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(settings.embedding.api_key.as_deref(), Some("sk-env"));
        assert_eq!(settings.store.api_key.as_deref(), Some("pc-env"));

        // An unset or blank variable leaves the file value alone
        let mut settings: Settings = toml::from_str("[store]\napi_key = \"pc-file\"").unwrap();
        settings
            .apply_env(|key| (key == "PINECONE_API_KEY").then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(settings.store.api_key.as_deref(), Some("pc-file"));
    }

    #[test]
    fn test_unknown_provider() {
        let mut settings = Settings::default();
        let result = settings.apply_env(|key| {
            (key == "FOLIO_EMBEDDING_PROVIDER").then(|| "word2vec".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_document() {
        let settings = Settings::default();
        assert!(matches!(settings.document(), Err(ConfigError::Missing(_))));
    }
}
