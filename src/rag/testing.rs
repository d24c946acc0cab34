//! Fakes for the embedding service and vector store.

use std::cell::Cell;

use serde_json::{json, Map, Value};

use crate::embeddings::{Embedder, EmbeddingError, Result as EmbeddingResult};
use crate::store::{
    IndexEntry, IndexInfo, IndexSpec, Result as StoreResult, StoreError, StoreMatch, StoredRecord,
    VectorStore,
};

/// Embeds text as its 26 ASCII letter counts.
pub struct LetterEmbedder {
    calls: Cell<usize>,
    fail: bool,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Cell::new(0),
            fail: true,
        }
    }

    /// Number of `embed` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Embedder for LetterEmbedder {
    fn embed(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(EmbeddingError::Server {
                status: 503,
                message: "model not loaded".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; 26];
                for c in text.chars().filter(char::is_ascii_alphabetic) {
                    vector[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn model(&self) -> &str {
        "letters"
    }
}

/// A store that returns canned matches and records, counting reads.
#[derive(Default)]
pub struct ScriptedStore {
    pub info: Option<IndexInfo>,
    pub matches: Vec<StoreMatch>,
    pub records: Vec<StoredRecord>,
    pub fail_writes: bool,
    pub query_calls: Cell<usize>,
    pub fetch_calls: Cell<usize>,
    pub last_top_k: Cell<usize>,
}

impl ScriptedStore {
    pub fn with_matches(matches: Vec<StoreMatch>) -> Self {
        Self {
            matches,
            ..Default::default()
        }
    }

    fn write(&self) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::Server {
                status: 500,
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }
}

impl VectorStore for ScriptedStore {
    fn describe_index(&self, _name: &str) -> StoreResult<Option<IndexInfo>> {
        Ok(self.info.clone())
    }

    fn create_index(&mut self, spec: &IndexSpec) -> StoreResult<()> {
        self.write()?;
        self.info = Some(IndexInfo {
            name: spec.name.clone(),
            dimension: spec.dimension,
            metric: spec.metric,
            vector_count: 0,
        });
        Ok(())
    }

    fn upsert(&mut self, _index: &str, entries: &[IndexEntry]) -> StoreResult<usize> {
        self.write()?;
        Ok(entries.len())
    }

    fn query(
        &self,
        _index: &str,
        _vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> StoreResult<Vec<StoreMatch>> {
        self.query_calls.set(self.query_calls.get() + 1);
        self.last_top_k.set(top_k);
        Ok(self
            .matches
            .iter()
            .take(top_k)
            .cloned()
            .map(|mut m| {
                if !include_metadata {
                    m.metadata = Map::new();
                }
                m
            })
            .collect())
    }

    fn fetch_all(&self, _index: &str) -> StoreResult<Vec<StoredRecord>> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        Ok(self.records.clone())
    }

    fn delete(&mut self, _index: &str, _ids: &[String]) -> StoreResult<()> {
        self.write()
    }

    fn delete_all(&mut self, _index: &str) -> StoreResult<()> {
        self.write()
    }
}

fn metadata(text: &str, page: usize) -> Map<String, Value> {
    match json!({"text": text, "page": page}) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn hit(id: &str, score: f32, text: &str, page: usize) -> StoreMatch {
    StoreMatch {
        id: id.to_string(),
        score,
        metadata: metadata(text, page),
    }
}

pub fn record(id: &str, text: &str, page: usize) -> StoredRecord {
    StoredRecord {
        id: id.to_string(),
        metadata: metadata(text, page),
    }
}
