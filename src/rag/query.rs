//! Question answering: vector search gated by keywords, with a linear
//! substring scan as the fallback.

use crate::config::{ChunkingConfig, EmptyKeywordPolicy, RetrievalConfig};
use crate::embeddings::Embedder;
use crate::store::{StoreError, StoreMatch, VectorStore};

use super::catalog::{metadata_page, metadata_text, parse_chunk_id, ChunkCatalog};
use super::chunker::chunk_pages;
use super::errors::{RagError, Result};
use super::keywords::{contains_any, KeywordExtractor};
use super::models::{MatchSource, Page, PresentedResult, QueryOutcome};

const ELLIPSIS: char = '…';

/// Answers questions against one index.
///
/// The chunk catalog is loaded on first need and kept for the lifetime of
/// the engine.
pub struct QueryEngine<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    index_name: String,
    retrieval: RetrievalConfig,
    keywords: KeywordExtractor,
    document: Option<(Vec<Page>, ChunkingConfig)>,
    catalog: Option<ChunkCatalog>,
}

impl<'a> QueryEngine<'a> {
    /// An engine that reads chunk text from the store's metadata.
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn VectorStore,
        index_name: impl Into<String>,
        retrieval: RetrievalConfig,
    ) -> Self {
        let keywords = KeywordExtractor::from_config(&retrieval);
        Self {
            embedder,
            store,
            index_name: index_name.into(),
            retrieval,
            keywords,
            document: None,
            catalog: None,
        }
    }

    /// Resolve chunk text by rechunking `pages` instead of reading metadata.
    ///
    /// `chunking` must be the configuration the index was built with; the
    /// rebuilt chunk count is checked against the index before use.
    pub fn with_document(mut self, pages: Vec<Page>, chunking: ChunkingConfig) -> Self {
        self.document = Some((pages, chunking));
        self.catalog = None;
        self
    }

    pub fn keywords(&self, question: &str) -> Vec<String> {
        self.keywords.extract(question)
    }

    pub fn answer(&mut self, question: &str) -> Result<QueryOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(QueryOutcome::EmptyQuestion);
        }

        let keywords = self.keywords.extract(question);
        log::debug!("Keywords for {:?}: {:?}", question, keywords);

        if keywords.is_empty() {
            match self.retrieval.empty_keywords {
                EmptyKeywordPolicy::Reject => return Ok(QueryOutcome::TooVague),
                EmptyKeywordPolicy::Fallback => return Ok(QueryOutcome::NoMatch { keywords }),
                EmptyKeywordPolicy::AcceptAll => {}
            }
        }

        let matches = self.search(question)?;
        log::debug!("Vector search returned {} matches", matches.len());

        let mut results = Vec::new();
        for hit in &matches {
            let (chunk_id, text, page) = self.resolve(hit)?;
            if keywords.is_empty() || contains_any(&text, &keywords) {
                results.push(PresentedResult {
                    chunk_id,
                    score: hit.score,
                    page,
                    snippet: snippet(&text, self.retrieval.snippet_length),
                    source: MatchSource::VectorSearch,
                });
            } else {
                log::debug!("Chunk {} contains no keyword, rejected", chunk_id);
            }
        }

        if !results.is_empty() {
            return Ok(QueryOutcome::Answered {
                keywords,
                source: MatchSource::VectorSearch,
                results,
            });
        }

        if keywords.is_empty() {
            return Ok(QueryOutcome::NoMatch { keywords });
        }

        log::info!(
            "None of the top {} results mention {:?}, scanning all chunks",
            matches.len(),
            keywords
        );
        let snippet_length = self.retrieval.snippet_length;
        let found = self
            .catalog()?
            .first_containing(&keywords)
            .map(|entry| PresentedResult {
                chunk_id: entry.id,
                score: 0.0,
                page: entry.page,
                snippet: snippet(&entry.text, snippet_length),
                source: MatchSource::LexicalFallback,
            });

        Ok(match found {
            Some(result) => QueryOutcome::Answered {
                keywords,
                source: MatchSource::LexicalFallback,
                results: vec![result],
            },
            None => QueryOutcome::NoMatch { keywords },
        })
    }

    fn search(&self, question: &str) -> Result<Vec<StoreMatch>> {
        let vector = self.embedder.embed_one(question)?;
        self.store
            .query(&self.index_name, &vector, self.retrieval.top_k, true)
            .map_err(|err| store_error(&self.index_name, err))
    }

    /// Chunk id, text, and page for a vector match.
    fn resolve(&mut self, hit: &StoreMatch) -> Result<(usize, String, Option<usize>)> {
        let chunk_id = parse_chunk_id(&hit.id)?;
        if self.document.is_none() {
            if let Some(text) = metadata_text(&hit.metadata) {
                return Ok((chunk_id, text.to_string(), metadata_page(&hit.metadata)));
            }
        }

        let entry = self
            .catalog()?
            .get(chunk_id)
            .ok_or_else(|| RagError::InvalidChunkId(hit.id.clone()))?;
        Ok((chunk_id, entry.text.clone(), entry.page))
    }

    fn catalog(&mut self) -> Result<&ChunkCatalog> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => self.load_catalog()?,
        };
        Ok(self.catalog.insert(catalog))
    }

    fn load_catalog(&self) -> Result<ChunkCatalog> {
        let catalog = match &self.document {
            None => {
                let records = self
                    .store
                    .fetch_all(&self.index_name)
                    .map_err(|err| store_error(&self.index_name, err))?;
                ChunkCatalog::from_records(records)?
            }
            Some((pages, chunking)) => {
                let chunks = chunk_pages(pages, chunking);
                let indexed = self
                    .store
                    .describe_index(&self.index_name)?
                    .ok_or_else(|| RagError::IndexMissing(self.index_name.clone()))?
                    .vector_count;
                if indexed != chunks.len() {
                    return Err(RagError::CatalogMismatch {
                        indexed,
                        rebuilt: chunks.len(),
                    });
                }
                ChunkCatalog::from_chunks(chunks)
            }
        };
        log::debug!("Loaded chunk catalog with {} entries", catalog.len());
        Ok(catalog)
    }
}

fn store_error(index: &str, err: StoreError) -> RagError {
    match err {
        StoreError::IndexNotFound(name) => RagError::IndexMissing(name),
        StoreError::DimensionMismatch { expected, actual } => RagError::DimensionMismatch {
            index: index.to_string(),
            expected,
            actual,
        },
        other => RagError::Store(other),
    }
}

/// Flatten newlines and cut to `max_chars` characters, marking truncation.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(max_chars).collect();
    if flat.chars().count() > max_chars {
        out.push(ELLIPSIS);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogSource, DEFAULT_STOPWORDS};
    use crate::rag::indexer::{Indexer, IndexerOptions};
    use crate::rag::testing::{hit, record, LetterEmbedder, ScriptedStore};
    use crate::store::{IndexSpec, Metric, Placement, SqliteStore};

    fn retrieval() -> RetrievalConfig {
        RetrievalConfig {
            extra_stopwords: vec!["alexander".to_string()],
            ..Default::default()
        }
    }

    fn history_store() -> ScriptedStore {
        let mut store = ScriptedStore::with_matches(vec![
            hit("3", 0.91, "Alexander crossed the Hellespont in 334 BC.", 1),
            hit("7", 0.88, "Perdiccas succeeded as regent after the king's death.", 5),
            hit("1", 0.80, "Philip II of Macedon", 0),
        ]);
        store.records = vec![
            record("1", "Philip II of Macedon", 0),
            record("3", "Alexander crossed the Hellespont in 334 BC.", 1),
            record("7", "Perdiccas succeeded as regent after the king's death.", 5),
        ];
        store
    }

    #[test]
    fn test_scenario_answers_from_vector_search() {
        let embedder = LetterEmbedder::new();
        let store = history_store();
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        let outcome = engine.answer("Who succeeded Alexander after his death?").unwrap();

        match outcome {
            QueryOutcome::Answered { keywords, source, results } => {
                assert_eq!(keywords, vec!["succeeded", "after", "death"]);
                assert_eq!(source, MatchSource::VectorSearch);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].chunk_id, 7);
                assert_eq!(results[0].page, Some(5));
                assert!(results[0].snippet.chars().count() <= 201);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.query_calls.get(), 1);
        assert_eq!(store.last_top_k.get(), 3);
        assert_eq!(store.fetch_calls.get(), 0);
    }

    #[test]
    fn test_all_passing_matches_kept_in_score_order() {
        let embedder = LetterEmbedder::new();
        let store = ScriptedStore::with_matches(vec![
            hit("4", 0.9, "Battle of the Granicus", 2),
            hit("2", 0.7, "unrelated text", 1),
            hit("9", 0.6, "the battle at Issus", 6),
        ]);
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        let outcome = engine.answer("Which battle came first?").unwrap();
        let ids: Vec<usize> = outcome.results().iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![4, 9]);
        assert!(outcome.results()[0].score > outcome.results()[1].score);
    }

    #[test]
    fn test_fallback_returns_first_chunk_in_id_order() {
        let embedder = LetterEmbedder::new();
        let mut store = ScriptedStore::with_matches(vec![hit("1", 0.9, "Philip II of Macedon", 0)]);
        store.records = vec![
            record("12", "Gaugamela again", 4),
            record("0", "Introduction", 0),
            record("5", "The road to Gaugamela", 2),
        ];
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        let outcome = engine.answer("Tell me about Gaugamela").unwrap();
        match outcome {
            QueryOutcome::Answered { source, results, .. } => {
                assert_eq!(source, MatchSource::LexicalFallback);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].chunk_id, 5);
                assert_eq!(results[0].score, 0.0);
                assert_eq!(results[0].page, Some(2));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.fetch_calls.get(), 1);
    }

    #[test]
    fn test_catalog_loaded_once_per_engine() {
        let embedder = LetterEmbedder::new();
        let mut store = ScriptedStore::with_matches(vec![hit("1", 0.9, "Macedon", 0)]);
        store.records = vec![record("0", "Persepolis burned", 3)];
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        engine.answer("Persepolis").unwrap();
        engine.answer("What burned?").unwrap();
        assert_eq!(store.fetch_calls.get(), 1);
    }

    #[test]
    fn test_no_match_anywhere() {
        let embedder = LetterEmbedder::new();
        let store = history_store();
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        let outcome = engine.answer("photosynthesis").unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::NoMatch {
                keywords: vec!["photosynthesis".to_string()]
            }
        );
    }

    #[test]
    fn test_empty_question_makes_no_calls() {
        let embedder = LetterEmbedder::new();
        let store = history_store();
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        assert_eq!(engine.answer("").unwrap(), QueryOutcome::EmptyQuestion);
        assert_eq!(engine.answer("  \n ").unwrap(), QueryOutcome::EmptyQuestion);
        assert_eq!(embedder.calls(), 0);
        assert_eq!(store.query_calls.get(), 0);
    }

    #[test]
    fn test_empty_keyword_policies() {
        let embedder = LetterEmbedder::new();
        let store = history_store();

        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());
        assert_eq!(engine.answer("Who is Alexander?").unwrap(), QueryOutcome::TooVague);
        assert_eq!(embedder.calls(), 0);

        let mut config = retrieval();
        config.empty_keywords = EmptyKeywordPolicy::Fallback;
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", config);
        assert_eq!(
            engine.answer("Who is Alexander?").unwrap(),
            QueryOutcome::NoMatch { keywords: vec![] }
        );
        assert_eq!(embedder.calls(), 0);

        let mut config = retrieval();
        config.empty_keywords = EmptyKeywordPolicy::AcceptAll;
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", config);
        let outcome = engine.answer("Who is Alexander?").unwrap();
        assert_eq!(outcome.results().len(), 3);
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let embedder = LetterEmbedder::new();
        let store = SqliteStore::open_in_memory().unwrap();
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        assert!(matches!(
            engine.answer("Gaugamela"),
            Err(RagError::IndexMissing(name)) if name == "pdf-index"
        ));
    }

    #[test]
    fn test_match_without_metadata_uses_catalog() {
        let embedder = LetterEmbedder::new();
        let mut store = ScriptedStore::with_matches(vec![StoreMatch {
            id: "2".to_string(),
            score: 0.5,
            metadata: Default::default(),
        }]);
        store.records = vec![record("2", "Babylon was his capital", 7)];
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());

        let outcome = engine.answer("Babylon").unwrap();
        assert_eq!(outcome.results()[0].page, Some(7));
        assert_eq!(outcome.results()[0].source, MatchSource::VectorSearch);
    }

    #[test]
    fn test_document_catalog_aligns_with_index() {
        let embedder = LetterEmbedder::new();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let chunking = ChunkingConfig::new(40, 10).unwrap();
        let pages = vec![
            Page::new(0, "Philip of Macedon reformed the phalanx.", "history.pdf"),
            Page::new(1, "Ptolemy took Egypt after the death of the king in Babylon.", "history.pdf"),
        ];
        let options = IndexerOptions {
            index_name: "pdf-index".to_string(),
            chunking,
            placement: Placement {
                cloud: "aws".to_string(),
                region: "us-east-1".to_string(),
            },
            upsert_batch_size: 10,
            prune_stale: true,
        };
        Indexer::new(&embedder, &mut store, options).build(&pages).unwrap();

        let mut config = retrieval();
        config.catalog = CatalogSource::Document;
        config.top_k = 1;
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", config.clone())
            .with_document(pages.clone(), chunking);
        let outcome = engine.answer("Egypt").unwrap();
        let result = &outcome.results()[0];
        assert_eq!(result.page, Some(1));
        assert!(result.snippet.contains("Egypt"));

        // A different chunking yields a different count and must be refused
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", config)
            .with_document(pages, ChunkingConfig::new(20, 0).unwrap());
        assert!(matches!(
            engine.answer("Egypt"),
            Err(RagError::CatalogMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_chunk_id() {
        let embedder = LetterEmbedder::new();
        let store = ScriptedStore::with_matches(vec![hit("abc", 0.9, "Gaugamela", 0)]);
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());
        assert!(matches!(
            engine.answer("Gaugamela"),
            Err(RagError::InvalidChunkId(_))
        ));
    }

    #[test]
    fn test_store_dimension_mismatch() {
        let embedder = LetterEmbedder::new();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .create_index(&IndexSpec {
                name: "pdf-index".to_string(),
                dimension: 3,
                metric: Metric::Cosine,
                placement: Placement {
                    cloud: "aws".to_string(),
                    region: "us-east-1".to_string(),
                },
            })
            .unwrap();
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", retrieval());
        assert!(matches!(
            engine.answer("Gaugamela"),
            Err(RagError::DimensionMismatch { expected: 3, actual: 26, .. })
        ));
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("line one\nline two", 200), "line one line two");
        assert_eq!(snippet("abcdef", 3), "abc…");
        assert_eq!(snippet("abc", 3), "abc");
        assert_eq!(snippet("ééééé", 2), "éé…");
    }

    #[test]
    fn test_subject_term_is_only_a_configured_stopword() {
        let embedder = LetterEmbedder::new();
        let store = ScriptedStore::default();
        let config = RetrievalConfig {
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let engine = QueryEngine::new(&embedder, &store, "pdf-index", config);
        assert_eq!(
            engine.keywords("Who succeeded Alexander after his death?"),
            vec!["succeeded", "alexander", "after", "death"]
        );
    }

    fn index_into_sqlite(
        embedder: &LetterEmbedder,
        pages: &[Page],
        chunking: ChunkingConfig,
    ) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let options = IndexerOptions {
            index_name: "pdf-index".to_string(),
            chunking,
            placement: Placement {
                cloud: "aws".to_string(),
                region: "us-east-1".to_string(),
            },
            upsert_batch_size: 4,
            prune_stale: true,
        };
        Indexer::new(embedder, &mut store, options).build(pages).unwrap();
        store
    }

    #[test]
    fn test_stored_text_matches_chunk_sequence() {
        let embedder = LetterEmbedder::new();
        let chunking = ChunkingConfig::new(24, 6).unwrap();
        let pages = vec![
            Page::new(0, "Philip of Macedon reformed the phalanx and trained the cavalry.", "history.pdf"),
            Page::new(1, "", "history.pdf"),
            Page::new(2, "Ptolemy took Egypt after the death of the king in Babylon.", "history.pdf"),
            Page::new(3, "Seleucus held Babylon.", "history.pdf"),
        ];
        let store = index_into_sqlite(&embedder, &pages, chunking);

        let chunks = chunk_pages(&pages, &chunking);
        let records = store.fetch_all("pdf-index").unwrap();
        assert!(chunks.len() > pages.len());
        assert_eq!(records.len(), chunks.len());

        for record in &records {
            let id = parse_chunk_id(&record.id).unwrap();
            assert_eq!(metadata_text(&record.metadata), Some(chunks[id].text.as_str()));
            assert_eq!(metadata_page(&record.metadata), Some(chunks[id].source_page));
        }
    }

    #[test]
    fn test_rejected_top_k_falls_back_through_sqlite() {
        let embedder = LetterEmbedder::new();
        let chunking = ChunkingConfig::new(40, 10).unwrap();
        // Page 1 has the letters of "egypt" but not the word, so it is the nearest hit
        let pages = vec![
            Page::new(0, "Philip of Macedon reformed the phalanx.", "history.pdf"),
            Page::new(1, "tygep gypte pyget", "history.pdf"),
            Page::new(2, "Ptolemy held Egypt after Babylon.", "history.pdf"),
        ];
        let store = index_into_sqlite(&embedder, &pages, chunking);

        let mut config = retrieval();
        config.top_k = 1;
        let mut engine = QueryEngine::new(&embedder, &store, "pdf-index", config);
        match engine.answer("Egypt").unwrap() {
            QueryOutcome::Answered { source, results, .. } => {
                assert_eq!(source, MatchSource::LexicalFallback);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].chunk_id, 2);
                assert_eq!(results[0].page, Some(2));
                assert!(results[0].snippet.contains("Egypt"));
            }
            other => panic!("expected a fallback answer, got {:?}", other),
        }
    }
}
