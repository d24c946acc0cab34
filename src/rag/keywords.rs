//! Keyword extraction and the lexical acceptance gate.

use std::collections::HashSet;

use regex::Regex;

use crate::config::RetrievalConfig;

/// Tokens of this many characters or fewer are never keywords.
const MIN_KEYWORD_CHARS: usize = 3;

/// Turns a question into the keywords a chunk must contain to be accepted.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    word: Regex,
    stopwords: HashSet<String>,
}

impl KeywordExtractor {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            word: Regex::new(r"\w+").expect("static regex is valid"),
            stopwords: stopwords
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.all_stopwords())
    }

    /// Lowercased word tokens longer than two characters that are not
    /// stopwords, deduplicated in first-occurrence order.
    pub fn extract(&self, question: &str) -> Vec<String> {
        let lowered = question.to_lowercase();
        let mut seen = HashSet::new();

        self.word
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
            .filter(|token| !self.stopwords.contains(*token))
            .filter(|token| seen.insert(token.to_string()))
            .map(str::to_string)
            .collect()
    }
}

/// Whether `text` contains any keyword, ignoring case.
pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|kw| lowered.contains(kw.as_str()))
}
