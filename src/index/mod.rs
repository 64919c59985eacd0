//! Inverted-index search layer on top of the LSM store.
//!
//! The store is used as an opaque map: each stemmed term keys the portable
//! serialization of a Roaring bitmap holding the ids of every document that
//! contains the term. Documents pass through a fixed analysis chain before
//! indexing, and query terms pass through the same chain before lookup:
//! lowercased alphanumeric tokens, English stopwords dropped, Snowball
//! stemming applied.

pub mod query;

use roaring::RoaringBitmap;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

use crate::config::LsmConfig;
use crate::error::Result;
use crate::lsm::LsmTree;

/// Boolean-search index over text documents, persisted through the store.
pub struct InvertedIndex {
    store: LsmTree,
    stemmer: Stemmer,
    stopwords: HashSet<String>,
}

impl InvertedIndex {
    /// Creates an index backed by a store in the default directory.
    pub fn new() -> Self {
        Self::with_config(LsmConfig::new("searchindex"))
    }

    /// Creates an index backed by a store with the given configuration.
    pub fn with_config(config: LsmConfig) -> Self {
        Self {
            store: LsmTree::new(config),
            stemmer: Stemmer::create(Algorithm::English),
            stopwords: stop_words::get(stop_words::LANGUAGE::English)
                .into_iter()
                .collect(),
        }
    }

    /// Indexes a document: every analyzed term's posting bitmap gains
    /// `doc_id`. Re-adding a document id is idempotent per term.
    pub fn add_document(&self, doc_id: u32, text: &str) {
        for term in self.analyze(text) {
            let mut posting = self.load_posting(&term);
            posting.insert(doc_id);
            self.store_posting(&term, &posting);
        }
    }

    /// Forces a flush plus cascade in the underlying store.
    pub async fn compact(&self) -> Result<()> {
        self.store.compact().await
    }

    /// Runs the analysis chain: alphanumeric tokens, lowercased, stopwords
    /// removed, stemmed.
    pub(crate) fn analyze(&self, text: &str) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter(|token| !self.stopwords.contains(token))
            .map(|token| self.stemmer.stem(&token).to_string())
            .collect()
    }

    /// Analyzes a single query word down to its term, if anything survives
    /// the chain.
    pub(crate) fn normalize_word(&self, word: &str) -> Option<String> {
        self.analyze(word).into_iter().next()
    }

    /// Loads a term's posting bitmap. Absent or undecodable postings read as
    /// empty.
    pub(crate) fn load_posting(&self, term: &str) -> RoaringBitmap {
        let Some(raw) = self.store.get(term.as_bytes()) else {
            return RoaringBitmap::new();
        };
        RoaringBitmap::deserialize_from(raw.as_slice()).unwrap_or_else(|_| RoaringBitmap::new())
    }

    fn store_posting(&self, term: &str, posting: &RoaringBitmap) {
        let mut buf = Vec::with_capacity(posting.serialized_size());
        if let Err(err) = posting.serialize_into(&mut buf) {
            tracing::error!(term, error = %err, "failed to serialize posting bitmap");
            return;
        }
        self.store.put(term.as_bytes().to_vec(), Some(buf));
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits text into lowercased alphanumeric runs; everything else is a
/// separator.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_index(dir: &TempDir) -> InvertedIndex {
        InvertedIndex::with_config(LsmConfig::new(dir.path()).max_memtable_entries(2))
    }

    #[test]
    fn test_tokenize_splits_on_non_alphanumeric() {
        assert_eq!(
            tokenize("Hello, world! rock-and-roll"),
            vec!["hello", "world", "rock", "and", "roll"]
        );
        assert_eq!(tokenize(""), Vec::<String>::new());
        assert_eq!(tokenize("...---..."), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_analyze_stems_and_drops_stopwords() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        let terms = index.analyze("running fast with maps");
        assert!(terms.contains(&"run".to_string()));
        assert!(terms.contains(&"map".to_string()));
        assert!(
            !terms.iter().any(|term| term == "with"),
            "stopword must be dropped: {terms:?}"
        );
    }

    #[tokio::test]
    async fn test_postings_accumulate_document_ids() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index.add_document(1, "bloom filter");
        index.add_document(2, "bloom bitmap");
        index.add_document(2, "bloom bitmap");

        let term = index.normalize_word("bloom").unwrap();
        let posting = index.load_posting(&term);
        assert_eq!(posting.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_posting_reads_empty() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);
        assert!(index.load_posting("never").is_empty());
    }
}
