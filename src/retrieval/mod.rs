//! Retrieval
//!
//! Lexical ranking of corpus sections. The index is built once at startup and shared read-only;
//! `retrieve` is deterministic for a given question and corpus, with ties broken by the order in
//! which sections were indexed.

pub mod bm25;
pub mod corpus;

use crate::error::CopilotError;
use crate::state::{Intent, RetrievedChunk};
use bm25::Bm25Index;
use corpus::{chunk_document, load_documents, tokenize, Chunk};
use std::path::Path;
use tracing::{debug, info};

/// Query words that never discriminate between sections
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "i",
    "in", "is", "it", "of", "on", "or", "per", "the", "to", "was", "we", "were", "what", "which",
    "who", "with",
];

/// Aggregation vocabulary that points at the database, not at documents
const AGGREGATION_WORDS: &[&str] = &["how", "many", "much", "count", "number", "return", "total"];

/// Pre-built index over every corpus section
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    chunks: Vec<Chunk>,
    bm25: Bm25Index,
}

impl CorpusIndex {
    /// Build the index from `(file_name, content)` pairs, in the given order.
    pub fn from_documents<N, C>(documents: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let chunks: Vec<Chunk> = documents
            .into_iter()
            .flat_map(|(name, content)| chunk_document(name.as_ref(), content.as_ref()))
            .collect();
        let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();
        let bm25 = Bm25Index::new(&tokenized);
        Self { chunks, bm25 }
    }

    /// Index every markdown document in `docs_dir`.
    pub fn from_dir(docs_dir: &Path) -> Result<Self, CopilotError> {
        let documents = load_documents(docs_dir)?;
        let index = Self::from_documents(documents);
        info!(
            docs_dir = %docs_dir.display(),
            chunks = index.len(),
            "Corpus indexed"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Top `top_k` sections scoring strictly above `min_score`.
    pub fn search(&self, query: &[String], top_k: usize, min_score: f64) -> Vec<RetrievedChunk> {
        let scores = self.bm25.scores(query);
        let mut ranked: Vec<(usize, f64)> = scores.into_iter().enumerate().collect();
        // Stable sort keeps insertion order among equal scores
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranked
            .into_iter()
            .take(top_k)
            .filter(|(_, score)| *score > min_score)
            .map(|(idx, score)| RetrievedChunk {
                text: self.chunks[idx].text.clone(),
                source_id: self.chunks[idx].id.clone(),
                score,
            })
            .collect()
    }
}

/// Query terms for a question, filtered by intent.
pub fn query_terms(question: &str, intent: Intent) -> Vec<String> {
    tokenize(question)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| intent == Intent::RagOnly || !AGGREGATION_WORDS.contains(&t.as_str()))
        .collect()
}

/// Rank corpus sections for a question. An empty result is a valid state.
pub fn retrieve(
    question: &str,
    intent: Intent,
    index: &CorpusIndex,
    top_k: usize,
    min_score: f64,
) -> Vec<RetrievedChunk> {
    let terms = query_terms(question, intent);
    let results = index.search(&terms, top_k, min_score);
    debug!(
        intent = %intent,
        terms = ?terms,
        hits = results.len(),
        top_score = results.first().map(|c| c.score),
        "Retrieval complete"
    );
    results
}
