//! BM25 lexical search over an in-memory corpus
//!
//! Okapi BM25 with the usual `k1`/`b` parameters. Always returns up to
//! `top_k` documents regardless of score.

use super::{Document, RetrievalMode, RetrievedChunk, Retriever};
use crate::index::VectorIndex;
use routeqa_common::errors::Result;
use routeqa_common::metrics;
use std::collections::HashMap;
use std::time::Instant;

/// Term frequency saturation
const K1: f32 = 1.5;
/// Length normalization
const B: f32 = 0.75;

/// Sparse retriever using Okapi BM25
pub struct SparseRetriever {
    documents: Vec<Document>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lengths: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_length: f32,
    top_k: usize,
}

impl SparseRetriever {
    /// Index a corpus
    pub fn new(documents: Vec<Document>, top_k: usize) -> Self {
        let mut term_freqs = Vec::with_capacity(documents.len());
        let mut doc_lengths = Vec::with_capacity(documents.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for document in &documents {
            let tokens = tokenize(&document.content);
            doc_lengths.push(tokens.len());

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_doc_length = if documents.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f32 / documents.len() as f32
        };

        Self {
            documents,
            term_freqs,
            doc_lengths,
            doc_freqs,
            avg_doc_length,
            top_k,
        }
    }

    /// Index every document held by a vector index
    pub fn from_index(index: &VectorIndex, top_k: usize) -> Self {
        Self::new(index.documents().cloned().collect(), top_k)
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn score(&self, doc: usize, query_terms: &[String]) -> f32 {
        let freqs = &self.term_freqs[doc];
        let length_ratio = if self.avg_doc_length > 0.0 {
            self.doc_lengths[doc] as f32 / self.avg_doc_length
        } else {
            0.0
        };

        query_terms
            .iter()
            .filter_map(|term| freqs.get(term).map(|tf| (term, *tf as f32)))
            .map(|(term, tf)| {
                let numerator = tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * length_ratio);
                self.idf(term) * numerator / denominator
            })
            .sum()
    }
}

/// Lowercase alphanumeric tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait::async_trait]
impl Retriever for SparseRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();
        let query_terms = tokenize(query);

        let mut scored: Vec<(usize, f32)> = (0..self.documents.len())
            .map(|i| (i, self.score(i, &query_terms)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        let chunks: Vec<RetrievedChunk> = scored
            .into_iter()
            .map(|(i, score)| {
                RetrievedChunk::from_document(&self.documents[i], score, RetrievalMode::Sparse)
            })
            .collect();

        metrics::record_retrieval(start.elapsed().as_secs_f64(), "sparse", chunks.len());
        Ok(chunks)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Sparse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("The categorical imperative is central to Kant's ethics."),
            Document::new("Utilitarianism judges actions by their consequences."),
            Document::new("Kant wrote the Critique of Pure Reason; Kant was Prussian."),
            Document::new("Virtue ethics focuses on character."),
        ]
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Kant's  Ethics!"), vec!["kant", "s", "ethics"]);
    }

    #[tokio::test]
    async fn test_ranks_term_matches_first() {
        let retriever = SparseRetriever::new(corpus(), 2);
        let chunks = retriever.retrieve("kant").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.content.contains("Kant")));
        // Two occurrences beat one
        assert!(chunks[0].content.starts_with("Kant wrote"));
    }

    #[tokio::test]
    async fn test_always_returns_top_k() {
        let retriever = SparseRetriever::new(corpus(), 3);
        let chunks = retriever.retrieve("photosynthesis").await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.score == 0.0));
    }

    #[test]
    fn test_empty_corpus() {
        let retriever = SparseRetriever::new(Vec::new(), 4);
        let chunks = tokio_test::block_on(retriever.retrieve("anything")).unwrap();
        assert!(chunks.is_empty());
    }
}
