//! Dense similarity search over a vector index
//!
//! Provides semantic search via embedding similarity, optionally thresholded.

use super::{RetrievalMode, RetrievedChunk, Retriever};
use crate::index::VectorIndex;
use routeqa_common::embeddings::Embedder;
use routeqa_common::errors::Result;
use routeqa_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Dense retriever over a loaded index
pub struct DenseRetriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    /// Chunks scoring below this are dropped, even if fewer than `top_k` remain
    min_score: Option<f32>,
}

impl DenseRetriever {
    /// Create a new dense retriever without a threshold
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
            min_score: None,
        }
    }

    /// Drop results scoring below `min_score`
    pub fn with_threshold(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

#[async_trait::async_trait]
impl Retriever for DenseRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();
        let embedding = self.embedder.embed(query).await?;
        let min_score = self.min_score.unwrap_or(f32::NEG_INFINITY);

        let chunks: Vec<RetrievedChunk> = self
            .index
            .search(&embedding, self.top_k)?
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .map(|(entry, score)| {
                RetrievedChunk::from_document(&entry.document, score, RetrievalMode::Dense)
            })
            .collect();

        debug!(
            chunk_count = chunks.len(),
            min_score = ?self.min_score,
            "Dense retrieval complete"
        );
        metrics::record_retrieval(start.elapsed().as_secs_f64(), "dense", chunks.len());
        Ok(chunks)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Document;
    use routeqa_common::embeddings::MockEmbedder;

    async fn retriever() -> DenseRetriever {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(256));
        let docs = vec![
            Document::new("Contracts require offer acceptance and consideration."),
            Document::new("Negligence requires duty breach causation and damages."),
            Document::new("Cognitive dissonance is discomfort from conflicting beliefs."),
        ];
        let index = VectorIndex::build(docs, embedder.as_ref()).await.unwrap();
        DenseRetriever::new(Arc::new(index), embedder, 2)
    }

    #[tokio::test]
    async fn test_bounded_by_top_k() {
        let retriever = retriever().await;
        let chunks = retriever.retrieve("negligence duty").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("Negligence"));
        assert!(chunks[0].score >= chunks[1].score);
        assert_eq!(chunks[0].retrieval_mode, RetrievalMode::Dense);
    }

    #[tokio::test]
    async fn test_threshold_may_empty_result() {
        let retriever = retriever().await.with_threshold(0.99);
        let chunks = retriever.retrieve("quantum chromodynamics").await.unwrap();
        assert!(chunks.is_empty());
    }
}
