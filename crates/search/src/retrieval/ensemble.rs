//! Ensemble retrieval over N component retrievers
//!
//! Runs every component concurrently and merges the result sets with
//! weighted RRF fusion.

use super::{fusion::WeightedFusion, RetrievalMode, RetrievedChunk, Retriever};
use futures::future::try_join_all;
use routeqa_common::errors::{AppError, Result};
use routeqa_common::metrics;
use std::sync::Arc;
use std::time::Instant;

/// Ensemble retriever with fixed per-component weights
pub struct EnsembleRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    fusion: WeightedFusion,
    top_k: usize,
}

impl EnsembleRetriever {
    /// Create a new ensemble; one weight per retriever
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>, weights: Vec<f32>, top_k: usize) -> Result<Self> {
        if retrievers.is_empty() {
            return Err(AppError::Configuration {
                message: "ensemble retriever needs at least one component".to_string(),
            });
        }
        if weights.len() != retrievers.len() {
            return Err(AppError::Configuration {
                message: format!(
                    "ensemble has {} retrievers but {} weights",
                    retrievers.len(),
                    weights.len()
                ),
            });
        }

        Ok(Self {
            retrievers,
            fusion: WeightedFusion::with_weights(weights),
            top_k,
        })
    }
}

#[async_trait::async_trait]
impl Retriever for EnsembleRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();

        // A failing component fails the whole query
        let result_sets = try_join_all(self.retrievers.iter().map(|r| r.retrieve(query))).await?;

        let chunks: Vec<RetrievedChunk> = self
            .fusion
            .fuse(result_sets, self.top_k)
            .into_iter()
            .map(|r| r.chunk)
            .collect();

        metrics::record_retrieval(start.elapsed().as_secs_f64(), "ensemble", chunks.len());
        Ok(chunks)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Ensemble
    }
}
