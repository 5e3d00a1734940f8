//! Weighted Reciprocal Rank Fusion (RRF) for combining result sets
//!
//! Each result set contributes `weight / (k + rank)` to every chunk it
//! contains, so a chunk found by several retrievers accumulates score.
//! Rank-based fusion needs no score normalization across retrievers.

use super::{RetrievalMode, RetrievedChunk};
use std::collections::HashMap;
use uuid::Uuid;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct WeightedFusion {
    /// Constant k (typically 60)
    pub k: f32,

    /// One weight per result set
    pub weights: Vec<f32>,
}

/// Result of fusion
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub chunk: RetrievedChunk,
    /// 1-based rank in each result set, if present
    pub ranks: Vec<Option<usize>>,
    pub rrf_score: f32,
}

impl WeightedFusion {
    /// Create with per-retriever weights
    pub fn with_weights(weights: Vec<f32>) -> Self {
        Self { k: 60.0, weights }
    }

    /// Fuse result sets, deduplicating by chunk id.
    ///
    /// Equal scores keep first-seen order: earlier result sets first, then rank.
    pub fn fuse(&self, result_sets: Vec<Vec<RetrievedChunk>>, limit: usize) -> Vec<FusionResult> {
        let set_count = result_sets.len();
        let mut positions: HashMap<Uuid, usize> = HashMap::new();
        let mut fused: Vec<FusionResult> = Vec::new();

        for (set, results) in result_sets.into_iter().enumerate() {
            let weight = self.weights.get(set).copied().unwrap_or(0.0);

            for (rank, chunk) in results.into_iter().enumerate() {
                let contribution = weight / (self.k + (rank + 1) as f32);

                match positions.get(&chunk.chunk_id) {
                    Some(&pos) => {
                        let entry = &mut fused[pos];
                        if entry.ranks[set].is_none() {
                            entry.ranks[set] = Some(rank + 1);
                            entry.rrf_score += contribution;
                        }
                    }
                    None => {
                        let mut ranks = vec![None; set_count];
                        ranks[set] = Some(rank + 1);
                        positions.insert(chunk.chunk_id, fused.len());
                        fused.push(FusionResult {
                            chunk,
                            ranks,
                            rrf_score: contribution,
                        });
                    }
                }
            }
        }

        // Stable sort keeps first-seen order among ties
        fused.sort_by(|a, b| {
            b.rrf_score
                .partial_cmp(&a.rrf_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        fused.truncate(limit);

        // Normalize scores to 0-1 range
        let max_score = fused.first().map(|r| r.rrf_score).unwrap_or(0.0);
        for result in &mut fused {
            if max_score > 0.0 {
                result.rrf_score /= max_score;
            }
            result.chunk.score = result.rrf_score;
            result.chunk.retrieval_mode = RetrievalMode::Ensemble;
        }

        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Metadata;

    fn make_chunk(id: u128, mode: RetrievalMode) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::from_u128(id),
            parent_id: format!("p{}", id),
            content: format!("chunk {}", id),
            score: 0.5,
            metadata: Metadata::new(),
            sub_chunks: Vec::new(),
            retrieval_mode: mode,
        }
    }

    #[test]
    fn test_rrf_fusion() {
        let fusion = WeightedFusion::with_weights(vec![0.5, 0.5]);

        // Dense:  [A, B, C]
        // Sparse: [B, A, D]
        // A and B appear in both, so they lead
        let dense = vec![
            make_chunk(1, RetrievalMode::Dense),
            make_chunk(2, RetrievalMode::Dense),
            make_chunk(3, RetrievalMode::Dense),
        ];
        let sparse = vec![
            make_chunk(2, RetrievalMode::Sparse),
            make_chunk(1, RetrievalMode::Sparse),
            make_chunk(4, RetrievalMode::Sparse),
        ];

        let results = fusion.fuse(vec![dense, sparse], 10);
        assert_eq!(results.len(), 4);

        // A and B tie; A was seen first
        assert_eq!(results[0].chunk.chunk_id, Uuid::from_u128(1));
        assert_eq!(results[1].chunk.chunk_id, Uuid::from_u128(2));
        assert_eq!(results[0].ranks, vec![Some(1), Some(2)]);
        assert_eq!(results[0].chunk.score, 1.0);

        // C and D tie; C came from the first retriever
        assert_eq!(results[2].chunk.chunk_id, Uuid::from_u128(3));
        assert_eq!(results[3].chunk.chunk_id, Uuid::from_u128(4));
        assert!(results.iter().all(|r| r.chunk.retrieval_mode == RetrievalMode::Ensemble));
    }

    #[test]
    fn test_weights_shift_ranking() {
        let fusion = WeightedFusion::with_weights(vec![0.2, 0.8]);
        let results = fusion.fuse(
            vec![
                vec![make_chunk(1, RetrievalMode::Dense)],
                vec![make_chunk(2, RetrievalMode::Sparse)],
            ],
            10,
        );
        assert_eq!(results[0].chunk.chunk_id, Uuid::from_u128(2));
        assert!(results[1].rrf_score < 1.0);
    }

    #[test]
    fn test_limit_and_empty() {
        let fusion = WeightedFusion::with_weights(vec![1.0; 3]);
        assert!(fusion.fuse(vec![vec![], vec![], vec![]], 5).is_empty());

        let many: Vec<_> = (0..10).map(|i| make_chunk(i, RetrievalMode::Dense)).collect();
        assert_eq!(fusion.fuse(vec![many], 4).len(), 4);
    }
}
