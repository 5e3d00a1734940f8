//! Offline index building
//!
//! Turns corpus records into a persisted `VectorIndex` in one of three
//! layouts. Runs before the pipeline and never concurrently with it.

use routeqa_common::config::RetrievalConfig;
use routeqa_common::embeddings::Embedder;
use routeqa_common::errors::{AppError, Result};
use routeqa_common::llm::LanguageModel;
use routeqa_search::chunker::{split_children, split_parents, ChunkingConfig};
use routeqa_search::summary::build_summaries;
use routeqa_search::{Document, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Index layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IndexMode {
    /// Parent chunks embedded directly
    Flat,
    /// Child chunks embedded, parents kept in the docstore
    ParentChild,
    /// Model summaries embedded, parents kept in the docstore
    Summary,
}

/// Chunk, embed, and assemble an index. `model` is only used for summaries.
#[instrument(skip_all, fields(mode = ?mode, records = records.len()))]
pub async fn build_index(
    records: &[Document],
    mode: IndexMode,
    config: &RetrievalConfig,
    embedder: &dyn Embedder,
    model: Option<&dyn LanguageModel>,
) -> Result<VectorIndex> {
    let parents = split_parents(
        records,
        &ChunkingConfig::new(config.chunk_size, config.chunk_overlap),
    )?;

    let index = match mode {
        IndexMode::Flat => VectorIndex::build(parents, embedder).await?,
        IndexMode::ParentChild => {
            let children = split_children(
                &parents,
                &ChunkingConfig::new(config.child_chunk_size, config.child_chunk_overlap),
            )?;
            VectorIndex::build(children, embedder)
                .await?
                .with_parents(parents)
        }
        IndexMode::Summary => {
            let model = model.ok_or_else(|| AppError::Configuration {
                message: "Summary indexing needs a language model".to_string(),
            })?;
            let summaries = build_summaries(&parents, model, config.summary_concurrency).await?;
            VectorIndex::build(summaries, embedder)
                .await?
                .with_parents(parents)
        }
    };

    info!(entries = index.len(), "Index ready");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeqa_common::embeddings::MockEmbedder;
    use routeqa_common::llm::MockLanguageModel;

    fn records() -> Vec<Document> {
        vec![
            Document::new("Students may enroll for up to eight semesters. ".repeat(12)),
            Document::new("Tuition is refunded in full before the semester starts. ".repeat(12)),
        ]
    }

    #[tokio::test]
    async fn test_flat_index() {
        let config = RetrievalConfig::default();
        let index = build_index(&records(), IndexMode::Flat, &config, &MockEmbedder::new(32), None)
            .await
            .unwrap();
        assert!(index.len() >= 2);
        assert!(!index.has_parents());
    }

    #[tokio::test]
    async fn test_parent_child_index() {
        let config = RetrievalConfig::default();
        let index = build_index(&records(), IndexMode::ParentChild, &config, &MockEmbedder::new(32), None)
            .await
            .unwrap();
        assert!(index.has_parents());
        assert!(index.documents().all(|d| index.parent(&d.parent_id).is_some()));
    }

    #[tokio::test]
    async fn test_summary_index_needs_model() {
        let config = RetrievalConfig::default();
        let embedder = MockEmbedder::new(32);

        let err = build_index(&records(), IndexMode::Summary, &config, &embedder, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        let model = MockLanguageModel::constant("a summary");
        let index = build_index(&records(), IndexMode::Summary, &config, &embedder, Some(&model))
            .await
            .unwrap();
        assert!(index.has_parents());
        assert!(index.documents().all(|d| d.content == "a summary"));
    }
}
