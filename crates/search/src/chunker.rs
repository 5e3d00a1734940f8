//! Text chunking module
//!
//! Splits corpus records into parent chunks, and parents into the smaller
//! child chunks indexed for parent/child retrieval.

use crate::retrieval::Document;
use routeqa_common::errors::{AppError, Result};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    fn splitter(&self) -> Result<TextSplitter<text_splitter::Characters>> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.chunk_overlap)
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid chunking config: {}", e),
            })?;
        Ok(TextSplitter::new(config))
    }
}

/// Split corpus records into parent documents.
///
/// Each piece keeps the record's metadata plus its `chunk_index`.
pub fn split_parents(records: &[Document], config: &ChunkingConfig) -> Result<Vec<Document>> {
    let splitter = config.splitter()?;
    let mut parents = Vec::new();

    for record in records {
        for (index, piece) in splitter.chunks(&record.content).enumerate() {
            let mut parent = Document::new(piece);
            parent.metadata = record.metadata.clone();
            parent.metadata.insert("chunk_index".into(), index.into());
            parents.push(parent);
        }
    }

    debug!(
        records = records.len(),
        parents = parents.len(),
        chunk_size = config.chunk_size,
        "Corpus split into parents"
    );
    Ok(parents)
}

/// Split parents into child chunks owned by them
pub fn split_children(parents: &[Document], config: &ChunkingConfig) -> Result<Vec<Document>> {
    let splitter = config.splitter()?;

    let children: Vec<Document> = parents
        .iter()
        .flat_map(|parent| {
            splitter
                .chunks(&parent.content)
                .map(move |piece| Document::child_of(parent, piece))
        })
        .collect();

    debug!(
        parents = parents.len(),
        children = children.len(),
        chunk_size = config.chunk_size,
        "Parents split into children"
    );
    Ok(children)
}
