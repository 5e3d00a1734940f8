//! Persisted vector index
//!
//! Entries pair a `Document` with its embedding. Parent/child and summary
//! indices also carry a docstore of parents keyed by parent id.
//! Indices are built once, written as JSON, and loaded read-only.

use crate::retrieval::Document;
use chrono::{DateTime, Utc};
use routeqa_common::embeddings::Embedder;
use routeqa_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::future::Future;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Document plus its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document: Document,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    /// Embedding model that produced the vectors
    model: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    /// Parent docstore (empty for flat indices)
    #[serde(default)]
    parents: BTreeMap<String, Document>,
}

impl VectorIndex {
    /// Embed `documents` and build a flat index
    pub async fn build(documents: Vec<Document>, embedder: &dyn Embedder) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != documents.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Embedded {} of {} documents",
                    embeddings.len(),
                    documents.len()
                ),
            });
        }

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(document, embedding)| IndexEntry { document, embedding })
            .collect::<Vec<_>>();

        info!(
            entries = entries.len(),
            model = embedder.model_name(),
            "Vector index built"
        );

        Ok(Self {
            model: embedder.model_name().to_string(),
            dimension: embedder.dimension(),
            created_at: Utc::now(),
            entries,
            parents: BTreeMap::new(),
        })
    }

    /// Attach the parent docstore
    pub fn with_parents(mut self, parents: Vec<Document>) -> Self {
        self.parents = parents
            .into_iter()
            .map(|p| (p.parent_id.clone(), p))
            .collect();
        self
    }

    /// Load a persisted index. A missing or unreadable file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let unavailable = |message: String| AppError::IndexUnavailable {
            path: path.display().to_string(),
            message,
        };

        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let index: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| unavailable(format!("corrupt index: {}", e)))?;

        info!(
            path = %path.display(),
            entries = index.entries.len(),
            parents = index.parents.len(),
            "Vector index loaded"
        );
        Ok(index)
    }

    /// Persist as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        info!(path = %path.display(), entries = self.entries.len(), "Vector index saved");
        Ok(())
    }

    /// Load when present, otherwise build and persist
    pub async fn load_or_build<F, Fut>(path: &Path, build: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Self>>,
    {
        if path.exists() {
            return Self::load(path);
        }
        let index = build().await?;
        index.save(path)?;
        Ok(index)
    }

    /// Cosine similarity search, descending score, ties in insertion order
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(&IndexEntry, f32)>> {
        if query.len() != self.dimension {
            return Err(AppError::Configuration {
                message: format!(
                    "Query embedding has dimension {}, index expects {} ({})",
                    query.len(),
                    self.dimension,
                    self.model
                ),
            });
        }

        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().map(|e| &e.document)
    }

    /// Look up a parent in the docstore
    pub fn parent(&self, parent_id: &str) -> Option<&Document> {
        self.parents.get(parent_id)
    }

    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
