//! Retrieval system
//!
//! Provides five retrieval modes behind one `Retriever` capability:
//! - Dense search (cosine similarity over a vector index)
//! - Sparse search (BM25 lexical ranking)
//! - Ensemble search (weighted RRF fusion of N retrievers)
//! - Parent/child search (sub-chunks indexed, owning parents returned)
//! - Summary search (summaries indexed, owning parents returned)

mod bm25;
mod ensemble;
mod fusion;
mod hierarchical;
mod vector;

pub use bm25::SparseRetriever;
pub use ensemble::EnsembleRetriever;
pub use fusion::{FusionResult, WeightedFusion};
pub use hierarchical::{HierarchyMode, ParentChildRetriever};
pub use vector::DenseRetriever;

use routeqa_common::errors::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Free-form document metadata
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Indexed unit of text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique id of this unit
    pub id: Uuid,

    /// Stable id of the owning parent document (its own id for parents)
    pub parent_id: String,

    /// Text content
    pub content: String,

    /// Source metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a parent document; its parent id is derived from its text
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            parent_id: parent_id_for(&content),
            content,
            metadata: Metadata::new(),
        }
    }

    /// Create a unit owned by `parent`
    pub fn child_of(parent: &Document, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: parent.parent_id.clone(),
            content: content.into(),
            metadata: parent.metadata.clone(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// SHA-256 hex prefix of a parent's text
pub fn parent_id_for(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..8])
}

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// Chunk ID
    pub chunk_id: Uuid,

    /// Parent document this chunk belongs to
    pub parent_id: String,

    /// Chunk content
    pub content: String,

    /// Relevance score (higher is better)
    pub score: f32,

    /// Source metadata
    pub metadata: Metadata,

    /// Matching sub-chunks or summaries (parent/child modes only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_chunks: Vec<String>,

    /// Retrieval mode used
    pub retrieval_mode: RetrievalMode,
}

impl RetrievedChunk {
    pub fn from_document(document: &Document, score: f32, mode: RetrievalMode) -> Self {
        Self {
            chunk_id: document.id,
            parent_id: document.parent_id.clone(),
            content: document.content.clone(),
            score,
            metadata: document.metadata.clone(),
            sub_chunks: Vec::new(),
            retrieval_mode: mode,
        }
    }
}

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Vector similarity search
    Dense,
    /// BM25 lexical search
    Sparse,
    /// Weighted fusion of several retrievers
    Ensemble,
    /// Sub-chunk search returning parents
    ParentChild,
    /// Summary search returning parents
    Summary,
    /// Fixed results (tests, fixtures)
    Static,
}

impl RetrievalMode {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Dense => "dense",
            RetrievalMode::Sparse => "sparse",
            RetrievalMode::Ensemble => "ensemble",
            RetrievalMode::ParentChild => "parent_child",
            RetrievalMode::Summary => "summary",
            RetrievalMode::Static => "static",
        }
    }
}

/// Common trait for all retrievers
///
/// Results are ordered by descending score and bounded by the retriever's `top_k`.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks matching the query
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>>;

    /// Get the retrieval mode
    fn mode(&self) -> RetrievalMode;
}

/// Retriever returning a fixed result set, recording the queries it receives
pub struct StaticRetriever {
    chunks: Vec<RetrievedChunk>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Build from plain texts, scored in descending order
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let documents: Vec<Document> = texts.into_iter().map(Document::new).collect();
        let count = documents.len().max(1) as f32;
        let chunks = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                RetrievedChunk::from_document(doc, 1.0 - i as f32 / count, RetrievalMode::Static)
            })
            .collect();
        Self::new(chunks)
    }

    /// Always returns nothing
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        Ok(self.chunks.clone())
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Static
    }
}
