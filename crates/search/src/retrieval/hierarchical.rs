//! Parent/child retrieval
//!
//! Search runs over small indexed units (sub-chunks or summaries); the
//! result is the owning parent documents, each returned once, with the
//! matching units attached as `sub_chunks`.

use super::{RetrievalMode, RetrievedChunk, Retriever};
use crate::index::VectorIndex;
use routeqa_common::errors::Result;
use routeqa_common::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// What the child index holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyMode {
    /// Raw sub-chunks of each parent
    ParentChild,
    /// One model-written summary per parent
    Summary,
}

impl HierarchyMode {
    fn retrieval_mode(&self) -> RetrievalMode {
        match self {
            HierarchyMode::ParentChild => RetrievalMode::ParentChild,
            HierarchyMode::Summary => RetrievalMode::Summary,
        }
    }
}

pub struct ParentChildRetriever {
    children: Arc<dyn Retriever>,
    docstore: Arc<VectorIndex>,
    mode: HierarchyMode,
    top_k: usize,
}

impl ParentChildRetriever {
    /// `children` searches the child units; `docstore` resolves parent ids
    pub fn new(
        children: Arc<dyn Retriever>,
        docstore: Arc<VectorIndex>,
        mode: HierarchyMode,
        top_k: usize,
    ) -> Self {
        Self {
            children,
            docstore,
            mode,
            top_k,
        }
    }
}

#[async_trait::async_trait]
impl Retriever for ParentChildRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();
        let hits = self.children.retrieve(query).await?;
        let mode = self.mode.retrieval_mode();

        // Parents in order of their best-scoring child
        let mut parents: Vec<RetrievedChunk> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for hit in hits {
            if let Some(&pos) = seen.get(&hit.parent_id) {
                parents[pos].sub_chunks.push(hit.content);
                continue;
            }

            let Some(parent) = self.docstore.parent(&hit.parent_id) else {
                warn!(parent_id = %hit.parent_id, "Child references a parent missing from the docstore");
                continue;
            };

            let mut chunk = RetrievedChunk::from_document(parent, hit.score, mode);
            chunk.sub_chunks.push(hit.content);
            seen.insert(hit.parent_id, parents.len());
            parents.push(chunk);
        }

        parents.truncate(self.top_k);
        metrics::record_retrieval(start.elapsed().as_secs_f64(), mode.as_str(), parents.len());
        Ok(parents)
    }

    fn mode(&self) -> RetrievalMode {
        self.mode.retrieval_mode()
    }
}
