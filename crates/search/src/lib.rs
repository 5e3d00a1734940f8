//! RouteQA Search Library
//!
//! Retrieval primitives shared by the answer pipeline and the indexer:
//! - `Retriever` capability with dense, sparse, ensemble, parent/child,
//!   and summary variants
//! - Persisted vector index
//! - Parent and child chunking
//! - Summary generation

pub mod chunker;
pub mod index;
pub mod retrieval;
pub mod summary;

pub use index::VectorIndex;
pub use retrieval::{Document, RetrievalMode, RetrievedChunk, Retriever};
