//! RouteQA Common Library
//!
//! Shared code for the RouteQA crates including:
//! - Error types and the recovery taxonomy
//! - Configuration management
//! - Language model and groundedness clients
//! - Embedding client abstraction
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, ErrorCode, ErrorKind, Result};
pub use llm::{Groundedness, GroundednessChecker, LanguageModel};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
