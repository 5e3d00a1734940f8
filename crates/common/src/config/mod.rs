//! Configuration management for RouteQA
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with ROUTEQA__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! The loaded struct is the only place credentials live; components receive
//! the pieces they need through their constructors.

use crate::errors::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Chat model configuration
    #[validate(nested)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[validate(nested)]
    pub embedding: EmbeddingConfig,

    /// Groundedness check configuration
    pub grounding: GroundingConfig,

    /// Retrieval configuration
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    /// Safeguard pipeline configuration
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Dataset locations
    pub data: DataConfig,

    /// Router destinations, in registration order. Empty means the built-in catalog.
    #[validate(nested)]
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LlmConfig {
    /// OpenAI-compatible API base (chat completions live under it)
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// API key
    pub api_key: Option<String>,

    /// Chat model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Maximum output tokens (provider default when unset)
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,

    /// Client-side request budget
    #[serde(default = "default_requests_per_second")]
    #[validate(range(min = 1))]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key (falls back to the chat model key)
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for retryable failures
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroundingConfig {
    /// Run the groundedness check on answers produced with context
    #[serde(default)]
    pub enabled: bool,

    /// Groundedness model name
    #[serde(default = "default_grounding_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalConfig {
    /// Results per query
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1))]
    pub top_k: usize,

    /// Similarity floor for the primary (regulations) destination
    #[serde(default = "default_primary_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub primary_threshold: f32,

    /// Similarity floor for subject-domain destinations
    #[serde(default = "default_domain_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub domain_threshold: f32,

    /// Similarity floor for the default destination
    #[serde(default = "default_default_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub default_threshold: f32,

    /// Parent chunk size in characters when indexing
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Parent chunk overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Child chunk size for parent/child indexing
    #[serde(default = "default_child_chunk_size")]
    #[validate(range(min = 1))]
    pub child_chunk_size: usize,

    /// Child chunk overlap
    #[serde(default = "default_child_chunk_overlap")]
    pub child_chunk_overlap: usize,

    /// Fusion weights for ensemble destinations (dense, sparse)
    #[serde(default = "default_ensemble_weights")]
    #[validate(custom(function = validate_weights))]
    pub ensemble_weights: Vec<f32>,

    /// Concurrent summarization requests when building summary indices
    #[serde(default = "default_summary_concurrency")]
    #[validate(range(min = 1))]
    pub summary_concurrency: usize,

    /// Directory holding persisted indices
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
}

/// What the router does with a well-formed but unregistered destination name
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownDestinationPolicy {
    /// Raise a routing error; the pipeline recovers through the primary safeguard
    #[default]
    Safeguard,
    /// Quietly use the default destination
    Default,
}

/// What the batch runner does when a question fails with a transport error
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log, record a placeholder answer, and continue with the next question
    #[default]
    Skip,
    /// Stop the batch
    Abort,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PipelineConfig {
    /// Destination whose index backs the default destination and the primary safeguard
    #[serde(default = "default_primary_destination")]
    pub primary_destination: String,

    /// Handling of unregistered destination names
    #[serde(default)]
    pub unknown_destination: UnknownDestinationPolicy,

    /// Handling of per-question transport failures
    #[serde(default)]
    pub on_error: ErrorPolicy,

    /// Answer recorded for skipped questions
    #[serde(default)]
    pub error_placeholder: String,

    /// Questions processed at once (1 = sequential)
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Root directory for datasets
    #[serde(default = "default_data_root")]
    pub root: PathBuf,

    /// Questions file, relative to root
    #[serde(default = "default_questions_file")]
    pub questions_file: String,

    /// Column holding the question text
    #[serde(default = "default_question_column")]
    pub question_column: String,

    /// Column holding gold answers (optional in the file)
    #[serde(default = "default_answer_column")]
    pub answer_column: String,

    /// Output file, relative to root
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

/// Retriever variant backing a destination
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
    #[default]
    Dense,
    Sparse,
    /// Dense and sparse fused with `retrieval.ensemble_weights`
    Ensemble,
    /// Child chunks searched, parents returned
    Hierarchical,
    /// Summaries searched, parents returned
    Summary,
}

/// Prompt family used by a destination
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Regulations,
    #[default]
    Domain,
    Base,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DestinationConfig {
    /// Name the router answers with
    #[validate(length(min = 1))]
    pub name: String,

    /// Description shown to the router
    pub description: String,

    /// Index file, relative to retrieval.index_dir unless absolute
    pub index_path: PathBuf,

    #[serde(default)]
    pub kind: RetrieverKind,

    #[serde(default)]
    pub prompt: PromptKind,

    /// Overrides the domain threshold
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold: Option<f32>,

    /// Overrides retrieval.top_k
    #[validate(range(min = 1))]
    pub top_k: Option<usize>,
}

fn validate_weights(weights: &[f32]) -> std::result::Result<(), validator::ValidationError> {
    if weights.is_empty() || weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
        return Err(validator::ValidationError::new("ensemble_weights"));
    }
    Ok(())
}

// Default value functions
fn default_llm_api_base() -> String { "https://api.upstage.ai/v1/solar".to_string() }
fn default_llm_model() -> String { "solar-1-mini-chat".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_requests_per_second() -> u32 { 5 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "solar-embedding-1-large".to_string() }
fn default_embedding_dimension() -> usize { 4096 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 100 }
fn default_grounding_model() -> String { "groundedness-check".to_string() }
fn default_top_k() -> usize { 4 }
fn default_primary_threshold() -> f32 { 0.8 }
fn default_domain_threshold() -> f32 { 0.6 }
fn default_default_threshold() -> f32 { 0.3 }
fn default_chunk_size() -> usize { 300 }
fn default_chunk_overlap() -> usize { 100 }
fn default_child_chunk_size() -> usize { 200 }
fn default_child_chunk_overlap() -> usize { 50 }
fn default_ensemble_weights() -> Vec<f32> { vec![0.5, 0.5] }
fn default_summary_concurrency() -> usize { 5 }
fn default_index_dir() -> PathBuf { PathBuf::from("./db") }
fn default_primary_destination() -> String { "regulations_retriever".to_string() }
fn default_concurrency() -> usize { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "routeqa".to_string() }
fn default_data_root() -> PathBuf { PathBuf::from("./data") }
fn default_questions_file() -> String { "testset.csv".to_string() }
fn default_question_column() -> String { "prompts".to_string() }
fn default_answer_column() -> String { "answers".to_string() }
fn default_output_file() -> String { "answers.csv".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., ROUTEQA__LLM__API_KEY=...
            .add_source(
                Environment::with_prefix("ROUTEQA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("ROUTEQA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Run the validation rules, returning the config unchanged on success
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Embedding key, falling back to the chat model key
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.llm.api_key.as_deref())
    }

    /// Resolve an index path against the index directory
    pub fn index_path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.retrieval.index_dir.join(path)
        }
    }

    /// Questions file location
    pub fn questions_path(&self) -> PathBuf {
        self.data.root.join(&self.data.questions_file)
    }

    /// Answers file location
    pub fn output_path(&self) -> PathBuf {
        self.data.root.join(&self.data.output_file)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            api_key: None,
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_llm_api_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_grounding_model(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            primary_threshold: default_primary_threshold(),
            domain_threshold: default_domain_threshold(),
            default_threshold: default_default_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            child_chunk_size: default_child_chunk_size(),
            child_chunk_overlap: default_child_chunk_overlap(),
            ensemble_weights: default_ensemble_weights(),
            summary_concurrency: default_summary_concurrency(),
            index_dir: default_index_dir(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_destination: default_primary_destination(),
            unknown_destination: UnknownDestinationPolicy::default(),
            on_error: ErrorPolicy::default(),
            error_placeholder: String::new(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: default_data_root(),
            questions_file: default_questions_file(),
            question_column: default_question_column(),
            answer_column: default_answer_column(),
            output_file: default_output_file(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            grounding: GroundingConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            observability: ObservabilityConfig::default(),
            data: DataConfig::default(),
            destinations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.llm.model, "solar-1-mini-chat");
        assert_eq!(config.pipeline.unknown_destination, UnknownDestinationPolicy::Safeguard);
        assert_eq!(config.pipeline.on_error, ErrorPolicy::Skip);
        assert!(config.clone().validated().is_ok());
    }

    #[test]
    fn test_embedding_key_fallback() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("chat-key".into());
        assert_eq!(config.embedding_api_key(), Some("chat-key"));

        config.embedding.api_key = Some("embed-key".into());
        assert_eq!(config.embedding_api_key(), Some("embed-key"));
    }

    #[test]
    fn test_validation_rejects_zero_top_k() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        let err = config.validated().unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validation_rejects_negative_weight() {
        let mut config = AppConfig::default();
        config.retrieval.ensemble_weights = vec![0.7, -0.3];
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_index_path_resolution() {
        let config = AppConfig::default();
        let resolved = config.index_path(std::path::Path::new("law.json"));
        assert_eq!(resolved, PathBuf::from("./db/law.json"));
    }

    #[test]
    fn test_policies_deserialize_snake_case() {
        let policy: UnknownDestinationPolicy = serde_json::from_str("\"default\"").unwrap();
        assert_eq!(policy, UnknownDestinationPolicy::Default);
        let kind: RetrieverKind = serde_json::from_str("\"hierarchical\"").unwrap();
        assert_eq!(kind, RetrieverKind::Hierarchical);
    }
}
