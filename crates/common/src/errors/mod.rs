//! Error types for RouteQA
//!
//! Provides a single error enum shared by every crate with:
//! - Distinct variants for each failure mode
//! - Machine-readable error codes
//! - Classification into the pipeline's recovery taxonomy
//! - Retryable vs fatal distinction for transport failures

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    ValidationError,
    IndexUnavailable,
    MissingDefaultDestination,
    DuplicateDestination,

    // Routing errors (2xxx)
    UnknownDestination,

    // Transport errors (3xxx)
    ModelTimeout,
    RateLimited,
    UpstreamError,
    ModelError,
    EmbeddingError,
    EmbeddingTimeout,

    // Data errors (4xxx)
    DatasetError,
    SerializationError,

    // Internal errors (9xxx)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::ValidationError => 1002,
            ErrorCode::IndexUnavailable => 1003,
            ErrorCode::MissingDefaultDestination => 1004,
            ErrorCode::DuplicateDestination => 1005,

            ErrorCode::UnknownDestination => 2001,

            ErrorCode::ModelTimeout => 3001,
            ErrorCode::RateLimited => 3002,
            ErrorCode::UpstreamError => 3003,
            ErrorCode::ModelError => 3004,
            ErrorCode::EmbeddingError => 3005,
            ErrorCode::EmbeddingTimeout => 3006,

            ErrorCode::DatasetError => 4001,
            ErrorCode::SerializationError => 4002,

            ErrorCode::InternalError => 9001,
        }
    }
}

/// Recovery class of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Deployment or configuration mistake; aborts the run
    Configuration,
    /// Router named a destination that is not registered; recovered by the pipeline
    Routing,
    /// Model or embedding service failure; propagates out of the current question
    Transport,
    /// Bad input data
    Data,
    /// Anything else
    Internal,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Index unavailable at {path}: {message}")]
    IndexUnavailable { path: String, message: String },

    #[error("No default destination configured and router output could not be resolved")]
    MissingDefaultDestination,

    #[error("Duplicate destination name: {name}")]
    DuplicateDestination { name: String },

    // Routing errors
    #[error("Received invalid destination name '{name}'")]
    UnknownDestination { name: String },

    // Transport errors
    #[error("Model request timed out after {timeout_ms}ms")]
    ModelTimeout { timeout_ms: u64 },

    #[error("Rate limited by upstream service")]
    RateLimited,

    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Model error: {message}")]
    Model { message: String },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Data errors
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::IndexUnavailable { .. } => ErrorCode::IndexUnavailable,
            AppError::MissingDefaultDestination => ErrorCode::MissingDefaultDestination,
            AppError::DuplicateDestination { .. } => ErrorCode::DuplicateDestination,
            AppError::UnknownDestination { .. } => ErrorCode::UnknownDestination,
            AppError::ModelTimeout { .. } => ErrorCode::ModelTimeout,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::Model { .. } => ErrorCode::ModelError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Dataset { .. } => ErrorCode::DatasetError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the recovery class for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Configuration { .. }
            | AppError::Validation { .. }
            | AppError::IndexUnavailable { .. }
            | AppError::MissingDefaultDestination
            | AppError::DuplicateDestination { .. } => ErrorKind::Configuration,

            AppError::UnknownDestination { .. } => ErrorKind::Routing,

            AppError::ModelTimeout { .. }
            | AppError::RateLimited
            | AppError::Upstream { .. }
            | AppError::Model { .. }
            | AppError::EmbeddingError { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::HttpClient(_) => ErrorKind::Transport,

            AppError::Dataset { .. } | AppError::Serialization(_) => ErrorKind::Data,

            AppError::Internal { .. } | AppError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether a later attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ModelTimeout { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::RateLimited => true,
            AppError::Upstream { status, .. } => *status >= 500,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the whole run must stop
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Map a reqwest failure from a model call, keeping timeouts distinct
    pub fn from_model_transport(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            AppError::ModelTimeout { timeout_ms }
        } else {
            AppError::HttpClient(err)
        }
    }

    /// Map a non-success HTTP status into a transport error
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            AppError::RateLimited
        } else {
            AppError::Upstream {
                status,
                message: body,
            }
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Dataset {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::UnknownDestination {
            name: "education_retriever".into(),
        };
        assert_eq!(err.code(), ErrorCode::UnknownDestination);
        assert_eq!(err.code().as_code(), 2001);
        assert_eq!(err.kind(), ErrorKind::Routing);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        let err = AppError::IndexUnavailable {
            path: "db/law.json".into(),
            message: "not found".into(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert!(AppError::MissingDefaultDestination.is_fatal());
    }

    #[test]
    fn test_transport_retryable() {
        assert!(AppError::ModelTimeout { timeout_ms: 100 }.is_retryable());
        assert!(AppError::from_status(429, String::new()).is_retryable());
        assert!(AppError::from_status(503, "busy".into()).is_retryable());

        let auth = AppError::from_status(401, "bad key".into());
        assert!(!auth.is_retryable());
        assert_eq!(auth.kind(), ErrorKind::Transport);
        assert!(!auth.is_fatal());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::ModelTimeout).unwrap();
        assert_eq!(json, "\"MODEL_TIMEOUT\"");
    }
}
