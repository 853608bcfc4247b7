//! Error types for LexForge
//!
//! Provides the error taxonomy shared by the retrieval core:
//! - Distinct error types for provider, store and fan-out failures
//! - Machine-readable error codes grouped by family
//! - Transient/permanent classification for retry decisions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    CollectionNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // Store errors (7xxx)
    StoreError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,
    RerankError,

    // Fan-out errors (85xx)
    TaskTimeout,
    AllTasksFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::CollectionNotFound => 4001,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Store (7xxx)
            ErrorCode::StoreError => 7001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::RerankError => 8004,

            // Fan-out (85xx)
            ErrorCode::TaskTimeout => 8501,
            ErrorCode::AllTasksFailed => 8502,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    // Rate limiting
    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    // Store errors
    #[error("Store error on collection {collection}: {message}")]
    Store { collection: String, message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Rerank error: {message}")]
    RerankError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Fan-out errors
    #[error("Task {task} timed out after {timeout_ms}ms")]
    TaskTimeout { task: String, timeout_ms: u64 },

    #[error("All {failed} tasks failed for {operation}: {last_error}")]
    AllTasksFailed {
        operation: String,
        failed: usize,
        last_error: String,
    },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::CollectionNotFound { .. } => ErrorCode::CollectionNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Store { .. } => ErrorCode::StoreError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::RerankError { .. } => ErrorCode::RerankError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::TaskTimeout { .. } => ErrorCode::TaskTimeout,
            AppError::AllTasksFailed { .. } => ErrorCode::AllTasksFailed,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Check if retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::RateLimited { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::TaskTimeout { .. } => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
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

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}
