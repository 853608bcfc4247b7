//! LexForge Common Library
//!
//! Shared code for the LexForge retrieval engine including:
//! - Request-scoped value types (QueryResult, Context, ScoredPoint)
//! - Embedding provider and reranker contracts
//! - Vector/document store and point store contracts
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod rerank;
pub mod store;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use models::{Context, Metadata, QueryResult, SourceDescriptor, UserRef};
pub use rerank::Reranker;
pub use store::{PointStore, VectorStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
