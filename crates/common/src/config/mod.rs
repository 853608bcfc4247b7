//! Configuration management for LexForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::errors::Result;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Retrieval and ranking knobs
    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    /// Embedding provider configuration
    #[serde(default)]
    #[validate(nested)]
    pub embedding: EmbeddingConfig,

    /// Legal feature store configuration
    #[serde(default)]
    #[validate(nested)]
    pub legal: LegalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalConfig {
    /// Requested result count (k)
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Results kept by the rerank stage (k_reranker)
    #[serde(default = "default_top_k_reranker")]
    pub top_k_reranker: usize,

    /// Minimum rerank score (r); zero disables the cutoff
    #[serde(default)]
    pub relevance_threshold: f32,

    /// Lexical weight in the hybrid ensemble (w)
    #[serde(default = "default_hybrid_bm25_weight")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub hybrid_bm25_weight: f32,

    /// Use hybrid lexical+vector search for collections
    #[serde(default)]
    pub hybrid_search: bool,

    /// Return whole collections instead of searching them
    #[serde(default)]
    pub full_context: bool,

    /// Maximum concurrent tasks per fan-out call
    #[serde(default = "default_max_concurrency")]
    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    /// Per-task timeout in seconds
    #[serde(default = "default_task_timeout")]
    #[validate(range(min = 1))]
    pub task_timeout_secs: u64,
}

/// Embedding provider engine
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum EmbeddingEngine {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "mock")]
    Mock,
}

impl EmbeddingEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingEngine::OpenAi => "openai",
            EmbeddingEngine::AzureOpenAi => "azure_openai",
            EmbeddingEngine::Ollama => "ollama",
            EmbeddingEngine::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EmbeddingConfig {
    /// Embedding engine: openai, azure_openai, ollama, mock
    #[serde(default = "default_embedding_engine")]
    pub engine: EmbeddingEngine,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model (or Azure deployment) to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,

    /// Attempts made when the provider rate-limits
    #[serde(default = "default_embedding_retries")]
    #[validate(range(min = 1))]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Prefix applied to query embeddings
    pub query_prefix: Option<String>,

    /// Prefix applied to content embeddings
    pub content_prefix: Option<String>,

    /// JSON field carrying the prefix; when unset the prefix is prepended to the text
    pub prefix_field_name: Option<String>,

    /// Azure OpenAI API version
    #[serde(default = "default_azure_api_version")]
    pub azure_api_version: String,

    /// Forward user identity headers to the provider
    #[serde(default)]
    pub forward_user_info: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LegalConfig {
    /// Legal store collection; None disables the subsystem
    pub collection: Option<String>,

    /// Feature keys known before sampling the store
    #[serde(default = "default_feature_keys")]
    pub default_feature_keys: Vec<String>,

    /// Payload keys never treated as features
    #[serde(default = "default_base_fields")]
    pub base_fields: Vec<String>,

    /// Maximum legal contexts per request
    #[serde(default = "default_legal_max_results")]
    #[validate(range(min = 1))]
    pub max_results: usize,

    /// Page size used when enumerating the store
    #[serde(default = "default_scroll_page_size")]
    #[validate(range(min = 1))]
    pub scroll_page_size: usize,

    #[serde(default = "default_fallback_content_field")]
    pub fallback_content_field: String,

    #[serde(default = "default_fallback_feature_field")]
    pub fallback_feature_field: String,

    #[serde(default = "default_case_number_field")]
    pub case_number_field: String,

    #[serde(default = "default_file_name_field")]
    pub file_name_field: String,

    #[serde(default = "default_document_id_field")]
    pub document_id_field: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_top_k() -> usize { 3 }
fn default_top_k_reranker() -> usize { 3 }
fn default_hybrid_bm25_weight() -> f32 { 0.5 }
fn default_max_concurrency() -> usize { 8 }
fn default_task_timeout() -> u64 { 30 }
fn default_embedding_engine() -> EmbeddingEngine { EmbeddingEngine::OpenAi }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 5 }
fn default_batch_size() -> usize { 10 }
fn default_azure_api_version() -> String { "2023-05-15".to_string() }
fn default_feature_keys() -> Vec<String> {
    ["amar_putusan", "pertimbangan_hukum", "duduk_perkara", "barang_bukti", "pidana"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_base_fields() -> Vec<String> {
    [
        "document_id",
        "nomor_putusan",
        "file_name",
        "source_column",
        "column_value",
        "text",
        "vector",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_legal_max_results() -> usize { 5 }
fn default_scroll_page_size() -> usize { 256 }
fn default_fallback_content_field() -> String { "column_value".to_string() }
fn default_fallback_feature_field() -> String { "source_column".to_string() }
fn default_case_number_field() -> String { "nomor_putusan".to_string() }
fn default_file_name_field() -> String { "file_name".to_string() }
fn default_document_id_field() -> String { "document_id".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "lexforge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Run field validation, mapping failures to `AppError::Validation`
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Get the per-task fan-out timeout as Duration
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.task_timeout_secs)
    }

    /// Legal context cap for a request asking for `k` results
    pub fn legal_max_results(&self, k: usize) -> usize {
        if k > 0 {
            self.legal.max_results.min(k)
        } else {
            self.legal.max_results
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_k_reranker: default_top_k_reranker(),
            relevance_threshold: 0.0,
            hybrid_bm25_weight: default_hybrid_bm25_weight(),
            hybrid_search: false,
            full_context: false,
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            engine: default_embedding_engine(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
            query_prefix: None,
            content_prefix: None,
            prefix_field_name: None,
            azure_api_version: default_azure_api_version(),
            forward_user_info: false,
        }
    }
}

impl Default for LegalConfig {
    fn default() -> Self {
        Self {
            collection: None,
            default_feature_keys: default_feature_keys(),
            base_fields: default_base_fields(),
            max_results: default_legal_max_results(),
            scroll_page_size: default_scroll_page_size(),
            fallback_content_field: default_fallback_content_field(),
            fallback_feature_field: default_fallback_feature_field(),
            case_number_field: default_case_number_field(),
            file_name_field: default_file_name_field(),
            document_id_field: default_document_id_field(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}
