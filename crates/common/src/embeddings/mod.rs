//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible endpoints
//! - Azure OpenAI deployments
//! - Ollama
//! - A deterministic mock for tests and offline runs

mod http;

pub use http::HttpEmbedder;

use crate::config::{EmbeddingConfig, EmbeddingEngine};
use crate::errors::{AppError, Result};
use crate::models::UserRef;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(
        &self,
        texts: &[String],
        prefix: Option<&str>,
        user: Option<&UserRef>,
    ) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str, prefix: Option<&str>, user: Option<&UserRef>) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()], prefix, user).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Deterministic embedder for testing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension`
/// buckets, so texts sharing words get similar vectors.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return v;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        _prefix: Option<&str>,
        _user: Option<&UserRef>,
    ) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.engine {
        EmbeddingEngine::Mock => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        EmbeddingEngine::OpenAi | EmbeddingEngine::AzureOpenAi | EmbeddingEngine::Ollama => {
            Ok(Arc::new(HttpEmbedder::from_config(config)?))
        }
    }
}
