//! Reranker contract.
//!
//! A reranker scores `(query, document)` pairs; higher is more relevant.
//! It is optional everywhere it is consumed: callers hold an
//! `Option<Arc<dyn Reranker>>` and fall back to embedding cosine similarity.

use crate::errors::Result;
use crate::models::UserRef;
use async_trait::async_trait;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per pair, in input order
    async fn score(&self, pairs: &[(String, String)], user: Option<&UserRef>) -> Result<Vec<f32>>;
}
