//! Per-collection retrieval
//!
//! Provides three retrieval modes:
//! - Vector search (semantic similarity via embeddings)
//! - BM25 search (lexical matching over already-fetched documents)
//! - Hybrid search (weighted RRF of both, followed by a rerank stage)

mod bm25;
mod fusion;
mod hybrid;
mod rerank;
mod vector;

pub use bm25::BM25Retriever;
pub use fusion::{FusionResult, RRFusion};
pub use hybrid::{HybridParams, HybridRetriever};
pub use rerank::RerankCompressor;
pub use vector::VectorRetriever;

use lexforge_common::errors::Result;
use lexforge_common::models::{Metadata, QueryResult};
use serde::{Deserialize, Serialize};

/// Retrieved document with relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Document text
    pub content: String,

    /// Metadata carried over from the store
    pub metadata: Metadata,

    /// Relevance score; meaning depends on `retrieval_mode`
    pub score: f32,

    /// Retrieval mode that produced the score
    pub retrieval_mode: RetrievalMode,
}

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Vector similarity search
    Vector,
    /// BM25 lexical search
    #[serde(rename = "bm25")]
    BM25,
    /// Combined hybrid search
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::BM25 => "bm25",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve up to `limit` documents for the query, best first
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>>;

    /// Get the retrieval mode
    fn mode(&self) -> RetrievalMode;
}

/// Convert ranked documents into the uniform result shape
pub fn into_query_result(documents: Vec<RetrievedDocument>) -> QueryResult {
    let mut result = QueryResult {
        documents: Vec::with_capacity(documents.len()),
        metadatas: Vec::with_capacity(documents.len()),
        distances: Some(Vec::with_capacity(documents.len())),
    };
    for doc in documents {
        result.documents.push(Some(doc.content));
        result.metadatas.push(doc.metadata);
        if let Some(d) = result.distances.as_mut() {
            d.push(doc.score);
        }
    }
    result
}
