//! Store contracts consumed by the retrieval core
//!
//! - [`VectorStore`]: per-collection similarity search and full reads
//! - [`PointStore`]: point-level search and paginated enumeration (scroll)
//!   for stores whose records carry feature payloads
//!
//! Collection lifecycle is not part of either contract.

mod memory;

pub use memory::{InMemoryVectorStore, StoredRecord};

use crate::errors::Result;
use crate::models::{PointId, QueryResult, RawPoint};
use async_trait::async_trait;

/// Vector/document store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Similarity search; distances are similarity scores, higher is better
    async fn search(&self, collection: &str, vectors: &[Vec<f32>], limit: usize) -> Result<QueryResult>;

    /// Every document in the collection, without distances
    async fn get(&self, collection: &str) -> Result<QueryResult>;
}

/// Read-only collection metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionInfo {
    pub vector_size: Option<usize>,
}

/// One scroll page request
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    pub limit: usize,
    pub offset: Option<PointId>,
    pub with_payload: bool,
    pub with_vectors: bool,
}

/// One scroll page; `next_offset` is `None` on the last page
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<RawPoint>,
    pub next_offset: Option<PointId>,
}

/// Point-level store
#[async_trait]
pub trait PointStore: Send + Sync {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo>;

    async fn search_points(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<RawPoint>>;

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage>;
}
