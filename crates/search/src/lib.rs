//! LexForge retrieval core
//!
//! Multi-collection retrieval and ranking:
//! - Concurrent fan-out of (collection, query) searches with per-task isolation
//! - Hybrid BM25 + vector retrieval with RRF fusion and a rerank stage
//! - Content-hash merge and dedup of parallel result sets
//! - Legal feature extraction with an aggregated feature vector
//! - Source aggregation over an ordered strategy chain

pub mod fanout;
pub mod legal;
pub mod merge;
pub mod retrieval;
pub mod sources;

#[cfg(test)]
mod test_support;

pub use fanout::{FanOut, FanOutReport, FanOutTask};
pub use legal::{LegalEvidence, LegalFeatureRetriever, LegalStoreState};
pub use merge::{merge_and_sort_query_results, merge_get_results};
pub use retrieval::{HybridParams, HybridRetriever, RetrievalMode, RetrievedDocument, Retriever};
pub use sources::{SearchStrategy, SourceAggregator, SourceRequest, SourceTarget};
