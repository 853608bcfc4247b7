//! Hybrid search combining BM25 and vector retrieval with a rerank stage
//!
//! Pipeline per (collection, query):
//! 1. Build BM25 over the collection's already-fetched documents
//! 2. Run BM25 and vector retrieval concurrently, fuse with weighted RRF
//! 3. Rerank, apply the score cutoff, keep the best `k_reranker`
//! 4. Cut to `k` when `k < k_reranker`

use super::{
    into_query_result, BM25Retriever, RRFusion, RerankCompressor, RetrievalMode, RetrievedDocument,
    Retriever, VectorRetriever,
};
use lexforge_common::config::RetrievalConfig;
use lexforge_common::embeddings::Embedder;
use lexforge_common::errors::Result;
use lexforge_common::metrics;
use lexforge_common::models::{QueryResult, UserRef};
use lexforge_common::rerank::Reranker;
use lexforge_common::store::VectorStore;
use std::sync::Arc;
use std::time::Instant;

/// Result counts, cutoff and ensemble weight for hybrid search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridParams {
    /// Requested result count
    pub k: usize,
    /// Results kept by the rerank stage
    pub k_reranker: usize,
    /// Minimum rerank score; zero disables the cutoff
    pub relevance_threshold: f32,
    /// Lexical weight; `1 - w` goes to the vector retriever
    pub bm25_weight: f32,
}

impl From<&RetrievalConfig> for HybridParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            k: config.top_k,
            k_reranker: config.top_k_reranker,
            relevance_threshold: config.relevance_threshold,
            bm25_weight: config.hybrid_bm25_weight,
        }
    }
}

/// Hybrid retriever over one vector store
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    params: HybridParams,
    fusion: RRFusion,
    query_prefix: Option<String>,
    content_prefix: Option<String>,
}

impl HybridRetriever {
    /// Create a new hybrid retriever
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        params: HybridParams,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            params,
            fusion: RRFusion::default(),
            query_prefix: None,
            content_prefix: None,
        }
    }

    pub fn with_prefixes(mut self, query_prefix: Option<String>, content_prefix: Option<String>) -> Self {
        self.query_prefix = query_prefix;
        self.content_prefix = content_prefix;
        self
    }

    pub fn params(&self) -> HybridParams {
        self.params
    }

    /// Weighted ensemble of the lexical and vector retrievers, before reranking.
    ///
    /// `query_embedding` is used as-is when given; otherwise the query is embedded here.
    pub async fn ensemble(
        &self,
        collection: &str,
        collection_result: &QueryResult,
        query: &str,
        query_embedding: Option<&[f32]>,
        user: Option<&UserRef>,
    ) -> Result<Vec<RetrievedDocument>> {
        let k = self.params.k;
        let w = self.params.bm25_weight;

        let bm25 = BM25Retriever::from_result(collection_result);
        let vector = VectorRetriever::new(self.store.clone(), self.embedder.clone(), collection)
            .with_query_prefix(self.query_prefix.clone())
            .with_query_embedding(query_embedding.map(<[f32]>::to_vec))
            .with_user(user.cloned());

        let lists = if w <= 0.0 {
            vec![(1.0, vector.retrieve(query, k).await?)]
        } else if w >= 1.0 {
            vec![(1.0, bm25.retrieve(query, k).await?)]
        } else {
            let (bm25_results, vector_results) =
                tokio::join!(bm25.retrieve(query, k), vector.retrieve(query, k));
            vec![(w, bm25_results?), (1.0 - w, vector_results?)]
        };

        Ok(self
            .fusion
            .fuse(lists)
            .into_iter()
            .map(|r| r.document)
            .collect())
    }

    /// Full hybrid search for one (collection, query) pair
    pub async fn search(
        &self,
        collection: &str,
        collection_result: &QueryResult,
        query: &str,
        query_embedding: Option<&[f32]>,
        user: Option<&UserRef>,
    ) -> Result<QueryResult> {
        if collection_result.texts().next().is_none() {
            tracing::warn!(collection = %collection, "No documents for hybrid search");
            return Ok(QueryResult::empty());
        }

        let start = Instant::now();
        let fused = self
            .ensemble(collection, collection_result, query, query_embedding, user)
            .await?;

        let compressor = RerankCompressor::new(
            self.embedder.clone(),
            self.reranker.clone(),
            self.params.k_reranker,
            self.params.relevance_threshold,
        )
        .with_prefixes(self.query_prefix.clone(), self.content_prefix.clone())
        .with_query_embedding(query_embedding.map(<[f32]>::to_vec));
        let mut reranked = compressor.compress(query, fused, user).await?;

        // Re-sort explicitly before cutting to k
        if self.params.k < self.params.k_reranker {
            reranked.sort_by(|a, b| b.score.total_cmp(&a.score));
            reranked.truncate(self.params.k);
        }

        let result = into_query_result(reranked);
        metrics::record_search(
            start.elapsed().as_secs_f64(),
            RetrievalMode::Hybrid.as_str(),
            result.len(),
        );
        tracing::info!(
            collection = %collection,
            results = result.len(),
            "Hybrid search completed"
        );
        Ok(result)
    }
}
