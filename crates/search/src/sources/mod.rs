//! Source aggregation
//!
//! Turns a list of source requests plus the user's queries into the final
//! list of contexts: legal feature contexts first, then one context per
//! request that produced documents. Collection-backed requests go through
//! an ordered strategy chain; when the legal subsystem produced an
//! aggregated feature vector, every assembled result is re-ranked against it.

use crate::fanout::{FanOut, FanOutTask};
use crate::legal::{LegalEvidence, LegalFeatureRetriever};
use crate::merge::{merge_and_sort_query_results, merge_get_results};
use crate::retrieval::{HybridParams, HybridRetriever};
use lexforge_common::config::{AppConfig, RetrievalConfig};
use lexforge_common::embeddings::Embedder;
use lexforge_common::errors::Result;
use lexforge_common::models::{Context, Metadata, QueryResult, SourceDescriptor, UserRef};
use lexforge_common::rerank::Reranker;
use lexforge_common::store::VectorStore;
use lexforge_common::vector::cosine_scores;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Where a request's documents come from
#[derive(Debug, Clone)]
pub enum SourceTarget {
    /// Documents already assembled by the caller
    Direct(QueryResult),
    /// Collections to search
    Collections(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub source: SourceDescriptor,
    pub target: SourceTarget,
}

impl SourceRequest {
    pub fn direct(source: SourceDescriptor, result: QueryResult) -> Self {
        Self {
            source,
            target: SourceTarget::Direct(result),
        }
    }

    pub fn collections<I, S>(source: SourceDescriptor, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            target: SourceTarget::Collections(names.into_iter().map(Into::into).collect()),
        }
    }
}

/// One way of turning collections into a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    FullContext,
    Hybrid,
    Vector,
}

impl SearchStrategy {
    /// Strategies to try, in order, for the given settings
    pub fn chain(config: &RetrievalConfig) -> Vec<SearchStrategy> {
        if config.full_context {
            vec![SearchStrategy::FullContext]
        } else if config.hybrid_search {
            vec![SearchStrategy::Hybrid, SearchStrategy::Vector]
        } else {
            vec![SearchStrategy::Vector]
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::FullContext => "full_context",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Vector => "vector",
        }
    }
}

pub struct SourceAggregator {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    legal: Option<LegalFeatureRetriever>,
    config: AppConfig,
    fanout: FanOut,
}

impl SourceAggregator {
    pub fn new(config: AppConfig, store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        let fanout = FanOut::new(config.retrieval.max_concurrency, config.task_timeout());
        Self {
            store,
            embedder,
            reranker: None,
            legal: None,
            config,
            fanout,
        }
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_legal(mut self, legal: Option<LegalFeatureRetriever>) -> Self {
        self.legal = legal;
        self
    }

    fn query_prefix(&self) -> Option<&str> {
        self.config.embedding.query_prefix.as_deref()
    }

    fn content_prefix(&self) -> Option<&str> {
        self.config.embedding.content_prefix.as_deref()
    }

    /// Vector search of every (query, collection) pair, merged to the top `k`.
    ///
    /// Queries are embedded once up front. Failed pairs are dropped; if every
    /// pair fails the result is empty.
    pub async fn query_collection(
        &self,
        collections: &[String],
        queries: &[String],
        k: usize,
        user: Option<&UserRef>,
    ) -> Result<QueryResult> {
        let embeddings = self.embedder.embed_batch(queries, self.query_prefix(), user).await?;
        tracing::debug!(
            queries = queries.len(),
            collections = collections.len(),
            "Querying collections"
        );

        let mut tasks = Vec::with_capacity(embeddings.len() * collections.len());
        for (qi, embedding) in embeddings.into_iter().enumerate() {
            let embedding = Arc::new(embedding);
            for collection in collections.iter().filter(|c| !c.is_empty()) {
                let store = self.store.clone();
                let collection = collection.clone();
                let embedding = embedding.clone();
                tasks.push(FanOutTask::new(format!("{}#q{}", collection, qi), async move {
                    store
                        .search(&collection, std::slice::from_ref(embedding.as_ref()), k)
                        .await
                        .map(Some)
                }));
            }
        }

        let results = match self.fanout.run("query_collection", tasks).await.into_result("query_collection") {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "All collection queries failed. No results returned");
                Vec::new()
            }
        };
        Ok(merge_and_sort_query_results(&results, k))
    }

    /// Hybrid search of every (collection, query) pair, merged to the top `k`.
    ///
    /// Collections are read sequentially first; a collection that cannot be
    /// read is skipped. Queries are embedded once up front unless the search
    /// is purely lexical with a reranker. Fails when that embedding call fails
    /// or when every search task fails.
    pub async fn query_collection_with_hybrid_search(
        &self,
        collections: &[String],
        queries: &[String],
        user: Option<&UserRef>,
    ) -> Result<QueryResult> {
        let params = HybridParams::from(&self.config.retrieval);
        let mut fetched: Vec<(String, Arc<QueryResult>)> = Vec::new();
        for collection in collections.iter().filter(|c| !c.is_empty()) {
            match self.store.get(collection).await {
                Ok(result) => fetched.push((collection.clone(), Arc::new(result))),
                Err(e) => tracing::error!(collection = %collection, error = %e, "Failed to fetch collection"),
            }
        }

        tracing::info!(
            queries = queries.len(),
            collections = collections.len(),
            "Starting hybrid search"
        );

        let needs_query_embedding = params.bm25_weight < 1.0 || self.reranker.is_none();
        let embeddings: Vec<Option<Arc<Vec<f32>>>> = if needs_query_embedding && !fetched.is_empty() {
            self.embedder
                .embed_batch(queries, self.query_prefix(), user)
                .await?
                .into_iter()
                .map(|e| Some(Arc::new(e)))
                .collect()
        } else {
            vec![None; queries.len()]
        };

        let retriever = Arc::new(
            HybridRetriever::new(self.store.clone(), self.embedder.clone(), self.reranker.clone(), params)
                .with_prefixes(
                    self.query_prefix().map(str::to_string),
                    self.content_prefix().map(str::to_string),
                ),
        );

        let mut tasks = Vec::new();
        for (collection, collection_result) in &fetched {
            for (query, embedding) in queries.iter().zip(&embeddings) {
                let retriever = retriever.clone();
                let collection = collection.clone();
                let collection_result = collection_result.clone();
                let query = query.clone();
                let embedding = embedding.clone();
                let user = user.cloned();
                tasks.push(FanOutTask::new(format!("{}:{}", collection, query), async move {
                    retriever
                        .search(
                            &collection,
                            &collection_result,
                            &query,
                            embedding.as_deref().map(Vec::as_slice),
                            user.as_ref(),
                        )
                        .await
                        .map(Some)
                }));
            }
        }

        let results = self
            .fanout
            .run("hybrid_search", tasks)
            .await
            .into_result("hybrid_search")?;
        Ok(merge_and_sort_query_results(&results, params.k))
    }

    /// Every document of every collection, concatenated; unreadable collections are skipped
    pub async fn get_all_items_from_collections(&self, collections: &[String]) -> QueryResult {
        let mut results = Vec::new();
        for collection in collections.iter().filter(|c| !c.is_empty()) {
            match self.store.get(collection).await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(collection = %collection, error = %e, "Error when reading the collection"),
            }
        }
        merge_get_results(results)
    }

    /// Try each configured strategy until one yields documents
    async fn search_collections(
        &self,
        collections: &[String],
        queries: &[String],
        user: Option<&UserRef>,
    ) -> Option<QueryResult> {
        for strategy in SearchStrategy::chain(&self.config.retrieval) {
            let outcome = match strategy {
                SearchStrategy::FullContext => Ok(self.get_all_items_from_collections(collections).await),
                SearchStrategy::Hybrid => self.query_collection_with_hybrid_search(collections, queries, user).await,
                SearchStrategy::Vector => {
                    self.query_collection(collections, queries, self.config.retrieval.top_k, user)
                        .await
                }
            };
            match outcome {
                Ok(result) if !result.is_empty() => return Some(result),
                Ok(_) => tracing::debug!(strategy = strategy.as_str(), "Strategy returned no documents"),
                Err(e) => tracing::warn!(strategy = strategy.as_str(), error = %e, "Strategy failed, trying next"),
            }
        }
        None
    }

    /// Re-rank `result` by cosine similarity to `reference`, overwriting its scores.
    ///
    /// Non-text documents score zero. Returns false when the result was left
    /// untouched (nothing to embed, or the embedding call failed).
    pub async fn rerank_by_feature_vector(
        &self,
        result: &mut QueryResult,
        reference: &[f32],
        k: usize,
        user: Option<&UserRef>,
    ) -> bool {
        let texts: Vec<String> = result.texts().map(str::to_string).collect();
        if texts.is_empty() || reference.is_empty() {
            return false;
        }
        let embeddings = match self.embedder.embed_batch(&texts, self.content_prefix(), user).await {
            Ok(e) if e.len() == texts.len() => e,
            Ok(e) => {
                tracing::debug!(expected = texts.len(), got = e.len(), "Embedding count mismatch while re-ranking");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to embed documents for re-ranking");
                return false;
            }
        };
        let mut text_scores = cosine_scores(&embeddings, reference).into_iter();

        let metadata_at = |i: usize| -> Metadata {
            result
                .metadatas
                .get(i)
                .or_else(|| result.metadatas.last())
                .cloned()
                .unwrap_or_default()
        };
        let mut combined: Vec<(f32, Option<String>, Metadata)> = result
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let score = match doc {
                    Some(_) => text_scores.next().unwrap_or(0.0),
                    None => 0.0,
                };
                (score, doc.clone(), metadata_at(i))
            })
            .collect();

        combined.sort_by(|a, b| b.0.total_cmp(&a.0));
        if k > 0 {
            combined.truncate(k);
        }

        let mut documents = Vec::with_capacity(combined.len());
        let mut metadatas = Vec::with_capacity(combined.len());
        let mut distances = Vec::with_capacity(combined.len());
        for (score, document, metadata) in combined {
            distances.push(score);
            documents.push(document);
            metadatas.push(metadata);
        }
        *result = QueryResult {
            documents,
            metadatas,
            distances: Some(distances),
        };
        true
    }

    async fn legal_evidence(&self, queries: &[String], user: Option<&UserRef>) -> LegalEvidence {
        match &self.legal {
            Some(legal) => {
                let max_results = self.config.legal_max_results(self.config.retrieval.top_k);
                legal.retrieve(queries, max_results, user).await
            }
            None => LegalEvidence::default(),
        }
    }

    /// Assemble the contexts for `requests`
    pub async fn get_sources(
        &self,
        requests: Vec<SourceRequest>,
        queries: &[String],
        user: Option<&UserRef>,
    ) -> Vec<Context> {
        let start = Instant::now();
        let mut extracted: HashSet<String> = HashSet::new();
        let mut assembled: Vec<(SourceDescriptor, QueryResult)> = Vec::new();

        for SourceRequest { source, target } in requests {
            let result = match target {
                SourceTarget::Direct(result) => Some(result),
                SourceTarget::Collections(names) => {
                    let mut pending = Vec::new();
                    for name in names {
                        if !extracted.contains(&name) && !pending.contains(&name) {
                            pending.push(name);
                        }
                    }
                    if pending.is_empty() {
                        tracing::debug!(source = %source.id, "Skipping source, collections already extracted");
                        continue;
                    }
                    let result = self.search_collections(&pending, queries, user).await;
                    extracted.extend(pending);
                    result
                }
            };
            match result {
                Some(result) if !result.is_empty() => assembled.push((source, result)),
                _ => tracing::debug!(source = %source.id, "Source produced no documents"),
            }
        }

        let evidence = self.legal_evidence(queries, user).await;
        if !evidence.aggregated_vector.is_empty() {
            let k = self.config.retrieval.top_k;
            for (_, result) in assembled.iter_mut() {
                self.rerank_by_feature_vector(result, &evidence.aggregated_vector, k, user)
                    .await;
            }
        }

        let mut contexts = evidence.contexts;
        let legal_count = contexts.len();
        contexts.extend(
            assembled
                .into_iter()
                .map(|(source, result)| Context::from_result(source, result)),
        );

        let per_type = contexts.iter().fold(HashMap::new(), |mut acc: HashMap<&str, usize>, c| {
            *acc.entry(c.source.kind.as_str()).or_default() += 1;
            acc
        });
        tracing::info!(
            contexts = contexts.len(),
            legal = legal_count,
            types = ?per_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sources assembled"
        );
        contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::LegalStoreState;
    use crate::test_support::{record, shared, store_with, FlakyStore, StaticEmbedder};
    use lexforge_common::errors::AppError;
    use lexforge_common::models::PointId;
    use lexforge_common::store::{InMemoryVectorStore, StoredRecord};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Scores every pair the same, or fails every call
    struct FixedReranker {
        score: Option<f32>,
    }

    impl FixedReranker {
        fn scoring(score: f32) -> Self {
            Self { score: Some(score) }
        }

        fn failing() -> Self {
            Self { score: None }
        }
    }

    #[async_trait::async_trait]
    impl Reranker for FixedReranker {
        async fn score(&self, pairs: &[(String, String)], _user: Option<&UserRef>) -> Result<Vec<f32>> {
            match self.score {
                Some(score) => Ok(vec![score; pairs.len()]),
                None => Err(AppError::RerankError {
                    message: "reranker offline".into(),
                }),
            }
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn file(id: &str) -> SourceDescriptor {
        SourceDescriptor::new("file", id, id)
    }

    async fn two_collections() -> InMemoryVectorStore {
        let store = store_with("a", &[("shared text", vec![1.0, 0.0]), ("only a", vec![0.6, 0.8])]).await;
        store
            .upsert("b", vec![record(0, "shared text", vec![1.0, 0.0]), record(1, "only b", vec![0.0, 1.0])])
            .await;
        store
    }

    fn config(k: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.retrieval.top_k = k;
        config.retrieval.top_k_reranker = k;
        config
    }

    #[tokio::test]
    async fn test_query_collection_embeds_once_and_dedups() {
        let embedder = shared(StaticEmbedder::new(vec![1.0, 0.0]));
        let agg = SourceAggregator::new(config(5), shared(two_collections().await), embedder.clone());
        let result = agg
            .query_collection(&names(&["a", "b"]), &names(&["q1", "q2"]), 5, None)
            .await
            .unwrap();

        assert_eq!(embedder.calls(), 1);
        assert_eq!(result.len(), 3);
        assert_eq!(result.documents[0].as_deref(), Some("shared text"));
        let distances = result.distances.unwrap();
        assert!(distances.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_query_collection_tolerates_broken_collection() {
        let store = FlakyStore::new(two_collections().await).breaking("b");
        let agg = SourceAggregator::new(config(5), shared(store), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        let result = agg.query_collection(&names(&["a", "b"]), &names(&["q"]), 5, None).await.unwrap();
        assert_eq!(result.texts().collect::<Vec<_>>(), vec!["shared text", "only a"]);
    }

    #[tokio::test]
    async fn test_query_collection_all_failed_is_empty() {
        let store = FlakyStore::new(two_collections().await).breaking("a").breaking("b");
        let agg = SourceAggregator::new(config(5), shared(store), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        let result = agg.query_collection(&names(&["a", "b"]), &names(&["q"]), 5, None).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_skips_unreadable_collection() {
        let store = shared(FlakyStore::new(two_collections().await).breaking("b"));
        let agg = SourceAggregator::new(config(5), store.clone(), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        let result = agg
            .query_collection_with_hybrid_search(&names(&["a", "b"]), &names(&["shared"]), None)
            .await
            .unwrap();
        assert!(result.texts().all(|t| t != "only b"));
        assert!(!result.is_empty());
        // One read per collection, one vector search for the single healthy pair
        assert_eq!(store.gets.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.searches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hybrid_total_failure_escalates() {
        let agg = SourceAggregator::new(config(5), shared(two_collections().await), shared(StaticEmbedder::new(vec![1.0, 0.0])))
            .with_reranker(Some(Arc::new(FixedReranker::failing())));
        let err = agg
            .query_collection_with_hybrid_search(&names(&["a", "b"]), &names(&["q"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AllTasksFailed { failed: 2, .. }));
    }

    #[tokio::test]
    async fn test_hybrid_query_embedding_failure_skips_search() {
        let store = shared(FlakyStore::new(two_collections().await));
        let agg = SourceAggregator::new(config(5), store.clone(), shared(StaticEmbedder::failing()));
        let err = agg
            .query_collection_with_hybrid_search(&names(&["a", "b"]), &names(&["q"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmbeddingError { .. }));
        assert_eq!(store.searches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hybrid_embeds_queries_once() {
        let embedder = shared(StaticEmbedder::new(vec![1.0, 0.0]));
        let agg = SourceAggregator::new(config(5), shared(two_collections().await), embedder.clone())
            .with_reranker(Some(Arc::new(FixedReranker::scoring(0.5))));
        let result = agg
            .query_collection_with_hybrid_search(&names(&["a", "b", ""]), &names(&["q1", "q2"]), None)
            .await
            .unwrap();
        assert!(!result.is_empty());
        // Four (collection, query) tasks share one embedding call for both queries
        assert_eq!(embedder.calls(), 1);
        assert_eq!(embedder.embedded(), 2);
    }

    #[tokio::test]
    async fn test_hybrid_skips_empty_collection_names() {
        let store = shared(FlakyStore::new(two_collections().await));
        let agg = SourceAggregator::new(config(5), store.clone(), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        agg.query_collection_with_hybrid_search(&names(&["", "a"]), &names(&["q"]), None)
            .await
            .unwrap();
        assert_eq!(store.gets.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_strategy_chain() {
        let mut retrieval = RetrievalConfig::default();
        assert_eq!(SearchStrategy::chain(&retrieval), vec![SearchStrategy::Vector]);
        retrieval.hybrid_search = true;
        assert_eq!(
            SearchStrategy::chain(&retrieval),
            vec![SearchStrategy::Hybrid, SearchStrategy::Vector]
        );
        retrieval.full_context = true;
        assert_eq!(SearchStrategy::chain(&retrieval), vec![SearchStrategy::FullContext]);
    }

    #[tokio::test]
    async fn test_rerank_overwrites_scores() {
        let embedder = StaticEmbedder::new(vec![0.0, 1.0])
            .with("near", vec![1.0, 0.0])
            .with("far", vec![0.0, 1.0]);
        let agg = SourceAggregator::new(config(5), shared(InMemoryVectorStore::new()), shared(embedder));
        let mut meta = Metadata::new();
        meta.insert("name".into(), json!("only"));
        let mut result = QueryResult {
            documents: vec![Some("far".into()), None, Some("near".into())],
            metadatas: vec![meta.clone()],
            distances: Some(vec![0.9, 0.5, 0.1]),
        };

        assert!(agg.rerank_by_feature_vector(&mut result, &[1.0, 0.0], 2, None).await);
        assert_eq!(result.documents, vec![Some("near".to_string()), Some("far".to_string())]);
        assert_eq!(result.distances, Some(vec![1.0, 0.0]));
        // Short metadata lists reuse the last entry
        assert_eq!(result.metadatas, vec![meta.clone(), meta]);
    }

    #[tokio::test]
    async fn test_rerank_embedding_failure_leaves_result() {
        let agg = SourceAggregator::new(config(5), shared(InMemoryVectorStore::new()), shared(StaticEmbedder::failing()));
        let mut result = QueryResult::new(names(&["x"]), vec![Metadata::new()], vec![0.3]).unwrap();
        let before = result.clone();
        assert!(!agg.rerank_by_feature_vector(&mut result, &[1.0], 5, None).await);
        assert_eq!(result, before);
    }

    #[tokio::test]
    async fn test_get_sources_skips_extracted_and_empty() {
        let agg = SourceAggregator::new(config(5), shared(two_collections().await), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        let direct = QueryResult::from_parts(vec![Some("inline".into())], vec![Metadata::new()], None).unwrap();
        let contexts = agg
            .get_sources(
                vec![
                    SourceRequest::direct(file("note"), direct),
                    SourceRequest::collections(file("kb"), ["a", "b"]),
                    SourceRequest::collections(file("again"), ["b"]),
                    SourceRequest::direct(file("blank"), QueryResult::empty()),
                ],
                &names(&["q"]),
                None,
            )
            .await;

        let ids: Vec<&str> = contexts.iter().map(|c| c.source.id.as_str()).collect();
        assert_eq!(ids, vec!["note", "kb"]);
        assert!(contexts[0].distances.is_none());
        assert_eq!(contexts[1].document.len(), 3);
    }

    #[tokio::test]
    async fn test_full_context_concatenates_collections() {
        let mut cfg = config(1);
        cfg.retrieval.full_context = true;
        let embedder = shared(StaticEmbedder::new(vec![1.0, 0.0]));
        let agg = SourceAggregator::new(cfg, shared(two_collections().await), embedder.clone());
        let contexts = agg
            .get_sources(vec![SourceRequest::collections(file("kb"), ["a", "b"])], &names(&["q"]), None)
            .await;
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].document.len(), 4);
        assert!(contexts[0].distances.is_none());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_vector() {
        let mut cfg = config(5);
        cfg.retrieval.hybrid_search = true;
        // Every hybrid task fails in the rerank stage; plain vector search still works
        let agg = SourceAggregator::new(cfg, shared(two_collections().await), shared(StaticEmbedder::new(vec![1.0, 0.0])))
            .with_reranker(Some(Arc::new(FixedReranker::failing())));
        let contexts = agg
            .get_sources(vec![SourceRequest::collections(file("kb"), ["a"])], &names(&["q"]), None)
            .await;

        assert_eq!(contexts.len(), 1);
        assert_eq!(
            contexts[0].document,
            vec![Some("shared text".to_string()), Some("only a".to_string())]
        );
        // Vector search distances, and no rerank score in the metadata
        let distances = contexts[0].distances.clone().unwrap();
        assert!((distances[0] - 1.0).abs() < 1e-6);
        assert!((distances[1] - 0.6).abs() < 1e-6);
        assert!(contexts[0].metadata.iter().all(|m| !m.contains_key("score")));
    }

    #[tokio::test]
    async fn test_hybrid_unreadable_collection_yields_nothing() {
        let mut cfg = config(5);
        cfg.retrieval.hybrid_search = true;
        let store = FlakyStore::new(two_collections().await).breaking("a");
        let agg = SourceAggregator::new(cfg, shared(store), shared(StaticEmbedder::new(vec![1.0, 0.0])));
        let contexts = agg
            .get_sources(vec![SourceRequest::collections(file("kb"), ["a"])], &names(&["q"]), None)
            .await;
        assert!(contexts.is_empty());
    }

    #[tokio::test]
    async fn test_legal_contexts_first_and_reranked() {
        let docs = two_collections().await;
        let legal = InMemoryVectorStore::new();
        legal.create_collection("legal", Some(2)).await;
        let mut payload = Metadata::new();
        payload.insert("amar_putusan".into(), json!("Menyatakan terdakwa bersalah"));
        legal
            .upsert(
                "legal",
                vec![StoredRecord {
                    id: PointId::Num(9),
                    text: None,
                    metadata: payload,
                    vector: vec![0.0, 1.0],
                }],
            )
            .await;

        let mut cfg = config(2);
        cfg.legal.collection = Some("legal".into());
        let embedder: Arc<dyn Embedder> = shared(
            StaticEmbedder::new(vec![1.0, 0.0])
                .with("only b", vec![0.0, 1.0])
                .with("Menyatakan terdakwa bersalah", vec![0.0, 1.0])
                .with("shared text", vec![1.0, 0.0]),
        );
        let state = LegalStoreState::from_config(shared(legal), &cfg.legal).unwrap();
        let legal = LegalFeatureRetriever::new(Arc::new(state), embedder.clone(), &cfg.legal, &cfg.embedding);
        let agg = SourceAggregator::new(cfg, shared(docs), embedder).with_legal(Some(legal));

        let contexts = agg
            .get_sources(vec![SourceRequest::collections(file("kb"), ["b"])], &names(&["amar putusan"]), None)
            .await;

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].source.kind, "legal_feature");
        // The aggregated legal vector [0, 1] now ranks "only b" first
        assert_eq!(contexts[1].document[0].as_deref(), Some("only b"));
        let distances = contexts[1].distances.clone().unwrap();
        assert!((distances[0] - 1.0).abs() < 1e-6);
    }
}
