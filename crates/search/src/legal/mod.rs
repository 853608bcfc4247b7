//! Legal feature subsystem
//!
//! Pulls feature-level evidence (verdict, legal reasoning, evidence items,
//! sentence, ...) out of a dedicated point store. Each extracted feature
//! becomes its own context, and the vectors behind those contexts are
//! averaged into one aggregated feature vector that later re-ranks the
//! regular sources.
//!
//! Retrieval here never fails the request: store and embedding errors
//! degrade to fewer (or zero) legal contexts.

pub mod cache;
pub mod extract;
pub mod features;

pub use cache::LegalStoreState;
pub use extract::{PayloadFields, LEGAL_SOURCE_TYPE};
pub use features::{expand_queries, normalize_text, FeatureAliasMap};

use extract::{extract_features, FeatureHit};
use futures::future::join_all;
use lexforge_common::config::{EmbeddingConfig, LegalConfig};
use lexforge_common::embeddings::Embedder;
use lexforge_common::metrics;
use lexforge_common::models::{Context, ScoredPoint, UserRef, SCROLL_SENTINEL_SCORE};
use lexforge_common::store::ScrollRequest;
use lexforge_common::vector::{align, align_normalized, average, normalize};
use std::collections::HashSet;
use std::sync::Arc;

/// Legal contexts plus the vector summarizing them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegalEvidence {
    pub contexts: Vec<Context>,
    /// Unit-length mean of the context vectors; empty when none were available
    pub aggregated_vector: Vec<f32>,
    /// Canonical features detected in the queries
    pub features: Vec<String>,
}

impl LegalEvidence {
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

pub struct LegalFeatureRetriever {
    state: Arc<LegalStoreState>,
    embedder: Arc<dyn Embedder>,
    fields: PayloadFields,
    scroll_page_size: usize,
    query_prefix: Option<String>,
    content_prefix: Option<String>,
}

impl LegalFeatureRetriever {
    pub fn new(
        state: Arc<LegalStoreState>,
        embedder: Arc<dyn Embedder>,
        legal: &LegalConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            state,
            embedder,
            fields: PayloadFields::from(legal),
            scroll_page_size: legal.scroll_page_size.max(1),
            query_prefix: embedding.query_prefix.clone(),
            content_prefix: embedding.content_prefix.clone(),
        }
    }

    pub fn state(&self) -> &Arc<LegalStoreState> {
        &self.state
    }

    /// Collect up to `max_results` legal feature contexts for `queries`
    pub async fn retrieve(&self, queries: &[String], max_results: usize, user: Option<&UserRef>) -> LegalEvidence {
        if queries.is_empty() || max_results == 0 {
            return LegalEvidence::default();
        }

        let expected = self.state.vector_size().await;
        let aliases = self.state.aliases().await;
        let features = aliases.detect(queries);
        let texts = expand_queries(queries, &features);
        tracing::debug!(features = ?features, texts = texts.len(), "Legal feature queries expanded");

        let query_vectors = self.query_vectors(&texts, expected, user).await;
        let mut points = self.search(&query_vectors, max_results).await;
        if points.len() < max_results {
            let remaining = max_results - points.len();
            points.extend(self.scroll(remaining).await);
        }
        if points.is_empty() {
            return LegalEvidence {
                features,
                ..Default::default()
            };
        }

        // Stable: equal scores keep search hits ahead of scrolled records
        points.sort_by(|a, b| b.score.total_cmp(&a.score));

        let collection = self.state.collection();
        let mut contexts = Vec::new();
        let mut vectors = Vec::new();
        let mut seen_ids = HashSet::new();

        'points: for point in &points {
            if !seen_ids.insert(point.id.to_string()) {
                continue;
            }
            let point_vector = point
                .vector
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| align_normalized(v, expected));

            for (feature, content) in extract_features(&point.payload, &features, &aliases, &self.fields) {
                let vector = match &point_vector {
                    Some(v) => Some(v.clone()),
                    None => self.embed_content(&content, expected, user).await,
                };
                if let Some(v) = vector.filter(|v| !v.is_empty()) {
                    vectors.push(v);
                }

                contexts.push(
                    FeatureHit {
                        collection,
                        point_id: &point.id,
                        payload: &point.payload,
                        feature: &feature,
                        content: &content,
                        score: point.score,
                    }
                    .into_context(&self.fields),
                );
                if contexts.len() >= max_results {
                    break 'points;
                }
            }
        }

        let mut aggregated_vector = average(&vectors);
        if !aggregated_vector.is_empty() {
            aggregated_vector = align_normalized(&aggregated_vector, expected);
        }

        metrics::record_legal(contexts.len(), features.len());
        tracing::info!(
            collection = %collection,
            contexts = contexts.len(),
            features = features.len(),
            "Legal feature contexts collected"
        );
        LegalEvidence {
            contexts,
            aggregated_vector,
            features,
        }
    }

    /// Embed every search text once; vectors are aligned and unit length
    async fn query_vectors(&self, texts: &[String], expected: Option<usize>, user: Option<&UserRef>) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let embeddings = match self
            .embedder
            .embed_batch(texts, self.query_prefix.as_deref(), user)
            .await
        {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to encode legal feature queries");
                return Vec::new();
            }
        };

        embeddings
            .into_iter()
            .filter(|v| !v.is_empty())
            .map(|v| self.fit(&v, expected))
            .collect()
    }

    async fn embed_content(&self, content: &str, expected: Option<usize>, user: Option<&UserRef>) -> Option<Vec<f32>> {
        match self.embedder.embed(content, self.content_prefix.as_deref(), user).await {
            Ok(v) if !v.is_empty() => Some(self.fit(&v, expected)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to embed legal context content");
                None
            }
        }
    }

    fn fit(&self, v: &[f32], expected: Option<usize>) -> Vec<f32> {
        if let Some(size) = expected {
            if v.len() != size {
                self.state.mismatch_reporter().report(v.len(), size, self.state.collection());
                return normalize(&align(v, expected));
            }
        }
        normalize(v)
    }

    /// One similarity search per query vector; failed searches are skipped
    async fn search(&self, vectors: &[Vec<f32>], limit: usize) -> Vec<ScoredPoint> {
        let store = self.state.store();
        let collection = self.state.collection();
        let searches = vectors
            .iter()
            .map(|v| store.search_points(collection, v, limit, true));

        let mut points = Vec::new();
        for result in join_all(searches).await {
            match result {
                Ok(raw) => points.extend(raw.into_iter().filter_map(|p| p.into_scored(0.0))),
                Err(e) => tracing::debug!(collection = %collection, error = %e, "Legal feature vector search failed"),
            }
        }
        points
    }

    /// Enumerate up to `limit` records, page by page
    async fn scroll(&self, limit: usize) -> Vec<ScoredPoint> {
        let store = self.state.store();
        let collection = self.state.collection();
        let mut points = Vec::new();
        let mut offset = None;

        while points.len() < limit {
            let request = ScrollRequest {
                limit: self.scroll_page_size.min(limit - points.len()),
                offset: offset.take(),
                with_payload: true,
                with_vectors: false,
            };
            let page = match store.scroll(collection, request).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(collection = %collection, error = %e, "Legal feature scroll failed");
                    break;
                }
            };
            if page.points.is_empty() {
                break;
            }
            for raw in page.points {
                if let Some(point) = raw.into_scored(SCROLL_SENTINEL_SCORE) {
                    points.push(point);
                    if points.len() >= limit {
                        break;
                    }
                }
            }
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        points
    }
}
