//! Rerank stage applied after ensemble retrieval

use super::RetrievedDocument;
use lexforge_common::embeddings::Embedder;
use lexforge_common::errors::{AppError, Result};
use lexforge_common::models::UserRef;
use lexforge_common::rerank::Reranker;
use lexforge_common::vector;
use std::sync::Arc;

/// Scores `(query, document)` pairs, drops documents under `r_score` and
/// keeps the best `top_n`.
///
/// Uses the reranker when configured, otherwise cosine similarity between
/// the query and document embeddings.
pub struct RerankCompressor {
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    top_n: usize,
    r_score: f32,
    query_prefix: Option<String>,
    content_prefix: Option<String>,
    query_embedding: Option<Vec<f32>>,
}

impl RerankCompressor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        top_n: usize,
        r_score: f32,
    ) -> Self {
        Self {
            embedder,
            reranker,
            top_n,
            r_score,
            query_prefix: None,
            content_prefix: None,
            query_embedding: None,
        }
    }

    pub fn with_prefixes(mut self, query_prefix: Option<String>, content_prefix: Option<String>) -> Self {
        self.query_prefix = query_prefix;
        self.content_prefix = content_prefix;
        self
    }

    /// Query embedding for the cosine fallback, computed by the caller
    pub fn with_query_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.query_embedding = embedding;
        self
    }

    async fn scores(&self, query: &str, documents: &[RetrievedDocument], user: Option<&UserRef>) -> Result<Vec<f32>> {
        match &self.reranker {
            Some(reranker) => {
                let pairs: Vec<(String, String)> = documents
                    .iter()
                    .map(|d| (query.to_string(), d.content.clone()))
                    .collect();
                reranker.score(&pairs, user).await
            }
            None => {
                let query_embedding = match &self.query_embedding {
                    Some(embedding) => embedding.clone(),
                    None => self.embedder.embed(query, self.query_prefix.as_deref(), user).await?,
                };
                let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
                let document_embeddings = self
                    .embedder
                    .embed_batch(&contents, self.content_prefix.as_deref(), user)
                    .await?;
                Ok(vector::cosine_scores(&document_embeddings, &query_embedding))
            }
        }
    }

    /// Rerank `documents` for `query`; the score is also written to `metadata["score"]`
    pub async fn compress(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>,
        user: Option<&UserRef>,
    ) -> Result<Vec<RetrievedDocument>> {
        if documents.is_empty() {
            return Ok(documents);
        }

        let scores = self.scores(query, &documents, user).await?;
        if scores.len() != documents.len() {
            return Err(AppError::RerankError {
                message: format!("{} scores for {} documents", scores.len(), documents.len()),
            });
        }

        let mut scored: Vec<(RetrievedDocument, f32)> = documents
            .into_iter()
            .zip(scores)
            .filter(|(_, s)| self.r_score == 0.0 || *s >= self.r_score)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(self.top_n);

        Ok(scored
            .into_iter()
            .map(|(mut doc, score)| {
                doc.score = score;
                doc.metadata.insert("score".to_string(), serde_json::json!(score));
                doc
            })
            .collect())
    }
}
