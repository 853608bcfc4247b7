//! Vector similarity search against a collection in the vector store

use super::{RetrievalMode, RetrievedDocument, Retriever};
use lexforge_common::embeddings::Embedder;
use lexforge_common::errors::Result;
use lexforge_common::models::UserRef;
use lexforge_common::store::VectorStore;
use std::sync::Arc;

/// Vector retriever: embeds the query, then searches one collection
pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    query_prefix: Option<String>,
    query_embedding: Option<Vec<f32>>,
    user: Option<UserRef>,
}

impl VectorRetriever {
    /// Create a new vector retriever
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            query_prefix: None,
            query_embedding: None,
            user: None,
        }
    }

    pub fn with_query_prefix(mut self, prefix: Option<String>) -> Self {
        self.query_prefix = prefix;
        self
    }

    /// Search with an embedding computed by the caller instead of embedding the query text
    pub fn with_query_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.query_embedding = embedding;
        self
    }

    pub fn with_user(mut self, user: Option<UserRef>) -> Self {
        self.user = user;
        self
    }
}

#[async_trait::async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>> {
        let embedding = match &self.query_embedding {
            Some(embedding) => embedding.clone(),
            None => {
                self.embedder
                    .embed(query, self.query_prefix.as_deref(), self.user.as_ref())
                    .await?
            }
        };

        let result = self.store.search(&self.collection, &[embedding], limit).await?;

        tracing::debug!(
            collection = %self.collection,
            results = result.len(),
            "Vector search completed"
        );

        let distances = result.distances.unwrap_or_default();
        Ok(result
            .documents
            .into_iter()
            .zip(result.metadatas)
            .enumerate()
            .filter_map(|(idx, (doc, metadata))| {
                doc.map(|content| RetrievedDocument {
                    content,
                    metadata,
                    score: distances.get(idx).copied().unwrap_or(0.0),
                    retrieval_mode: RetrievalMode::Vector,
                })
            })
            .collect())
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Vector
    }
}
