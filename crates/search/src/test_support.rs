//! Test doubles shared by the unit tests

use async_trait::async_trait;
use lexforge_common::embeddings::Embedder;
use lexforge_common::errors::{AppError, Result};
use lexforge_common::models::{Metadata, PointId, QueryResult, RawPoint, UserRef};
use lexforge_common::store::{CollectionInfo, InMemoryVectorStore, PointStore, ScrollPage, ScrollRequest, StoredRecord, VectorStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Embedder returning fixed vectors per text
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
    embedded: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            fail: false,
            calls: AtomicUsize::new(0),
            embedded: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Number of embed calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded across all calls
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed_batch(&self, texts: &[String], _prefix: Option<&str>, _user: Option<&UserRef>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::EmbeddingError {
                message: "provider offline".into(),
            });
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect())
    }

    fn model_name(&self) -> &str {
        "static"
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }
}

/// Wraps the in-memory store and fails every call for selected collections
pub struct FlakyStore {
    pub inner: InMemoryVectorStore,
    broken: HashSet<String>,
    pub searches: AtomicUsize,
    pub gets: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryVectorStore) -> Self {
        Self {
            inner,
            broken: HashSet::new(),
            searches: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }

    pub fn breaking(mut self, collection: &str) -> Self {
        self.broken.insert(collection.to_string());
        self
    }

    fn check(&self, collection: &str) -> Result<()> {
        if self.broken.contains(collection) {
            return Err(AppError::Store {
                collection: collection.to_string(),
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn search(&self, collection: &str, vectors: &[Vec<f32>], limit: usize) -> Result<QueryResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.check(collection)?;
        self.inner.search(collection, vectors, limit).await
    }

    async fn get(&self, collection: &str) -> Result<QueryResult> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(collection)?;
        self.inner.get(collection).await
    }
}

#[async_trait]
impl PointStore for FlakyStore {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        self.check(collection)?;
        self.inner.collection_info(collection).await
    }

    async fn search_points(&self, collection: &str, vector: &[f32], limit: usize, with_vectors: bool) -> Result<Vec<RawPoint>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.check(collection)?;
        self.inner.search_points(collection, vector, limit, with_vectors).await
    }

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage> {
        self.check(collection)?;
        self.inner.scroll(collection, request).await
    }
}

/// Record with `name` metadata
pub fn record(id: u64, text: &str, vector: Vec<f32>) -> StoredRecord {
    let mut metadata = Metadata::new();
    metadata.insert("name".into(), serde_json::json!(text));
    StoredRecord {
        id: PointId::Num(id),
        text: Some(text.to_string()),
        metadata,
        vector,
    }
}

/// Store with one collection holding `(text, vector)` records
pub async fn store_with(collection: &str, docs: &[(&str, Vec<f32>)]) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    store
        .upsert(
            collection,
            docs.iter()
                .enumerate()
                .map(|(i, (t, v))| record(i as u64, t, v.clone()))
                .collect(),
        )
        .await;
    store
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
