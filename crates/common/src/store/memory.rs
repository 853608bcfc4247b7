//! In-memory store backing tests and the CLI

use super::{CollectionInfo, PointStore, ScrollPage, ScrollRequest, VectorStore};
use crate::errors::{AppError, Result};
use crate::models::{Metadata, PointId, QueryResult, RawPoint, VectorData};
use crate::vector;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// A stored document with its vector
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: PointId,
    pub text: Option<String>,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

#[derive(Debug, Default)]
struct Collection {
    vector_size: Option<usize>,
    records: Vec<StoredRecord>,
}

/// Cosine-ranked store keeping records in insertion order
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset the declared size of) a collection
    pub async fn create_collection(&self, name: &str, vector_size: Option<usize>) {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default().vector_size = vector_size;
    }

    /// Append records, replacing any with the same id
    pub async fn upsert(&self, name: &str, records: Vec<StoredRecord>) {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(name.to_string()).or_default();
        for record in records {
            match collection.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => collection.records.push(record),
            }
        }
    }

    fn not_found(name: &str) -> AppError {
        AppError::CollectionNotFound {
            name: name.to_string(),
        }
    }

    /// Records ranked by best cosine score across `vectors`, top `limit`
    fn rank<'a>(records: &'a [StoredRecord], vectors: &[Vec<f32>], limit: usize) -> Vec<(&'a StoredRecord, f32)> {
        let candidates: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        let mut best = vec![f32::NEG_INFINITY; records.len()];
        for query in vectors {
            for (b, s) in best.iter_mut().zip(vector::cosine_scores(&candidates, query)) {
                *b = b.max(s);
            }
        }
        let mut ranked: Vec<(&StoredRecord, f32)> = records.iter().zip(best).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, collection: &str, vectors: &[Vec<f32>], limit: usize) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let records = &collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?
            .records;
        if vectors.is_empty() {
            return Ok(QueryResult::empty());
        }

        let ranked = Self::rank(records, vectors, limit);
        QueryResult::from_parts(
            ranked.iter().map(|(r, _)| r.text.clone()).collect(),
            ranked.iter().map(|(r, _)| r.metadata.clone()).collect(),
            Some(ranked.iter().map(|(_, s)| *s).collect()),
        )
    }

    async fn get(&self, collection: &str) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let records = &collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?
            .records;
        QueryResult::from_parts(
            records.iter().map(|r| r.text.clone()).collect(),
            records.iter().map(|r| r.metadata.clone()).collect(),
            None,
        )
    }
}

#[async_trait]
impl PointStore for InMemoryVectorStore {
    async fn collection_info(&self, collection: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read().await;
        let c = collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(CollectionInfo {
            vector_size: c.vector_size,
        })
    }

    async fn search_points(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<RawPoint>> {
        let collections = self.collections.read().await;
        let records = &collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?
            .records;

        Ok(Self::rank(records, &[vector.to_vec()], limit)
            .into_iter()
            .map(|(r, score)| RawPoint::Scored {
                id: r.id.clone(),
                payload: Some(r.metadata.clone()),
                vector: with_vectors.then(|| VectorData::Dense(r.vector.clone())),
                score,
            })
            .collect())
    }

    async fn scroll(&self, collection: &str, request: ScrollRequest) -> Result<ScrollPage> {
        let collections = self.collections.read().await;
        let records = &collections
            .get(collection)
            .ok_or_else(|| Self::not_found(collection))?
            .records;

        let start = match &request.offset {
            Some(offset) => records.iter().position(|r| &r.id == offset).unwrap_or(records.len()),
            None => 0,
        };
        let end = (start + request.limit).min(records.len());

        let points = records[start..end]
            .iter()
            .map(|r| RawPoint::Record {
                id: r.id.clone(),
                payload: request.with_payload.then(|| r.metadata.clone()),
                vector: request.with_vectors.then(|| VectorData::Dense(r.vector.clone())),
            })
            .collect();

        Ok(ScrollPage {
            points,
            next_offset: records.get(end).map(|r| r.id.clone()),
        })
    }
}
