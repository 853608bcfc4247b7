//! Request-scoped value types shared by every retrieval path

pub mod point;

pub use point::{PointId, RawPoint, ScoredPoint, VectorData, SCROLL_SENTINEL_SCORE};

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Arbitrary document metadata
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Uniform shape produced by every retrieval path.
///
/// `documents`, `metadatas` and `distances` (when present) are positionally
/// aligned. A `None` document marks a non-text payload that merge ignores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub documents: Vec<Option<String>>,
    pub metadatas: Vec<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<f32>>,
}

impl QueryResult {
    /// Empty result, the valid "nothing found" outcome
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a scored result from text documents
    pub fn new(documents: Vec<String>, metadatas: Vec<Metadata>, distances: Vec<f32>) -> Result<Self> {
        Self::from_parts(
            documents.into_iter().map(Some).collect(),
            metadatas,
            Some(distances),
        )
    }

    /// Build a result, rejecting misaligned parts
    pub fn from_parts(
        documents: Vec<Option<String>>,
        metadatas: Vec<Metadata>,
        distances: Option<Vec<f32>>,
    ) -> Result<Self> {
        if documents.len() != metadatas.len() {
            return Err(AppError::InvalidFormat {
                message: format!(
                    "{} documents but {} metadatas",
                    documents.len(),
                    metadatas.len()
                ),
            });
        }
        if let Some(d) = &distances {
            if d.len() != documents.len() {
                return Err(AppError::InvalidFormat {
                    message: format!("{} documents but {} distances", documents.len(), d.len()),
                });
            }
        }
        Ok(Self {
            documents,
            metadatas,
            distances,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Text documents, skipping non-text entries
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().filter_map(|d| d.as_deref())
    }
}

/// Identity of a context's origin. Extra keys are flattened into the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Metadata,
}

impl SourceDescriptor {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name: name.into(),
            extra: Metadata::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// A single retrievable unit exposed to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub source: SourceDescriptor,
    pub document: Vec<Option<String>>,
    pub metadata: Vec<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<f32>>,
}

impl Context {
    /// Wrap an assembled result under its source descriptor
    pub fn from_result(source: SourceDescriptor, result: QueryResult) -> Self {
        Self {
            source,
            document: result.documents,
            metadata: result.metadatas,
            distances: result.distances,
        }
    }
}

/// Caller identity, forwarded to providers when enabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}
