//! Point shapes returned by point stores.
//!
//! Backends hand back hits and enumerated records in different shapes.
//! Everything is converted into [`ScoredPoint`] at the ingress boundary via
//! [`RawPoint::into_scored`] so the core only ever sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::Metadata;

/// Score assigned to records enumerated by scroll rather than ranked by search
pub const SCROLL_SENTINEL_SCORE: f32 = 1.0;

/// Point identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(Uuid),
    Name(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(u) => write!(f, "{}", u),
            PointId::Name(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PointId {
    fn from(n: u64) -> Self {
        PointId::Num(n)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        match Uuid::parse_str(s) {
            Ok(u) => PointId::Uuid(u),
            Err(_) => PointId::Name(s.to_string()),
        }
    }
}

/// Vector attached to a point: a single dense vector or named vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorData {
    Dense(Vec<f32>),
    Named(BTreeMap<String, Vec<f32>>),
}

impl VectorData {
    /// The dense vector, or the first non-empty named vector
    pub fn into_dense(self) -> Option<Vec<f32>> {
        match self {
            VectorData::Dense(v) if !v.is_empty() => Some(v),
            VectorData::Dense(_) => None,
            VectorData::Named(map) => map.into_values().find(|v| !v.is_empty()),
        }
    }
}

/// Point as handed back by a backend
#[derive(Debug, Clone)]
pub enum RawPoint {
    /// Ranked search hit
    Scored {
        id: PointId,
        payload: Option<Metadata>,
        vector: Option<VectorData>,
        score: f32,
    },
    /// Enumerated record without a score
    Record {
        id: PointId,
        payload: Option<Metadata>,
        vector: Option<VectorData>,
    },
    /// Loosely-typed mapping from a JSON backend
    Json(Value),
}

/// Canonical point shape used by the core
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: PointId,
    pub payload: Metadata,
    pub vector: Option<Vec<f32>>,
    pub score: f32,
}

impl RawPoint {
    /// Normalize into a [`ScoredPoint`]; points without an id are dropped
    pub fn into_scored(self, default_score: f32) -> Option<ScoredPoint> {
        let (id, payload, vector, score) = match self {
            RawPoint::Scored {
                id,
                payload,
                vector,
                score,
            } => (id, payload.unwrap_or_default(), vector, score),
            RawPoint::Record {
                id,
                payload,
                vector,
            } => (id, payload.unwrap_or_default(), vector, default_score),
            RawPoint::Json(value) => {
                let Value::Object(mut map) = value else {
                    return None;
                };
                let id = serde_json::from_value::<PointId>(map.remove("id")?).ok()?;
                let payload = match map.remove("payload") {
                    Some(Value::Object(p)) => p,
                    _ => Metadata::new(),
                };
                let vector = map
                    .remove("vector")
                    .and_then(|v| serde_json::from_value::<VectorData>(v).ok());
                let score = map
                    .get("score")
                    .and_then(Value::as_f64)
                    .map(|s| s as f32)
                    .unwrap_or(default_score);
                (id, payload, vector, score)
            }
        };

        let vector = vector
            .and_then(VectorData::into_dense)
            .or_else(|| payload_vector(&payload));

        Some(ScoredPoint {
            id,
            payload,
            vector,
            score,
        })
    }
}

fn payload_vector(payload: &Metadata) -> Option<Vec<f32>> {
    let value = payload.get("vector")?.clone();
    serde_json::from_value::<VectorData>(value)
        .ok()
        .and_then(VectorData::into_dense)
}
