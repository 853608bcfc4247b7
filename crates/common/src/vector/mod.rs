//! Vector math used by ranking and the legal feature subsystem.
//!
//! All functions are pure and never fail: degenerate inputs (empty or zero
//! vectors, mismatched lengths) produce well-defined neutral outputs.

use std::sync::atomic::{AtomicBool, Ordering};

/// L2-normalize `v`. Empty and zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Truncate or zero-pad `v` to `expected` elements.
///
/// `None` or `Some(0)` leaves the vector as is.
pub fn align(v: &[f32], expected: Option<usize>) -> Vec<f32> {
    match expected {
        Some(size) if size > 0 && !v.is_empty() && v.len() != size => {
            let mut out = v[..v.len().min(size)].to_vec();
            out.resize(size, 0.0);
            out
        }
        _ => v.to_vec(),
    }
}

/// Align then normalize, the form every vector takes before similarity search
pub fn align_normalized(v: &[f32], expected: Option<usize>) -> Vec<f32> {
    normalize(&align(v, expected))
}

/// Element-wise mean over vectors sharing the first vector's length.
///
/// Vectors of any other length are skipped.
pub fn average(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let len = first.len();
    let mut totals = vec![0.0f32; len];
    let mut count = 0usize;
    for v in vectors.iter().filter(|v| v.len() == len) {
        for (t, x) in totals.iter_mut().zip(v) {
            *t += x;
        }
        count += 1;
    }
    if count == 0 || len == 0 {
        return Vec::new();
    }
    totals.iter().map(|t| t / count as f32).collect()
}

/// Cosine similarity of each candidate against `reference`.
///
/// A candidate whose length differs from the reference (or that is empty)
/// scores 0.0. The output is always aligned with `vectors`.
pub fn cosine_scores(vectors: &[Vec<f32>], reference: &[f32]) -> Vec<f32> {
    let reference = normalize(reference);
    vectors
        .iter()
        .map(|v| {
            if v.is_empty() || v.len() != reference.len() {
                return 0.0;
            }
            normalize(v).iter().zip(&reference).map(|(a, b)| a * b).sum()
        })
        .collect()
}

/// Logs a dimension mismatch once per reporter
#[derive(Debug, Default)]
pub struct MismatchReporter {
    reported: AtomicBool,
}

impl MismatchReporter {
    pub const fn new() -> Self {
        Self {
            reported: AtomicBool::new(false),
        }
    }

    /// Report a mismatch; returns true only for the call that actually logged
    pub fn report(&self, got: usize, expected: usize, collection: &str) -> bool {
        if self.reported.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::warn!(
            got = got,
            expected = expected,
            collection = %collection,
            "Embedding dimension mismatch, applying automatic vector alignment"
        );
        true
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::Relaxed)
    }
}
