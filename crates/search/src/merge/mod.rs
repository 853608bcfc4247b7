//! Merge and dedup of parallel result sets
//!
//! Documents are keyed by the SHA-256 of their text. For each key the entry
//! with the strictly highest distance wins; the first one seen wins ties.
//! The merged list is ordered by distance descending, ties broken by the
//! order in which each retained key was first seen.

use lexforge_common::models::{Metadata, QueryResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Stable content hash of a document text
pub fn content_hash(document: &str) -> String {
    hex::encode(Sha256::digest(document.as_bytes()))
}

/// Combine scored results into one deduplicated top-`k` result.
///
/// Non-text documents and results without distances are ignored.
pub fn merge_and_sort_query_results(results: &[QueryResult], k: usize) -> QueryResult {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut combined: Vec<(f32, String, Metadata)> = Vec::new();

    for result in results {
        let Some(distances) = &result.distances else {
            continue;
        };
        for ((distance, document), metadata) in distances.iter().zip(&result.documents).zip(&result.metadatas) {
            let Some(document) = document else {
                continue;
            };
            let hash = content_hash(document);
            match positions.get(&hash) {
                Some(&pos) => {
                    if *distance > combined[pos].0 {
                        combined[pos] = (*distance, document.clone(), metadata.clone());
                    }
                }
                None => {
                    positions.insert(hash, combined.len());
                    combined.push((*distance, document.clone(), metadata.clone()));
                }
            }
        }
    }

    // Stable sort: ties keep first-seen order
    combined.sort_by(|a, b| b.0.total_cmp(&a.0));
    combined.truncate(k);

    let mut merged = QueryResult {
        documents: Vec::with_capacity(combined.len()),
        metadatas: Vec::with_capacity(combined.len()),
        distances: Some(Vec::with_capacity(combined.len())),
    };
    for (distance, document, metadata) in combined {
        merged.documents.push(Some(document));
        merged.metadatas.push(metadata);
        if let Some(d) = merged.distances.as_mut() {
            d.push(distance);
        }
    }
    merged
}

/// Concatenate full-collection reads in order, without dedup or scores
pub fn merge_get_results(results: Vec<QueryResult>) -> QueryResult {
    let mut merged = QueryResult::empty();
    for result in results {
        merged.documents.extend(result.documents);
        merged.metadatas.extend(result.metadatas);
    }
    merged
}
