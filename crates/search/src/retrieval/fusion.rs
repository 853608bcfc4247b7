//! Weighted Reciprocal Rank Fusion (RRF) for combining ranked lists
//!
//! RRF is used instead of score averaging because lexical and vector
//! scores live on different scales:
//! - Each list contributes `weight / (k + rank)` per document (rank from 1)
//! - Documents are identified by their content
//! - Equal fused scores keep first-appearance order across the lists

use super::{RetrievalMode, RetrievedDocument};
use std::collections::HashMap;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct RRFusion {
    /// Constant k (typically 60)
    pub k: f32,
}

impl Default for RRFusion {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

/// Result of fusion
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub document: RetrievedDocument,
    /// 1-based rank of the document in each input list
    pub ranks: Vec<Option<usize>>,
    pub rrf_score: f32,
}

impl RRFusion {
    /// Fuse weighted ranked lists; output is ordered by fused score
    pub fn fuse(&self, lists: Vec<(f32, Vec<RetrievedDocument>)>) -> Vec<FusionResult> {
        let list_count = lists.len();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut results: Vec<FusionResult> = Vec::new();

        for (list_idx, (weight, documents)) in lists.into_iter().enumerate() {
            for (rank, document) in documents.into_iter().enumerate() {
                let contribution = weight / (self.k + (rank + 1) as f32);
                match index.get(&document.content) {
                    Some(&pos) => {
                        let entry = &mut results[pos];
                        entry.rrf_score += contribution;
                        entry.ranks[list_idx].get_or_insert(rank + 1);
                    }
                    None => {
                        index.insert(document.content.clone(), results.len());
                        let mut ranks = vec![None; list_count];
                        ranks[list_idx] = Some(rank + 1);
                        results.push(FusionResult {
                            document,
                            ranks,
                            rrf_score: contribution,
                        });
                    }
                }
            }
        }

        for result in &mut results {
            result.document.score = result.rrf_score;
            result.document.retrieval_mode = RetrievalMode::Hybrid;
        }

        // Stable sort keeps first-appearance order for ties
        results.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexforge_common::models::Metadata;

    fn doc(content: &str, mode: RetrievalMode) -> RetrievedDocument {
        RetrievedDocument {
            content: content.to_string(),
            metadata: Metadata::new(),
            score: 0.0,
            retrieval_mode: mode,
        }
    }

    fn contents(results: &[FusionResult]) -> Vec<&str> {
        results.iter().map(|r| r.document.content.as_str()).collect()
    }

    #[test]
    fn test_single_list_preserves_order() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(vec![(
            1.0,
            vec![doc("a", RetrievalMode::Vector), doc("b", RetrievalMode::Vector)],
        )]);
        assert_eq!(contents(&results), vec!["a", "b"]);
        assert_eq!(results[0].ranks, vec![Some(1)]);
    }

    #[test]
    fn test_shared_document_accumulates() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(vec![
            (0.5, vec![doc("a", RetrievalMode::BM25), doc("b", RetrievalMode::BM25)]),
            (0.5, vec![doc("b", RetrievalMode::Vector), doc("c", RetrievalMode::Vector)]),
        ]);
        assert_eq!(contents(&results), vec!["b", "a", "c"]);
        assert_eq!(results[0].ranks, vec![Some(2), Some(1)]);
        let expected = 0.5 / 62.0 + 0.5 / 61.0;
        assert!((results[0].rrf_score - expected).abs() < 1e-6);
        assert_eq!(results[0].document.retrieval_mode, RetrievalMode::Hybrid);
    }

    #[test]
    fn test_weights_decide_between_lists() {
        let fusion = RRFusion::default();
        let results = fusion.fuse(vec![
            (0.2, vec![doc("lexical", RetrievalMode::BM25)]),
            (0.8, vec![doc("semantic", RetrievalMode::Vector)]),
        ]);
        assert_eq!(contents(&results), vec!["semantic", "lexical"]);
    }
}
