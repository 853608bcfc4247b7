//! BM25 lexical search over an in-memory document set
//!
//! Okapi BM25 with the classic parameters. Terms whose IDF would be negative
//! (present in more than half the documents) get `epsilon * mean IDF` instead,
//! or plain `epsilon` when the mean itself is not positive.

use super::{RetrievalMode, RetrievedDocument, Retriever};
use lexforge_common::errors::Result;
use lexforge_common::models::{Metadata, QueryResult};
use std::collections::HashMap;

/// Term saturation
const K1: f32 = 1.5;
/// Length normalization
const B: f32 = 0.75;
/// Floor factor for negative IDF terms
const EPSILON: f32 = 0.25;

/// BM25 retriever built from already-fetched documents
pub struct BM25Retriever {
    documents: Vec<(String, Metadata)>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f32,
    idf: HashMap<String, f32>,
}

impl BM25Retriever {
    /// Index text documents; non-text entries are skipped
    pub fn from_result(result: &QueryResult) -> Self {
        let documents = result
            .documents
            .iter()
            .zip(&result.metadatas)
            .filter_map(|(doc, meta)| doc.as_ref().map(|d| (d.clone(), meta.clone())))
            .collect();
        Self::from_documents(documents)
    }

    pub fn from_documents(documents: Vec<(String, Metadata)>) -> Self {
        let term_freqs: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|(text, _)| {
                let mut tf = HashMap::new();
                for token in tokenize(text) {
                    *tf.entry(token).or_insert(0) += 1;
                }
                tf
            })
            .collect();
        let doc_lens: Vec<usize> = term_freqs.iter().map(|tf| tf.values().sum()).collect();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32
        };

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tf in &term_freqs {
            for term in tf.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f32;
        let mut idf: HashMap<String, f32> = doc_freq
            .iter()
            .map(|(term, &df)| {
                let df = df as f32;
                (term.to_string(), ((n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();
        if !idf.is_empty() {
            let mean = idf.values().sum::<f32>() / idf.len() as f32;
            let floor = if mean > 0.0 { EPSILON * mean } else { EPSILON };
            for value in idf.values_mut().filter(|v| **v < 0.0) {
                *value = floor;
            }
        }

        Self {
            documents,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// BM25 score of every document for the query, in document order
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let terms = tokenize(query);
        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(tf, &len)| {
                let norm = if self.avg_doc_len > 0.0 {
                    K1 * (1.0 - B + B * len as f32 / self.avg_doc_len)
                } else {
                    K1
                };
                terms
                    .iter()
                    .map(|term| {
                        let freq = *tf.get(term).unwrap_or(&0) as f32;
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * freq * (K1 + 1.0) / (freq + norm)
                    })
                    .sum()
            })
            .collect()
    }
}

/// Lowercased alphanumeric tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait::async_trait]
impl Retriever for BM25Retriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<RetrievedDocument>> {
        let mut ranked: Vec<(usize, f32)> = self.scores(query).into_iter().enumerate().collect();
        // Stable sort: equal scores keep document order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(idx, score)| {
                let (content, metadata) = self.documents[idx].clone();
                RetrievedDocument {
                    content,
                    metadata,
                    score,
                    retrieval_mode: RetrievalMode::BM25,
                }
            })
            .collect())
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::BM25
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever(texts: &[&str]) -> BM25Retriever {
        BM25Retriever::from_documents(texts.iter().map(|t| (t.to_string(), Metadata::new())).collect())
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Amar-Putusan: bebas!"), vec!["amar", "putusan", "bebas"]);
        assert!(tokenize("  ,, ").is_empty());
    }

    #[tokio::test]
    async fn test_keyword_match_ranks_first() {
        let bm25 = retriever(&[
            "the court considered the evidence",
            "the verdict acquits the defendant",
            "weather report for tomorrow",
        ]);
        let results = bm25.retrieve("verdict defendant", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "the verdict acquits the defendant");
        assert!(results[0].score > results[1].score);
        assert_eq!(results[0].retrieval_mode, RetrievalMode::BM25);
    }

    #[tokio::test]
    async fn test_ties_keep_document_order() {
        let bm25 = retriever(&["alpha", "beta", "gamma"]);
        let results = bm25.retrieve("unrelated", 3).await.unwrap();
        let contents: Vec<_> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_common_terms_keep_positive_idf() {
        let bm25 = retriever(&["pidana penjara", "pidana denda", "pidana bersyarat"]);
        assert!(bm25.idf["pidana"] > 0.0);
        assert!(bm25.scores("pidana").iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_skips_non_text_documents() {
        let result = QueryResult::from_parts(
            vec![Some("a".into()), None],
            vec![Metadata::new(), Metadata::new()],
            None,
        )
        .unwrap();
        assert_eq!(BM25Retriever::from_result(&result).len(), 1);
    }
}
