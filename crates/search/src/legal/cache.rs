//! Lazily-populated, read-mostly state for the legal store
//!
//! Holds the store handle plus the two values derived from it: the
//! collection's vector size and the feature alias map. Each is computed on
//! first use and kept for the lifetime of this object once computed
//! successfully. A failed lookup is not cached, so the next request retries.

use super::features::FeatureAliasMap;
use lexforge_common::config::LegalConfig;
use lexforge_common::errors::Result;
use lexforge_common::models::SCROLL_SENTINEL_SCORE;
use lexforge_common::store::{PointStore, ScrollRequest};
use lexforge_common::vector::MismatchReporter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct LegalStoreState {
    store: Arc<dyn PointStore>,
    collection: String,
    default_keys: Vec<String>,
    base_fields: HashSet<String>,
    vector_size: OnceCell<Option<usize>>,
    aliases: OnceCell<Arc<FeatureAliasMap>>,
    mismatch: MismatchReporter,
}

impl LegalStoreState {
    /// State for the configured collection; `None` when the subsystem is disabled
    pub fn from_config(store: Arc<dyn PointStore>, config: &LegalConfig) -> Option<Self> {
        let collection = config.collection.as_deref().filter(|c| !c.is_empty())?;
        Some(Self {
            store,
            collection: collection.to_string(),
            default_keys: config.default_feature_keys.clone(),
            base_fields: config.base_fields.iter().cloned().collect(),
            vector_size: OnceCell::new(),
            aliases: OnceCell::new(),
            mismatch: MismatchReporter::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn PointStore> {
        &self.store
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn mismatch_reporter(&self) -> &MismatchReporter {
        &self.mismatch
    }

    /// Expected vector size of the collection, if the store reports a positive one
    pub async fn vector_size(&self) -> Option<usize> {
        let result = self
            .vector_size
            .get_or_try_init(|| async {
                let info = self.store.collection_info(&self.collection).await?;
                Ok::<_, lexforge_common::AppError>(info.vector_size.filter(|s| *s > 0))
            })
            .await;
        match result {
            Ok(size) => *size,
            Err(e) => {
                tracing::debug!(collection = %self.collection, error = %e, "Unable to fetch legal collection info");
                None
            }
        }
    }

    /// Alias map over the default keys plus payload keys of one sampled record
    pub async fn aliases(&self) -> Arc<FeatureAliasMap> {
        let result = self
            .aliases
            .get_or_try_init(|| async { self.sample_keys().await.map(|keys| Arc::new(FeatureAliasMap::from_keys(keys))) })
            .await;
        match result {
            Ok(map) => map.clone(),
            Err(e) => {
                tracing::debug!(collection = %self.collection, error = %e, "Unable to introspect legal features");
                Arc::new(FeatureAliasMap::from_keys(&self.default_keys))
            }
        }
    }

    async fn sample_keys(&self) -> Result<Vec<String>> {
        let mut keys = self.default_keys.clone();
        let page = self
            .store
            .scroll(
                &self.collection,
                ScrollRequest {
                    limit: 1,
                    offset: None,
                    with_payload: true,
                    with_vectors: false,
                },
            )
            .await?;
        for point in page.points {
            let Some(point) = point.into_scored(SCROLL_SENTINEL_SCORE) else {
                continue;
            };
            for key in point.payload.keys() {
                if !self.base_fields.contains(key) && !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FlakyStore;
    use lexforge_common::models::{Metadata, PointId};
    use lexforge_common::store::{InMemoryVectorStore, StoredRecord};
    use serde_json::json;

    fn legal_config(collection: &str) -> LegalConfig {
        LegalConfig {
            collection: Some(collection.to_string()),
            default_feature_keys: vec!["amar_putusan".into()],
            ..Default::default()
        }
    }

    async fn legal_store() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.create_collection("legal", Some(3)).await;
        let mut payload = Metadata::new();
        payload.insert("nomor_putusan".into(), json!("12/Pid.B/2020"));
        payload.insert("barang_bukti".into(), json!("satu unit sepeda motor"));
        store
            .upsert(
                "legal",
                vec![StoredRecord {
                    id: PointId::Num(1),
                    text: None,
                    metadata: payload,
                    vector: vec![1.0, 0.0, 0.0],
                }],
            )
            .await;
        store
    }

    #[test]
    fn test_disabled_without_collection() {
        let store: Arc<dyn PointStore> = Arc::new(InMemoryVectorStore::new());
        assert!(LegalStoreState::from_config(store, &LegalConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_aliases_include_sampled_keys() {
        let store: Arc<dyn PointStore> = Arc::new(legal_store().await);
        let state = LegalStoreState::from_config(store, &legal_config("legal")).unwrap();
        let aliases = state.aliases().await;
        assert_eq!(aliases.get("barang bukti"), Some("barang_bukti"));
        assert_eq!(aliases.get("amar putusan"), Some("amar_putusan"));
        assert!(aliases.get("nomor putusan").is_none());
        assert_eq!(state.vector_size().await, Some(3));
    }

    #[tokio::test]
    async fn test_failures_fall_back_and_are_not_cached() {
        let store = Arc::new(FlakyStore::new(legal_store().await).breaking("legal"));
        let state = LegalStoreState::from_config(store, &legal_config("legal")).unwrap();
        assert_eq!(state.vector_size().await, None);
        let aliases = state.aliases().await;
        assert_eq!(aliases.get("amar putusan"), Some("amar_putusan"));
        assert!(aliases.get("barang bukti").is_none());
        assert!(state.vector_size.get().is_none());
        assert!(state.aliases.get().is_none());
    }
}
