//! LexForge search CLI
//!
//! Loads a JSON corpus into the in-memory store, assembles sources for the
//! queries given on the command line and prints the contexts as JSON.
//!
//! Usage: `search <corpus.json> <query>...`

use anyhow::{bail, Context as _};
use lexforge_common::{
    config::AppConfig,
    embeddings::{create_embedder, Embedder},
    metrics,
    models::{Metadata, PointId, SourceDescriptor},
    store::{InMemoryVectorStore, PointStore, StoredRecord, VectorStore},
    VERSION,
};
use lexforge_search::{LegalFeatureRetriever, LegalStoreState, SourceAggregator, SourceRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Corpus {
    #[serde(default)]
    collections: BTreeMap<String, Vec<CorpusDocument>>,
    #[serde(default)]
    legal: Vec<CorpusPoint>,
}

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct CorpusPoint {
    id: PointId,
    #[serde(default)]
    payload: Metadata,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()
        .context("Failed to load configuration")?
        .validated()?;
    init_tracing(&config);
    metrics::register_metrics();

    info!("Starting LexForge search v{}", VERSION);

    let mut args = std::env::args().skip(1);
    let Some(corpus_path) = args.next() else {
        bail!("usage: search <corpus.json> <query>...");
    };
    let queries: Vec<String> = args.collect();
    if queries.is_empty() {
        bail!("at least one query is required");
    }

    let raw = tokio::fs::read_to_string(&corpus_path)
        .await
        .with_context(|| format!("Failed to read corpus {}", corpus_path))?;
    let corpus: Corpus = serde_json::from_str(&raw).context("Invalid corpus JSON")?;

    let embedder = create_embedder(&config.embedding)?;
    let store = Arc::new(InMemoryVectorStore::new());
    let content_prefix = config.embedding.content_prefix.clone();

    let mut requests = Vec::new();
    for (name, documents) in corpus.collections {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts, content_prefix.as_deref(), None).await?;
        let records = documents
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (doc, vector))| StoredRecord {
                id: PointId::Num(i as u64),
                text: Some(doc.text),
                metadata: doc.metadata,
                vector,
            })
            .collect::<Vec<_>>();
        info!(collection = %name, documents = records.len(), "Collection loaded");
        store.upsert(&name, records).await;
        requests.push(SourceRequest::collections(
            SourceDescriptor::new("collection", name.as_str(), name.as_str()),
            [name],
        ));
    }

    let legal = match config.legal.collection.as_deref() {
        Some(collection) if !corpus.legal.is_empty() => {
            load_legal_points(&store, collection, corpus.legal, embedder.as_ref(), &config).await?;
            let point_store: Arc<dyn PointStore> = store.clone();
            LegalStoreState::from_config(point_store, &config.legal).map(|state| {
                LegalFeatureRetriever::new(Arc::new(state), embedder.clone(), &config.legal, &config.embedding)
            })
        }
        _ => None,
    };

    let vector_store: Arc<dyn VectorStore> = store;
    let aggregator = SourceAggregator::new(config, vector_store, embedder).with_legal(legal);
    let contexts = aggregator.get_sources(requests, &queries, None).await;

    println!("{}", serde_json::to_string_pretty(&contexts)?);
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Store legal points, embedding the fallback content of points without a vector
async fn load_legal_points(
    store: &InMemoryVectorStore,
    collection: &str,
    points: Vec<CorpusPoint>,
    embedder: &dyn Embedder,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let content_field = &config.legal.fallback_content_field;
    let mut records = Vec::with_capacity(points.len());
    for point in points {
        let vector = match point.vector {
            Some(v) => v,
            None => {
                let text = point
                    .payload
                    .get(content_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                embedder
                    .embed(text, config.embedding.content_prefix.as_deref(), None)
                    .await?
            }
        };
        records.push(StoredRecord {
            id: point.id,
            text: None,
            metadata: point.payload,
            vector,
        });
    }
    store
        .create_collection(collection, Some(config.embedding.dimension))
        .await;
    info!(collection = %collection, points = records.len(), "Legal collection loaded");
    store.upsert(collection, records).await;
    Ok(())
}
