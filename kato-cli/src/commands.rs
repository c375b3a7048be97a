//! Command implementations: each function takes already-parsed arguments and
//! talks to a `Processor`, independent of `clap`.

use anyhow::{anyhow, Context, Result};
use kato_core::{Emotives, KbId, Observation, SessionConfigOverrides};
use kato_engine::{Processor, Stores};
use kato_index::LshIndex;
use kato_storage::{
    MemoryMetadataStore, MemoryPatternStore, MemorySessionStore, MemoryVectorIndex, QdrantVectorIndex,
    SurrealMetadataStore, SurrealPatternStore, SurrealSessionStore,
};
use std::sync::Arc;

/// Durable-backend connection options. `None` for either half falls back to
/// the in-process adapter for that half.
#[derive(Debug, Clone, Default)]
pub struct DurableOpts {
    pub surreal_endpoint: Option<String>,
    pub surreal_namespace: String,
    pub surreal_database: String,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub vector_size: u64,
}

pub async fn build_processor(kb_id: &str, durable: &DurableOpts) -> Result<Processor> {
    let kb = KbId::new(kb_id);

    let (patterns, metadata, sessions): (
        Arc<dyn kato_storage::PatternStore>,
        Arc<dyn kato_storage::MetadataStore>,
        Arc<dyn kato_storage::SessionStore>,
    ) = match &durable.surreal_endpoint {
        Some(endpoint) => {
            let patterns = SurrealPatternStore::connect(endpoint, &durable.surreal_namespace, &durable.surreal_database)
                .await
                .context("connecting pattern store")?;
            let metadata = SurrealMetadataStore::connect(endpoint, &durable.surreal_namespace, &durable.surreal_database)
                .await
                .context("connecting metadata store")?;
            let sessions = SurrealSessionStore::connect(endpoint, &durable.surreal_namespace, &durable.surreal_database)
                .await
                .context("connecting session store")?;
            (Arc::new(patterns), Arc::new(metadata), Arc::new(sessions))
        }
        None => (
            Arc::new(MemoryPatternStore::new()),
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemorySessionStore::new()),
        ),
    };

    let vectors: Arc<dyn kato_storage::VectorIndexStore> = match &durable.qdrant_url {
        Some(url) => Arc::new(
            QdrantVectorIndex::connect(url, &durable.qdrant_collection, durable.vector_size)
                .await
                .context("connecting vector index")?,
        ),
        None => Arc::new(MemoryVectorIndex::default()),
    };

    let stores = Stores { patterns, metadata, vectors, sessions };
    Ok(Processor::new(kb, stores, Arc::new(LshIndex::default())))
}

/// Parse `key=value` emotive arguments into an `Emotives` map.
pub fn parse_emotives(pairs: &[String]) -> Result<Emotives> {
    let mut emotives = Emotives::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("emotive '{pair}' must be formatted as key=value"))?;
        let value: f64 = value.parse().with_context(|| format!("emotive '{key}' value must be a number"))?;
        emotives.insert(key.to_string(), value);
    }
    Ok(emotives)
}

pub fn build_observation(symbols: &[String], emotives: &[String], metadata: Option<&str>) -> Result<Observation> {
    let metadata = metadata
        .map(serde_json::from_str)
        .transpose()
        .context("metadata must be valid JSON")?;
    Ok(Observation {
        symbols: symbols.to_vec(),
        vectors: Vec::new(),
        emotives: parse_emotives(emotives)?,
        metadata,
    })
}

pub async fn create_session(processor: &Processor, overrides: SessionConfigOverrides) -> Result<String> {
    let id = processor.create_session(overrides).await?;
    Ok(id.to_string())
}

fn event(symbols: &[&str]) -> Observation {
    Observation {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        vectors: Vec::new(),
        emotives: Emotives::new(),
        metadata: None,
    }
}

/// A canned observe/learn/recall sequence, exercised end to end in one
/// process: learn `a, b, c` as a session's first pattern, then replay the
/// same three events in a second session and check the prediction comes
/// back. Prints each step so a reader can follow the whole lifecycle without
/// wiring up a durable backend.
pub async fn run_demo(processor: &Processor) -> Result<Vec<serde_json::Value>> {
    let mut steps = Vec::new();

    let learner = processor.create_session(SessionConfigOverrides::default()).await?.to_string();
    for symbols in [["a"].as_slice(), &["b"], &["c"]] {
        let (stm_len, _) = processor.observe(&learner, event(symbols)).await?;
        steps.push(serde_json::json!({"step": "observe", "session": learner, "symbols": symbols, "stm_len": stm_len}));
    }
    let learned = processor.learn(&learner).await?;
    steps.push(serde_json::json!({"step": "learn", "session": learner, "pattern": learned}));

    let recaller = processor.create_session(SessionConfigOverrides::default()).await?.to_string();
    for symbols in [["a"].as_slice(), &["b"], &["c"]] {
        processor.observe(&recaller, event(symbols)).await?;
    }
    let predictions = processor.predict(&recaller).await?;
    steps.push(serde_json::json!({"step": "predict", "session": recaller, "predictions": predictions}));

    Ok(steps)
}
