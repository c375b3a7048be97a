//! Processor orchestrator: binds the filter pipeline, observation
//! pipeline, and prediction assembler into the session-scoped operations an
//! external caller invokes - create a session, observe into it, learn its
//! STM as a pattern, predict against the partition, and manage its
//! configuration and lifetime.
//!
//! Every operation that touches a session's STM acquires that session's lock
//! first and holds it for the call's duration; different sessions proceed
//! fully in parallel. `observe`'s auto-learn path and a standalone `learn`
//! call both end up running the same core logic, but `observe` must not try
//! to reacquire a lock it already holds - see `learn_locked` below.

use crate::{filters, observation, prediction};
use chrono::{Duration as ChronoDuration, Utc};
use kato_core::{
    canon, Emotives, KatoError, KbId, Metadata, Observation, Pattern, Prediction as PredictionRow,
    Result, SessionConfig, SessionConfigOverrides, SessionId,
};
use kato_index::LshIndex;
use kato_storage::{MetadataStore, PatternStore, RetryPolicy, SessionRecord, SessionStore, VectorIndexStore};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The four store handles a `Processor` binds together. Cheap to clone - all
/// fields are `Arc`.
#[derive(Clone)]
pub struct Stores {
    pub patterns: Arc<dyn PatternStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub vectors: Arc<dyn VectorIndexStore>,
    pub sessions: Arc<dyn SessionStore>,
}

/// One `kb_id` partition's entry point. Holds no session state itself -
/// everything lives in `stores.sessions`, looked up fresh on every call.
pub struct Processor {
    kb_id: KbId,
    stores: Stores,
    index: Arc<LshIndex>,
    retry: RetryPolicy,
    predict_timeout: Duration,
}

fn mean_emotives(buffer: &[Emotives]) -> Emotives {
    let mut sums: std::collections::BTreeMap<String, f64> = Default::default();
    let mut counts: std::collections::BTreeMap<String, u64> = Default::default();
    for occurrence in buffer {
        for (k, v) in occurrence {
            *sums.entry(k.clone()).or_insert(0.0) += v;
            *counts.entry(k.clone()).or_insert(0) += 1;
        }
    }
    sums.into_iter()
        .map(|(k, sum)| {
            let n = counts[&k] as f64;
            (k, sum / n)
        })
        .collect()
}

/// One learn-occurrence's metadata is a single JSON array of the non-null
/// per-event values buffered since the last learn; an event observed with no
/// metadata simply contributes nothing to the array.
fn combine_metadata(buffer: &[Option<Metadata>]) -> Metadata {
    serde_json::Value::Array(buffer.iter().filter_map(|m| m.clone()).collect())
}

impl Processor {
    pub fn new(kb_id: KbId, stores: Stores, index: Arc<LshIndex>) -> Self {
        Self {
            kb_id,
            stores,
            index,
            retry: RetryPolicy::default(),
            predict_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_predict_timeout(mut self, timeout: Duration) -> Self {
        self.predict_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn create_session(&self, mut overrides: SessionConfigOverrides) -> Result<SessionId> {
        overrides.kb_id = Some(self.kb_id.0.clone());
        let config = SessionConfig::from_env_defaults().merge_overrides(&overrides)?;
        let session_id = SessionId::new();
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.to_string(),
            kb_id: self.kb_id.clone(),
            stm: Vec::new(),
            emotives_buffer: Vec::new(),
            metadata_buffer: Vec::new(),
            expires_at: now + ChronoDuration::seconds(config.session_ttl_secs),
            config,
            created: now,
            last_access: now,
        };
        self.stores.sessions.create(record).await?;
        Ok(session_id)
    }

    async fn persist_stm(&self, record: &SessionRecord) -> Result<()> {
        self.stores
            .sessions
            .update_stm(
                &record.session_id,
                record.stm.clone(),
                record.emotives_buffer.clone(),
                record.metadata_buffer.clone(),
            )
            .await
    }

    /// Core learn logic, assuming the session's lock is already held by the
    /// caller (`learn`'s wrapper, or `observe`'s auto-learn path reusing its
    /// own guard). Returns `""` and leaves `record` untouched if the STM is
    /// empty. On success, clears `record`'s STM/emotives/metadata buffers;
    /// the caller persists the record afterward.
    async fn learn_locked(&self, record: &mut SessionRecord) -> Result<String> {
        if record.stm.is_empty() {
            return Ok(String::new());
        }

        let canonical = record.stm.clone();
        let name = canon::pattern_name(&canonical);

        let emotives = mean_emotives(&record.emotives_buffer);
        let metadata = combine_metadata(&record.metadata_buffer);
        let mut pattern = Pattern::new(self.kb_id.clone(), canonical, emotives, metadata);
        let sig = self.index.signature_of(&pattern.token_set);
        pattern.minhash_sig = sig.minhash_sig;
        pattern.lsh_bands = sig.lsh_bands;
        let token_set = pattern.token_set.clone();

        let committed = self
            .retry
            .retry(|| self.stores.patterns.upsert_or_increment(pattern.clone()))
            .await?;
        // `upsert_or_increment` is atomic end-to-end (a single `DashMap::entry()`
        // or a single SurrealQL statement), so `frequency == 1` on the row it
        // just returned can only be true for the one caller whose write
        // created it - a preceding, separate `get()` would instead be racy:
        // two sessions learning the same brand-new pattern concurrently could
        // both observe "absent" before either one wrote.
        let is_new = committed.frequency == 1;

        for symbol in &token_set {
            self.stores.metadata.incr_symbol_freq(&self.kb_id, symbol, 1).await?;
            if is_new {
                self.stores.metadata.incr_symbol_pmf(&self.kb_id, symbol, 1).await?;
            }
        }

        if is_new {
            self.index.insert(&self.kb_id, &name, &committed.lsh_bands);
        }

        record.stm.clear();
        record.emotives_buffer.clear();
        record.metadata_buffer.clear();

        debug!(kb_id = %self.kb_id, name = %name, frequency = committed.frequency, is_new, "learned pattern");
        Ok(name)
    }

    pub async fn learn(&self, session_id: &str) -> Result<String> {
        let lock = self.stores.sessions.lock_for(session_id).await;
        let _guard = lock.lock().await;
        let mut record = self.stores.sessions.get(session_id).await?;
        let name = self.learn_locked(&mut record).await?;
        self.persist_stm(&record).await?;
        Ok(name)
    }

    /// Returns the STM length immediately after folding `obs` in, and the
    /// learned pattern's name if auto-learn fired on this call.
    pub async fn observe(&self, session_id: &str, obs: Observation) -> Result<(u64, Option<String>)> {
        let lock = self.stores.sessions.lock_for(session_id).await;
        let _guard = lock.lock().await;
        let mut record = self.stores.sessions.get(session_id).await?;

        let outcome = observation::apply_observe(&*self.stores.vectors, &mut record, obs).await?;

        let learned = if outcome.should_auto_learn {
            Some(self.learn_locked(&mut record).await?)
        } else {
            None
        };

        self.persist_stm(&record).await?;
        if record.config.auto_extend_session {
            let new_expires_at = Utc::now() + ChronoDuration::seconds(record.config.session_ttl_secs);
            self.stores.sessions.extend_ttl(session_id, new_expires_at).await?;
        }

        Ok((outcome.stm_len as u64, learned))
    }

    async fn predict_inner(
        &self,
        stm_flat: &[String],
        stm_tokens: &BTreeSet<String>,
        config: &SessionConfig,
    ) -> Result<Vec<PredictionRow>> {
        let ctx = filters::FilterContext { kb_id: &self.kb_id, stm_tokens, stm_flat, config };
        let survivors = filters::run_pipeline(&ctx, &*self.stores.patterns, &self.index).await?;

        // Segmentation is pure CPU work (no store calls), so it runs
        // survivor-wise in parallel; the per-candidate metadata lookups that
        // follow are not, and stay sequential below.
        let eligible: Vec<(Pattern, kato_similarity::Segmentation)> = survivors
            .into_par_iter()
            .map(|p| {
                let mut seg = kato_similarity::align(stm_flat, &p.pattern_data);
                // `align` always segments in token space - past/present/future
                // are inherently event-based - but the *reported* similarity
                // still has to respect character mode when configured.
                if !config.use_token_matching {
                    let p_flat = canon::flatten(&p.pattern_data);
                    seg.similarity = kato_similarity::char_ratio(stm_flat, &p_flat);
                }
                (p, seg)
            })
            .filter(|(_, seg)| seg.similarity >= config.recall_threshold)
            .collect();

        let mut predictions = Vec::with_capacity(eligible.len());
        for (pattern, seg) in eligible {
            predictions.push(prediction::assemble(&*self.stores.metadata, &self.kb_id, &pattern, seg).await?);
        }

        Ok(prediction::rank(predictions, config.max_predictions))
    }

    /// Predicts against the session's current STM under a deployment-wide
    /// deadline. On timeout, partial results are discarded - callers never
    /// see a partially-ranked prediction list.
    pub async fn predict(&self, session_id: &str) -> Result<Vec<PredictionRow>> {
        let lock = self.stores.sessions.lock_for(session_id).await;
        let _guard = lock.lock().await;
        let record = self.stores.sessions.get(session_id).await?;

        if record.stm.len() < 2 {
            return Ok(Vec::new());
        }

        let stm_flat = canon::flatten(&record.stm);
        let stm_tokens: BTreeSet<String> = stm_flat.iter().cloned().collect();
        let config = record.config.clone();

        match tokio::time::timeout(self.predict_timeout, self.predict_inner(&stm_flat, &stm_tokens, &config)).await {
            Ok(result) => result,
            Err(_) => Err(KatoError::timeout(format!("predict exceeded {:?}", self.predict_timeout))),
        }
    }

    pub async fn clear_stm(&self, session_id: &str) -> Result<()> {
        let lock = self.stores.sessions.lock_for(session_id).await;
        let _guard = lock.lock().await;
        self.stores.sessions.clear_stm(session_id).await
    }

    pub async fn update_config(&self, session_id: &str, mut overrides: SessionConfigOverrides) -> Result<SessionConfig> {
        let lock = self.stores.sessions.lock_for(session_id).await;
        let _guard = lock.lock().await;
        let record = self.stores.sessions.get(session_id).await?;
        overrides.kb_id = Some(self.kb_id.0.clone());
        let resolved = record.config.merge_overrides(&overrides)?;
        self.stores.sessions.update_config(session_id, resolved.clone()).await?;
        Ok(resolved)
    }

    pub async fn get_pattern(&self, name: &str) -> Result<Pattern> {
        self.stores
            .patterns
            .get(&self.kb_id, name)
            .await?
            .ok_or_else(|| KatoError::pattern_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kato_storage::{MemoryMetadataStore, MemoryPatternStore, MemorySessionStore, MemoryVectorIndex};

    fn processor(kb: &str) -> Processor {
        let stores = Stores {
            patterns: Arc::new(MemoryPatternStore::new()),
            metadata: Arc::new(MemoryMetadataStore::new()),
            vectors: Arc::new(MemoryVectorIndex::default()),
            sessions: Arc::new(MemorySessionStore::new()),
        };
        Processor::new(KbId::new(kb), stores, Arc::new(LshIndex::default()))
    }

    fn obs(symbols: &[&str]) -> Observation {
        Observation {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            vectors: Vec::new(),
            emotives: Emotives::new(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn learn_assigns_content_addressed_identity() {
        let proc = processor("kb1");
        let session = proc.create_session(SessionConfigOverrides::default()).await.unwrap();
        proc.observe(&session.to_string(), obs(&["a"])).await.unwrap();
        proc.observe(&session.to_string(), obs(&["b"])).await.unwrap();
        let name = proc.learn(&session.to_string()).await.unwrap();
        assert!(name.starts_with("PTRN|"));

        let pattern = proc.get_pattern(&name).await.unwrap();
        assert_eq!(pattern.frequency, 1);
        assert_eq!(pattern.pattern_data, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[tokio::test]
    async fn learning_the_same_stm_twice_increments_frequency() {
        let proc = processor("kb1");
        let s1 = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&s1, obs(&["a"])).await.unwrap();
        proc.observe(&s1, obs(&["b"])).await.unwrap();
        let name = proc.learn(&s1).await.unwrap();

        let s2 = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&s2, obs(&["a"])).await.unwrap();
        proc.observe(&s2, obs(&["b"])).await.unwrap();
        let name2 = proc.learn(&s2).await.unwrap();

        assert_eq!(name, name2);
        let pattern = proc.get_pattern(&name).await.unwrap();
        assert_eq!(pattern.frequency, 2);
    }

    #[tokio::test]
    async fn trivial_predict_recalls_an_identical_pattern() {
        let proc = processor("kb1");
        let learner = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&learner, obs(&["a"])).await.unwrap();
        proc.observe(&learner, obs(&["b"])).await.unwrap();
        proc.observe(&learner, obs(&["c"])).await.unwrap();
        proc.learn(&learner).await.unwrap();

        let recaller = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&recaller, obs(&["a"])).await.unwrap();
        proc.observe(&recaller, obs(&["b"])).await.unwrap();
        proc.observe(&recaller, obs(&["c"])).await.unwrap();

        let predictions = proc.predict(&recaller).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn recall_threshold_gates_unrelated_candidates() {
        let proc = processor("kb1");
        let learner = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&learner, obs(&["a"])).await.unwrap();
        proc.observe(&learner, obs(&["b"])).await.unwrap();
        proc.learn(&learner).await.unwrap();

        let overrides = SessionConfigOverrides { recall_threshold: Some(0.9), ..Default::default() };
        let recaller = proc.create_session(overrides).await.unwrap().to_string();
        proc.observe(&recaller, obs(&["x"])).await.unwrap();
        proc.observe(&recaller, obs(&["y"])).await.unwrap();

        let predictions = proc.predict(&recaller).await.unwrap();
        assert!(predictions.is_empty());
    }

    #[tokio::test]
    async fn auto_learn_fires_and_clears_stm() {
        let proc = processor("kb1");
        let overrides = SessionConfigOverrides { max_pattern_length: Some(2), ..Default::default() };
        let session = proc.create_session(overrides).await.unwrap().to_string();

        let (_, learned1) = proc.observe(&session, obs(&["a"])).await.unwrap();
        assert!(learned1.is_none());
        let (stm_len, learned2) = proc.observe(&session, obs(&["b"])).await.unwrap();
        assert_eq!(stm_len, 2);
        assert!(learned2.is_some());

        let record = proc.stores.sessions.get(&session).await.unwrap();
        assert!(record.stm.is_empty());
    }

    #[tokio::test]
    async fn emotives_average_key_wise_across_learn_occurrences() {
        let proc = processor("kb1");
        let s1 = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        let mut o1 = obs(&["a"]);
        o1.emotives.insert("valence".to_string(), 1.0);
        proc.observe(&s1, o1).await.unwrap();
        let mut o2 = obs(&["b"]);
        o2.emotives.insert("valence".to_string(), 3.0);
        proc.observe(&s1, o2).await.unwrap();
        let name = proc.learn(&s1).await.unwrap();

        let pattern = proc.get_pattern(&name).await.unwrap();
        assert_eq!(pattern.mean_emotives()["valence"], 2.0);
    }

    #[tokio::test]
    async fn sessions_do_not_share_stm() {
        let proc = processor("kb1");
        let s1 = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        let s2 = proc.create_session(SessionConfigOverrides::default()).await.unwrap().to_string();
        proc.observe(&s1, obs(&["a"])).await.unwrap();

        let record2 = proc.stores.sessions.get(&s2).await.unwrap();
        assert!(record2.stm.is_empty());
        let record1 = proc.stores.sessions.get(&s1).await.unwrap();
        assert_eq!(record1.stm.len(), 1);
    }
}
