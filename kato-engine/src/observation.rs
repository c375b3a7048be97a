//! Observation pipeline: validate, resolve vectors, canonicalize, and
//! fold one observe call into a session's STM.

use kato_core::canon;
use kato_core::{KatoError, Observation, Result, SessionConfig};
use kato_storage::{SessionRecord, VectorIndexStore};
use tracing::debug;

pub struct ObserveOutcome {
    pub stm_len: usize,
    pub should_auto_learn: bool,
}

fn validate(obs: &Observation) -> Result<()> {
    if obs.symbols.is_empty() && obs.vectors.is_empty() {
        return Err(KatoError::validation(
            "observation must carry at least one symbol or one vector",
        ));
    }
    for (key, value) in &obs.emotives {
        if !value.is_finite() {
            return Err(KatoError::validation(format!("emotive '{key}' is not a finite number")));
        }
    }
    for vector in &obs.vectors {
        if vector.is_empty() {
            return Err(KatoError::validation("vector must not be empty"));
        }
    }
    Ok(())
}

/// Apply one observe call to `record`'s STM in place. Caller holds the
/// session's lock and persists `record` afterward.
pub async fn apply_observe(
    vectors: &dyn VectorIndexStore,
    record: &mut SessionRecord,
    obs: Observation,
) -> Result<ObserveOutcome> {
    validate(&obs)?;

    let mut symbols = obs.symbols;
    for vector in &obs.vectors {
        let symbol = vectors.resolve(vector).await?;
        vectors.upsert(vector, &symbol).await?;
        symbols.push(symbol);
    }

    let event = canon::canonicalize_event(&symbols);
    record.stm.push(event);
    record.emotives_buffer.push(obs.emotives);
    record.metadata_buffer.push(obs.metadata);

    evict_oldest(record, record.config.stm_capacity);

    let cfg: &SessionConfig = &record.config;
    let should_auto_learn = cfg.max_pattern_length > 0 && record.stm.len() >= cfg.max_pattern_length;

    debug!(
        session_id = %record.session_id,
        stm_len = record.stm.len(),
        should_auto_learn,
        "observed event"
    );

    Ok(ObserveOutcome { stm_len: record.stm.len(), should_auto_learn })
}

fn evict_oldest(record: &mut SessionRecord, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while record.stm.len() > capacity {
        record.stm.remove(0);
        record.emotives_buffer.remove(0);
        record.metadata_buffer.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kato_core::{Emotives, KbId};
    use kato_storage::MemoryVectorIndex;

    fn fresh_record(stm_capacity: usize) -> SessionRecord {
        let now = Utc::now();
        let mut config = SessionConfig::default();
        config.stm_capacity = stm_capacity;
        SessionRecord {
            session_id: "s1".to_string(),
            kb_id: KbId::new("kb1"),
            stm: Vec::new(),
            emotives_buffer: Vec::new(),
            metadata_buffer: Vec::new(),
            config,
            created: now,
            last_access: now,
            expires_at: now + chrono::Duration::seconds(3600),
        }
    }

    #[tokio::test]
    async fn rejects_empty_observation() {
        let vectors = MemoryVectorIndex::default();
        let mut record = fresh_record(10);
        let obs = Observation::default();
        let err = apply_observe(&vectors, &mut record, obs).await.unwrap_err();
        assert!(matches!(err, KatoError::Validation(_)));
    }

    #[tokio::test]
    async fn appends_canonicalized_event() {
        let vectors = MemoryVectorIndex::default();
        let mut record = fresh_record(10);
        let obs = Observation {
            symbols: vec!["b".to_string(), "a".to_string()],
            vectors: Vec::new(),
            emotives: Emotives::new(),
            metadata: None,
        };
        apply_observe(&vectors, &mut record, obs).await.unwrap();
        assert_eq!(record.stm, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[tokio::test]
    async fn evicts_oldest_past_capacity() {
        let vectors = MemoryVectorIndex::default();
        let mut record = fresh_record(2);
        for s in ["a", "b", "c"] {
            let obs = Observation {
                symbols: vec![s.to_string()],
                vectors: Vec::new(),
                emotives: Emotives::new(),
                metadata: None,
            };
            apply_observe(&vectors, &mut record, obs).await.unwrap();
        }
        assert_eq!(record.stm, vec![vec!["b".to_string()], vec!["c".to_string()]]);
        assert_eq!(record.emotives_buffer.len(), 2);
        assert_eq!(record.metadata_buffer.len(), 2);
    }

    #[tokio::test]
    async fn auto_learn_triggers_at_max_pattern_length() {
        let vectors = MemoryVectorIndex::default();
        let mut record = fresh_record(10);
        record.config.max_pattern_length = 2;
        let obs1 = Observation {
            symbols: vec!["a".to_string()],
            vectors: Vec::new(),
            emotives: Emotives::new(),
            metadata: None,
        };
        let outcome1 = apply_observe(&vectors, &mut record, obs1).await.unwrap();
        assert!(!outcome1.should_auto_learn);

        let obs2 = Observation {
            symbols: vec!["b".to_string()],
            vectors: Vec::new(),
            emotives: Emotives::new(),
            metadata: None,
        };
        let outcome2 = apply_observe(&vectors, &mut record, obs2).await.unwrap();
        assert!(outcome2.should_auto_learn);
    }

    #[tokio::test]
    async fn vectors_resolve_to_deterministic_symbols() {
        let vectors = MemoryVectorIndex::default();
        let mut record = fresh_record(10);
        let obs = Observation {
            symbols: Vec::new(),
            vectors: vec![vec![1.0, 2.0, 3.0]],
            emotives: Emotives::new(),
            metadata: None,
        };
        apply_observe(&vectors, &mut record, obs).await.unwrap();
        assert_eq!(record.stm.len(), 1);
        assert!(record.stm[0][0].starts_with("VCTR|"));
    }
}
