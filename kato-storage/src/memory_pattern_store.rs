//! In-process `PatternStore` adapter, satisfying the same contract as the
//! durable adapters so tests can run against either interchangeably.
//!
//! Backed by a `DashMap` keyed by `(kb_id, name)`. Suitable for tests and for
//! a single-process embedded deployment; it is not durable across restarts.

use crate::traits::PatternStore;
use async_trait::async_trait;
use dashmap::DashMap;
use kato_core::{KbId, Pattern, Result};
use tracing::debug;

#[derive(Default)]
pub struct MemoryPatternStore {
    rows: DashMap<(KbId, String), Pattern>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn upsert_or_increment(&self, pattern: Pattern) -> Result<Pattern> {
        let key = (pattern.kb_id.clone(), pattern.name.clone());
        let name = pattern.name.clone();
        let emotives = pattern.emotives.clone();
        let metadata = pattern.metadata.clone();
        // `entry()` holds the shard lock across the modify-or-insert decision
        // and the read below, so two sessions racing to learn the same
        // brand-new pattern can never both observe "absent" and both insert -
        // one of them always sees the other's row via `and_modify` instead.
        let entry = self
            .rows
            .entry(key)
            .and_modify(|existing| {
                existing.frequency += 1;
                existing.emotives.extend(emotives);
                existing.metadata.extend(metadata);
                debug!(name = %existing.name, frequency = existing.frequency, "incremented existing pattern");
            })
            .or_insert_with(|| {
                debug!(name = %name, "inserted new pattern");
                pattern
            });
        Ok(entry.clone())
    }

    async fn get(&self, kb_id: &KbId, name: &str) -> Result<Option<Pattern>> {
        Ok(self.rows.get(&(kb_id.clone(), name.to_string())).map(|r| r.clone()))
    }

    async fn get_rows(&self, kb_id: &KbId, names: &[String]) -> Result<Vec<Pattern>> {
        Ok(names
            .iter()
            .filter_map(|n| self.rows.get(&(kb_id.clone(), n.clone())).map(|r| r.clone()))
            .collect())
    }

    async fn scan_by_length(
        &self,
        kb_id: &KbId,
        target: usize,
        max_deviation: i64,
    ) -> Result<Vec<Pattern>> {
        let target = target as i64;
        Ok(self
            .rows
            .iter()
            .filter(|entry| &entry.key().0 == kb_id)
            .filter(|entry| (entry.value().length as i64 - target).abs() <= max_deviation)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn scan_all(&self, kb_id: &KbId) -> Result<Vec<Pattern>> {
        Ok(self
            .rows
            .iter()
            .filter(|entry| &entry.key().0 == kb_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count(&self, kb_id: &KbId) -> Result<u64> {
        Ok(self.rows.iter().filter(|entry| &entry.key().0 == kb_id).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kato_core::Emotives;

    fn sample(kb: &str, sym: &str) -> Pattern {
        Pattern::new(
            KbId::new(kb),
            vec![vec![sym.to_string()]],
            Emotives::new(),
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn upsert_inserts_new_pattern_at_frequency_one() {
        let store = MemoryPatternStore::new();
        let p = store.upsert_or_increment(sample("kb", "a")).await.unwrap();
        assert_eq!(p.frequency, 1);
    }

    #[tokio::test]
    async fn repeated_upsert_increments_frequency_and_appends() {
        let store = MemoryPatternStore::new();
        let p1 = sample("kb", "a");
        let p2 = sample("kb", "a");
        store.upsert_or_increment(p1).await.unwrap();
        let committed = store.upsert_or_increment(p2).await.unwrap();
        assert_eq!(committed.frequency, 2);
        assert_eq!(committed.emotives.len(), 2);
        assert_eq!(committed.metadata.len(), 2);
    }

    #[tokio::test]
    async fn partitions_never_share_patterns() {
        let store = MemoryPatternStore::new();
        store.upsert_or_increment(sample("kb1", "a")).await.unwrap();
        let other = store.get(&KbId::new("kb2"), &sample("kb1", "a").name).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn scan_by_length_respects_deviation() {
        let store = MemoryPatternStore::new();
        store
            .upsert_or_increment(Pattern::new(
                KbId::new("kb"),
                vec![vec!["a".into(), "b".into()]],
                Emotives::new(),
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        let hits = store.scan_by_length(&KbId::new("kb"), 2, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store.scan_by_length(&KbId::new("kb"), 10, 0).await.unwrap();
        assert!(misses.is_empty());
    }
}
