//! In-process `SessionStore` adapter.

use crate::traits::{SessionRecord, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kato_core::{Emotives, KatoError, Result, SessionConfig};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
    /// One mutex per session, created lazily. Holding it is what makes
    /// observe/learn/predict/clear/update_config linearize per session
    /// linearized; it does not protect `records` itself, which is a
    /// `DashMap` and already internally synchronized.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<()> {
        debug!(session_id = %record.session_id, kb_id = %record.kb_id, "creating session");
        self.records.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord> {
        let record = self
            .records
            .get(session_id)
            .ok_or_else(|| KatoError::session_not_found(session_id))?
            .clone();
        if record.is_expired(Utc::now()) {
            return Err(KatoError::session_expired(session_id));
        }
        Ok(record)
    }

    async fn update_stm(
        &self,
        session_id: &str,
        stm: Vec<Vec<String>>,
        emotives_buffer: Vec<Emotives>,
        metadata_buffer: Vec<Option<kato_core::Metadata>>,
    ) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(session_id)
            .ok_or_else(|| KatoError::session_not_found(session_id))?;
        entry.stm = stm;
        entry.emotives_buffer = emotives_buffer;
        entry.metadata_buffer = metadata_buffer;
        entry.last_access = Utc::now();
        Ok(())
    }

    async fn clear_stm(&self, session_id: &str) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(session_id)
            .ok_or_else(|| KatoError::session_not_found(session_id))?;
        entry.stm.clear();
        entry.emotives_buffer.clear();
        entry.metadata_buffer.clear();
        entry.last_access = Utc::now();
        Ok(())
    }

    async fn update_config(&self, session_id: &str, config: SessionConfig) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(session_id)
            .ok_or_else(|| KatoError::session_not_found(session_id))?;
        entry.config = config;
        Ok(())
    }

    async fn extend_ttl(&self, session_id: &str, new_expires_at: DateTime<Utc>) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(session_id)
            .ok_or_else(|| KatoError::session_not_found(session_id))?;
        entry.expires_at = new_expires_at;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.records.remove(session_id);
        self.locks.remove(session_id);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        for id in &expired {
            self.records.remove(id);
            self.locks.remove(id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "swept expired sessions");
        }
        Ok(expired.len() as u64)
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kato_core::KbId;

    fn sample_record(id: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: id.to_string(),
            kb_id: KbId::new("kb"),
            stm: Vec::new(),
            emotives_buffer: Vec::new(),
            metadata_buffer: Vec::new(),
            config: SessionConfig::default(),
            created: now,
            last_access: now,
            expires_at: now + chrono::Duration::seconds(3600),
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = MemorySessionStore::new();
        store.create(sample_record("s1")).await.unwrap();
        let got = store.get("s1").await.unwrap();
        assert_eq!(got.session_id, "s1");
    }

    #[tokio::test]
    async fn get_unknown_session_errors() {
        let store = MemorySessionStore::new();
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn expired_session_errors_on_get() {
        let store = MemorySessionStore::new();
        let mut record = sample_record("s1");
        record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.create(record).await.unwrap();
        let err = store.get("s1").await.unwrap_err();
        assert!(matches!(err, KatoError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn clear_stm_empties_stm_and_emotives() {
        let store = MemorySessionStore::new();
        store.create(sample_record("s1")).await.unwrap();
        store
            .update_stm("s1", vec![vec!["a".into()]], vec![Emotives::new()], vec![None])
            .await
            .unwrap();
        store.clear_stm("s1").await.unwrap();
        let got = store.get("s1").await.unwrap();
        assert!(got.stm.is_empty());
        assert!(got.emotives_buffer.is_empty());
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_expired_sessions() {
        let store = MemorySessionStore::new();
        store.create(sample_record("fresh")).await.unwrap();
        let mut stale = sample_record("stale");
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.create(stale).await.unwrap();

        let removed = store.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn locks_are_per_session() {
        let store = MemorySessionStore::new();
        let a = store.lock_for("s1").await;
        let b = store.lock_for("s1").await;
        let c = store.lock_for("s2").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
