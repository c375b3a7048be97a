//! SurrealDB-backed `SessionStore` adapter, for durable deployments.
//!
//! Per-session locks still live only in this process (a lock that could be
//! acquired from another node would need a distributed coordinator, which is
//! explicitly out of scope); the session *record* itself is what's made
//! durable here.

use crate::traits::{SessionRecord, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kato_core::{Emotives, KatoError, Metadata, Result, SessionConfig};
use std::sync::Arc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::info;

const SCHEMA: &str = r#"
DEFINE TABLE sessions SCHEMAFULL;
DEFINE FIELD session_id ON sessions TYPE string;
DEFINE FIELD kb_id ON sessions TYPE string;
DEFINE FIELD stm ON sessions TYPE array;
DEFINE FIELD emotives_buffer ON sessions TYPE array;
DEFINE FIELD metadata_buffer ON sessions TYPE array;
DEFINE FIELD config ON sessions TYPE object;
DEFINE FIELD created ON sessions TYPE datetime;
DEFINE FIELD last_access ON sessions TYPE datetime;
DEFINE FIELD expires_at ON sessions TYPE datetime;

DEFINE INDEX sessions_session_id ON sessions FIELDS session_id UNIQUE;
"#;

pub struct SurrealSessionStore {
    db: Surreal<Any>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SurrealSessionStore {
    pub async fn connect(endpoint: &str, namespace: &str, database: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(endpoint)
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("connect: {e}")))?;
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("use_ns/use_db: {e}")))?;
        db.query(SCHEMA)
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("schema init: {e}")))?;
        Ok(Self { db, locks: DashMap::new() })
    }

    async fn fetch(&self, session_id: &str) -> Result<SessionRecord> {
        let record: Option<SessionRecord> = self
            .db
            .select(("sessions", session_id))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("select: {e}")))?;
        let record = record.ok_or_else(|| KatoError::session_not_found(session_id))?;
        if record.is_expired(Utc::now()) {
            return Err(KatoError::session_expired(session_id));
        }
        Ok(record)
    }
}

#[async_trait]
impl SessionStore for SurrealSessionStore {
    async fn create(&self, record: SessionRecord) -> Result<()> {
        let session_id = record.session_id.clone();
        let _: Option<SessionRecord> = self
            .db
            .upsert(("sessions", session_id))
            .content(record)
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("create: {e}")))?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionRecord> {
        self.fetch(session_id).await
    }

    async fn update_stm(
        &self,
        session_id: &str,
        stm: Vec<Vec<String>>,
        emotives_buffer: Vec<Emotives>,
        metadata_buffer: Vec<Option<Metadata>>,
    ) -> Result<()> {
        let mut record = self.fetch(session_id).await?;
        record.stm = stm;
        record.emotives_buffer = emotives_buffer;
        record.metadata_buffer = metadata_buffer;
        record.last_access = Utc::now();
        self.create(record).await
    }

    async fn clear_stm(&self, session_id: &str) -> Result<()> {
        let mut record = self.fetch(session_id).await?;
        record.stm.clear();
        record.emotives_buffer.clear();
        record.metadata_buffer.clear();
        record.last_access = Utc::now();
        self.create(record).await
    }

    async fn update_config(&self, session_id: &str, config: SessionConfig) -> Result<()> {
        let mut record = self.fetch(session_id).await?;
        record.config = config;
        self.create(record).await
    }

    async fn extend_ttl(&self, session_id: &str, new_expires_at: DateTime<Utc>) -> Result<()> {
        let mut record = self.fetch(session_id).await?;
        record.expires_at = new_expires_at;
        self.create(record).await
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let _: Option<SessionRecord> = self
            .db
            .delete(("sessions", session_id))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("delete: {e}")))?;
        self.locks.remove(session_id);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut response = self
            .db
            .query("SELECT session_id FROM sessions WHERE expires_at <= $now")
            .bind(("now", now))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("sweep query: {e}")))?;
        let expired: Vec<String> = response
            .take("session_id")
            .map_err(|e| KatoError::storage_unavailable(format!("parse expired ids: {e}")))?;
        for id in &expired {
            self.delete(id).await?;
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
