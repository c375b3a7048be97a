//! Storage-adapter interfaces shared by every backend.
//!
//! The engine never imports a specific backend: it only ever holds a
//! `dyn PatternStore` / `dyn MetadataStore` / `dyn VectorIndexStore` /
//! `dyn SessionStore`. Each trait has an in-process adapter in this crate
//! (`Memory*`) suitable for tests and for a single-process embedded
//! deployment, and a durable adapter backed by SurrealDB or Qdrant for
//! production use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kato_core::{KbId, Pattern, Result, SessionConfig};
use serde::{Deserialize, Serialize};

/// Append-only pattern row store, partitioned by `kb_id`.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// If `pattern.name` already exists in `pattern.kb_id`, increment its
    /// frequency and append its emotives/metadata entry; otherwise insert the
    /// full row with `frequency == 1`. Returns the row as committed, so the
    /// caller can read back the authoritative frequency.
    ///
    /// The write MUST be acknowledged by the underlying store before this
    /// returns `Ok` - learn durability depends on it.
    async fn upsert_or_increment(&self, pattern: Pattern) -> Result<Pattern>;

    /// Fetch a single pattern by name, scoped to `kb_id`.
    async fn get(&self, kb_id: &KbId, name: &str) -> Result<Option<Pattern>>;

    /// Batch fetch by name, scoped to `kb_id`. Missing names are silently
    /// omitted from the result (not an error).
    async fn get_rows(&self, kb_id: &KbId, names: &[String]) -> Result<Vec<Pattern>>;

    /// Stream every row in `kb_id` whose `length` lies within
    /// `[target - max_deviation, target + max_deviation]`. Used by the
    /// `length` filter to push its predicate into the store instead of
    /// scanning the whole partition.
    async fn scan_by_length(
        &self,
        kb_id: &KbId,
        target: usize,
        max_deviation: i64,
    ) -> Result<Vec<Pattern>>;

    /// Stream every row in `kb_id`. Used only by filter stages (or the empty
    /// pipeline) that cannot be served by a narrower predicate.
    async fn scan_all(&self, kb_id: &KbId) -> Result<Vec<Pattern>>;

    /// Number of pattern rows in `kb_id`.
    async fn count(&self, kb_id: &KbId) -> Result<u64>;
}

/// Per-pattern metadata mirror and symbol-frequency counters.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// `symbol:freq:{kb_id}:{symbol}` - total occurrences across all learn
    /// events. Atomic increment; called on every learn, new or repeat.
    async fn incr_symbol_freq(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64>;

    /// `symbol:pmf:{kb_id}:{symbol}` - number of distinct patterns
    /// containing the symbol. Atomic increment; called only when a pattern
    /// is newly created, never on a frequency bump of an existing pattern.
    async fn incr_symbol_pmf(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64>;

    /// Current `freq(s)`, or 0 if the symbol has never been learned.
    async fn symbol_freq(&self, kb_id: &KbId, symbol: &str) -> Result<u64>;

    /// Current `pmf(s)`, or 0 if the symbol has never been learned.
    async fn symbol_pmf(&self, kb_id: &KbId, symbol: &str) -> Result<u64>;

    /// Sum of `freq(s)` over every symbol ever learned in `kb_id`; the
    /// denominator of the symbol probability mass used by the prediction
    /// assembler's entropy computation.
    async fn total_symbol_freq(&self, kb_id: &KbId) -> Result<u64>;
}

/// Dense vector -> symbol resolution.
#[async_trait]
pub trait VectorIndexStore: Send + Sync {
    /// Resolve a dense vector to a `VCTR|<hex>` symbol. Two vectors that
    /// quantize to the same cell MUST resolve to the same token on every
    /// process; the quantization policy is fixed at construction time and
    /// never changes at runtime.
    async fn resolve(&self, vector: &[f32]) -> Result<String>;

    /// Record a vector's first sighting under its resolved symbol. A no-op
    /// for the deterministic quantization scheme used here (the symbol is a
    /// pure function of the vector), but kept as an explicit operation so a
    /// durable adapter can persist the sighting for analytics/rehydration.
    async fn upsert(&self, vector: &[f32], symbol: &str) -> Result<()>;
}

/// One session's durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub kb_id: KbId,
    /// Each event already canonicalized (sorted) at observe time.
    pub stm: Vec<Vec<String>>,
    pub emotives_buffer: Vec<kato_core::Emotives>,
    /// One slot per STM event, parallel to `stm`/`emotives_buffer`; `None`
    /// where that observation carried no metadata. Collapsed into a single
    /// `Metadata` value for the pattern's learn-occurrence entry at learn
    /// time (metadata is per-occurrence, not per-event).
    pub metadata_buffer: Vec<Option<kato_core::Metadata>>,
    pub config: SessionConfig,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Durable mapping from `session_id` to `SessionRecord`.
///
/// All write paths on a single session are serialized by the per-session
/// lock returned from `lock_for`; the store itself does not need to be
/// internally consistent across concurrent callers of the *same* session -
/// the orchestrator guarantees that by holding the lock for the duration of
/// observe/learn/predict/clear/update_config.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, record: SessionRecord) -> Result<()>;

    /// `Err(SessionNotFound)` if unknown, `Err(SessionExpired)` if past TTL.
    async fn get(&self, session_id: &str) -> Result<SessionRecord>;

    async fn update_stm(
        &self,
        session_id: &str,
        stm: Vec<Vec<String>>,
        emotives_buffer: Vec<kato_core::Emotives>,
        metadata_buffer: Vec<Option<kato_core::Metadata>>,
    ) -> Result<()>;

    async fn clear_stm(&self, session_id: &str) -> Result<()>;

    async fn update_config(&self, session_id: &str, config: SessionConfig) -> Result<()>;

    async fn extend_ttl(&self, session_id: &str, new_expires_at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lazily sweep expired sessions. Implementations may perform this
    /// eagerly on every `get`, or as a periodic background pass; the
    /// contract is only that a `get` of an expired session always observes
    /// `SessionExpired`, never stale STM.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Acquire the per-session lock held for the duration of any
    /// state-mutating or state-reading operation that needs a consistent
    /// STM snapshot. Different sessions proceed in parallel.
    async fn lock_for(&self, session_id: &str) -> std::sync::Arc<tokio::sync::Mutex<()>>;
}
