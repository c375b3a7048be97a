//! SurrealDB-backed `PatternStore` adapter, for durable deployments.
//!
//! Uses the `Any` engine: connect once, `use_ns`/`use_db`, then `upsert`/
//! `select`/`query` against a single `patterns` table. Every write is
//! awaited before this returns - no fire-and-forget durability.

use crate::traits::PatternStore;
use async_trait::async_trait;
use kato_core::{KatoError, KbId, Pattern, Result};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

pub struct SurrealPatternStore {
    db: Surreal<Any>,
}

const SCHEMA: &str = r#"
DEFINE TABLE patterns SCHEMAFULL;
DEFINE FIELD name ON patterns TYPE string;
DEFINE FIELD kb_id ON patterns TYPE string;
DEFINE FIELD pattern_data ON patterns TYPE array;
DEFINE FIELD length ON patterns TYPE int;
DEFINE FIELD token_set ON patterns TYPE array;
DEFINE FIELD minhash_sig ON patterns TYPE array;
DEFINE FIELD lsh_bands ON patterns TYPE array;
DEFINE FIELD frequency ON patterns TYPE int DEFAULT 0;
DEFINE FIELD emotives ON patterns TYPE array DEFAULT [];
DEFINE FIELD metadata ON patterns TYPE array DEFAULT [];

DEFINE INDEX patterns_kb_name ON patterns FIELDS kb_id, name UNIQUE;
DEFINE INDEX patterns_kb_length ON patterns FIELDS kb_id, length;
"#;

fn row_id(kb_id: &KbId, name: &str) -> String {
    format!("{}:{}", kb_id, name)
}

impl SurrealPatternStore {
    /// Connect to `endpoint` (e.g. `mem://` or `ws://host:port`) and ensure
    /// the schema exists. `endpoint == "mem://"` is the embedded, in-process
    /// mode used by tests and small deployments; any other value is a real
    /// SurrealDB server.
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
        Ok(Self { db })
    }
}

#[async_trait]
impl PatternStore for SurrealPatternStore {
    async fn upsert_or_increment(&self, pattern: Pattern) -> Result<Pattern> {
        let id = row_id(&pattern.kb_id, &pattern.name);
        // A select-then-upsert here would be check-then-act: two sessions
        // racing to learn the same brand-new pattern could both select
        // `None` and both write `frequency: 1`, losing one increment. `SET
        // frequency += 1` is applied atomically by SurrealDB against the row
        // (creating it at the schema's `DEFAULT 0` first if absent, the same
        // MERGE+SET shape `SurrealMetadataStore::incr_field` uses for the
        // symbol counters), so this single statement is both the existence
        // check and the write.
        let mut response = self
            .db
            .query(
                "UPDATE type::thing('patterns', $id) MERGE {
                    name: $name,
                    kb_id: $kb_id,
                    pattern_data: $pattern_data,
                    length: $length,
                    token_set: $token_set,
                    minhash_sig: $minhash_sig,
                    lsh_bands: $lsh_bands
                } SET frequency += 1, emotives += $emotives, metadata += $metadata",
            )
            .bind(("id", id))
            .bind(("name", pattern.name.clone()))
            .bind(("kb_id", pattern.kb_id.0.clone()))
            .bind(("pattern_data", pattern.pattern_data.clone()))
            .bind(("length", pattern.length as i64))
            .bind(("token_set", pattern.token_set.clone()))
            .bind(("minhash_sig", pattern.minhash_sig.clone()))
            .bind(("lsh_bands", pattern.lsh_bands.clone()))
            .bind(("emotives", pattern.emotives.clone()))
            .bind(("metadata", pattern.metadata.clone()))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("upsert_or_increment: {e}")))?;

        let written: Option<Pattern> = response
            .take(0)
            .map_err(|e| KatoError::storage_unavailable(format!("parse row: {e}")))?;

        written.ok_or_else(|| {
            KatoError::invariant_violation("upsert acknowledged but returned no row")
        })
    }

    async fn get(&self, kb_id: &KbId, name: &str) -> Result<Option<Pattern>> {
        let id = row_id(kb_id, name);
        self.db
            .select(("patterns", id))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("select: {e}")))
    }

    async fn get_rows(&self, kb_id: &KbId, names: &[String]) -> Result<Vec<Pattern>> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(p) = self.get(kb_id, name).await? {
                out.push(p);
            }
        }
        Ok(out)
    }

    async fn scan_by_length(
        &self,
        kb_id: &KbId,
        target: usize,
        max_deviation: i64,
    ) -> Result<Vec<Pattern>> {
        let lo = (target as i64 - max_deviation).max(0);
        let hi = target as i64 + max_deviation;
        let mut response = self
            .db
            .query("SELECT * FROM patterns WHERE kb_id = $kb AND length >= $lo AND length <= $hi")
            .bind(("kb", kb_id.0.clone()))
            .bind(("lo", lo))
            .bind(("hi", hi))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("scan_by_length: {e}")))?;
        response
            .take(0)
            .map_err(|e| KatoError::storage_unavailable(format!("parse rows: {e}")))
    }

    async fn scan_all(&self, kb_id: &KbId) -> Result<Vec<Pattern>> {
        let mut response = self
            .db
            .query("SELECT * FROM patterns WHERE kb_id = $kb")
            .bind(("kb", kb_id.0.clone()))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("scan_all: {e}")))?;
        response
            .take(0)
            .map_err(|e| KatoError::storage_unavailable(format!("parse rows: {e}")))
    }

    async fn count(&self, kb_id: &KbId) -> Result<u64> {
        let mut response = self
            .db
            .query("SELECT count() FROM patterns WHERE kb_id = $kb GROUP ALL")
            .bind(("kb", kb_id.0.clone()))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("count: {e}")))?;
        let count: Option<i64> = response
            .take("count")
            .map_err(|e| KatoError::storage_unavailable(format!("parse count: {e}")))?;
        Ok(count.unwrap_or(0) as u64)
    }
}
