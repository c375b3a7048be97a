//! SurrealDB-backed `MetadataStore` adapter: atomic symbol counters.
//!
//! SurrealQL's `UPDATE ... SET x += $n` is applied atomically per row, which
//! is what the symbol counters need under concurrent learns.

use crate::traits::MetadataStore;
use async_trait::async_trait;
use kato_core::{KatoError, KbId, Result};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

pub struct SurrealMetadataStore {
    db: Surreal<Any>,
}

const SCHEMA: &str = r#"
DEFINE TABLE symbol_stats SCHEMAFULL;
DEFINE FIELD kb_id ON symbol_stats TYPE string;
DEFINE FIELD symbol ON symbol_stats TYPE string;
DEFINE FIELD freq ON symbol_stats TYPE int DEFAULT 0;
DEFINE FIELD pmf ON symbol_stats TYPE int DEFAULT 0;
DEFINE INDEX symbol_stats_kb_symbol ON symbol_stats FIELDS kb_id, symbol UNIQUE;
"#;

fn row_id(kb_id: &KbId, symbol: &str) -> String {
    format!("{}:{}", kb_id, symbol)
}

impl SurrealMetadataStore {
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

    /// `field` is always one of our own constants ("freq" or "pmf"), never
    /// caller input, so interpolating it into the query string is safe.
    async fn incr_field(&self, kb_id: &KbId, symbol: &str, field: &str, by: u64) -> Result<u64> {
        let id = row_id(kb_id, symbol);
        let statement = format!(
            "UPDATE symbol_stats:[$kb, $symbol] MERGE {{ kb_id: $kb, symbol: $symbol }} SET {field} += $by RETURN {field}"
        );
        let mut response = self
            .db
            .query(statement)
            .bind(("kb", kb_id.0.clone()))
            .bind(("symbol", symbol.to_string()))
            .bind(("by", by as i64))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("incr {field} ({id}): {e}")))?;
        let value: Option<i64> = response
            .take(field)
            .map_err(|e| KatoError::storage_unavailable(format!("parse {field}: {e}")))?;
        Ok(value.unwrap_or(0) as u64)
    }
}

#[async_trait]
impl MetadataStore for SurrealMetadataStore {
    async fn incr_symbol_freq(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64> {
        self.incr_field(kb_id, symbol, "freq", by).await
    }

    async fn incr_symbol_pmf(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64> {
        self.incr_field(kb_id, symbol, "pmf", by).await
    }

    async fn symbol_freq(&self, kb_id: &KbId, symbol: &str) -> Result<u64> {
        let id = row_id(kb_id, symbol);
        let row: Option<serde_json::Value> = self
            .db
            .select(("symbol_stats", id))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("select: {e}")))?;
        Ok(row
            .and_then(|v| v.get("freq").and_then(|f| f.as_u64()))
            .unwrap_or(0))
    }

    async fn symbol_pmf(&self, kb_id: &KbId, symbol: &str) -> Result<u64> {
        let id = row_id(kb_id, symbol);
        let row: Option<serde_json::Value> = self
            .db
            .select(("symbol_stats", id))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("select: {e}")))?;
        Ok(row
            .and_then(|v| v.get("pmf").and_then(|f| f.as_u64()))
            .unwrap_or(0))
    }

    async fn total_symbol_freq(&self, kb_id: &KbId) -> Result<u64> {
        let mut response = self
            .db
            .query("SELECT math::sum(freq) AS total FROM symbol_stats WHERE kb_id = $kb GROUP ALL")
            .bind(("kb", kb_id.0.clone()))
            .await
            .map_err(|e| KatoError::storage_unavailable(format!("total_symbol_freq: {e}")))?;
        let total: Option<i64> = response
            .take("total")
            .map_err(|e| KatoError::storage_unavailable(format!("parse total: {e}")))?;
        Ok(total.unwrap_or(0) as u64)
    }
}
