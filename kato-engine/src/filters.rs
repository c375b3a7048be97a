//! Ordered, configurable candidate-reducer chain over a `kb_id` partition.
//!
//! Each enabled stage narrows the previous stage's survivors; stages that can
//! push their predicate into the pattern store (`length`, `minhash`) do so on
//! the first hop to avoid a full partition scan. Failure is fail-fast: any
//! store error aborts the pipeline immediately, never falling back to a
//! wider scan.

use kato_core::{FilterKind, KbId, Pattern, Result, SessionConfig};
use kato_index::LshIndex;
use kato_storage::PatternStore;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::debug;

pub struct FilterContext<'a> {
    pub kb_id: &'a KbId,
    pub stm_tokens: &'a BTreeSet<String>,
    pub stm_flat: &'a [String],
    pub config: &'a SessionConfig,
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Run the configured filter pipeline and return the surviving pattern rows.
/// An empty `filter_pipeline` yields every row in `kb_id` - no pre-filtering.
pub async fn run_pipeline(
    ctx: &FilterContext<'_>,
    pattern_store: &dyn PatternStore,
    lsh_index: &LshIndex,
) -> Result<Vec<Pattern>> {
    if ctx.config.filter_pipeline.is_empty() {
        return pattern_store.scan_all(ctx.kb_id).await;
    }

    let mut candidates: Option<Vec<Pattern>> = None;
    for (idx, stage) in ctx.config.filter_pipeline.iter().enumerate() {
        let started = Instant::now();
        let input = match candidates.take() {
            Some(v) => v,
            None => fetch_initial(*stage, ctx, pattern_store, lsh_index).await?,
        };
        let before = input.len();
        let survivors = apply_stage(*stage, ctx, input, lsh_index);
        debug!(
            stage_index = idx,
            stage = ?stage,
            before,
            after = survivors.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "filter stage"
        );
        candidates = Some(survivors);
    }
    Ok(candidates.unwrap_or_default())
}

/// First-stage fetch: push the predicate into the store where a narrower
/// scan exists, otherwise fall back to a full partition scan (still correct,
/// just not sublinear - `apply_stage` re-applies the exact predicate either
/// way).
async fn fetch_initial(
    stage: FilterKind,
    ctx: &FilterContext<'_>,
    pattern_store: &dyn PatternStore,
    lsh_index: &LshIndex,
) -> Result<Vec<Pattern>> {
    match stage {
        FilterKind::Length => {
            pattern_store
                .scan_by_length(ctx.kb_id, ctx.stm_flat.len(), ctx.config.length_max_deviation)
                .await
        }
        FilterKind::Minhash => {
            let sig = lsh_index.signature_of(ctx.stm_tokens);
            let names: Vec<String> = lsh_index.candidates(ctx.kb_id, &sig.lsh_bands).into_iter().collect();
            pattern_store.get_rows(ctx.kb_id, &names).await
        }
        FilterKind::Jaccard | FilterKind::Rapidfuzz => pattern_store.scan_all(ctx.kb_id).await,
    }
}

fn apply_stage(
    stage: FilterKind,
    ctx: &FilterContext<'_>,
    input: Vec<Pattern>,
    lsh_index: &LshIndex,
) -> Vec<Pattern> {
    match stage {
        FilterKind::Length => input
            .into_iter()
            .filter(|p| {
                (p.length as i64 - ctx.stm_flat.len() as i64).abs() <= ctx.config.length_max_deviation
            })
            .collect(),
        FilterKind::Jaccard => input
            .into_iter()
            .filter(|p| jaccard(ctx.stm_tokens, &p.token_set) >= ctx.config.jaccard_min_similarity)
            .collect(),
        FilterKind::Minhash => {
            let sig = lsh_index.signature_of(ctx.stm_tokens);
            let bucketed = lsh_index.candidates(ctx.kb_id, &sig.lsh_bands);
            input
                .into_iter()
                .filter(|p| {
                    bucketed.contains(&p.name)
                        && kato_index::estimated_jaccard(&sig.minhash_sig, &p.minhash_sig)
                            >= ctx.config.minhash_jaccard_threshold
                })
                .collect()
        }
        FilterKind::Rapidfuzz => input
            .into_iter()
            .filter(|p| {
                let flat = p.flattened();
                let ratio = kato_similarity::ratio(ctx.stm_flat, &flat, ctx.config.use_token_matching);
                ratio * 100.0 >= ctx.config.rapidfuzz_min_score
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kato_core::canon;
    use kato_storage::MemoryPatternStore;

    fn make_pattern(kb_id: &KbId, events: &[&[&str]]) -> Pattern {
        let raw: Vec<Vec<String>> = events
            .iter()
            .map(|ev| ev.iter().map(|s| s.to_string()).collect())
            .collect();
        let canonical = canon::canonicalize_pattern(&raw);
        Pattern::new(kb_id.clone(), canonical, Default::default(), serde_json::Value::Null)
    }

    #[tokio::test]
    async fn empty_pipeline_returns_every_row() {
        let kb = KbId::new("kb1");
        let store = MemoryPatternStore::new();
        store.upsert_or_increment(make_pattern(&kb, &[&["a", "b"]])).await.unwrap();
        store.upsert_or_increment(make_pattern(&kb, &[&["c"]])).await.unwrap();

        let cfg = SessionConfig::default();
        let stm_tokens: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let stm_flat = vec!["a".to_string()];
        let ctx = FilterContext { kb_id: &kb, stm_tokens: &stm_tokens, stm_flat: &stm_flat, config: &cfg };
        let index = LshIndex::default();

        let out = run_pipeline(&ctx, &store, &index).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn length_filter_rejects_distant_patterns() {
        let kb = KbId::new("kb1");
        let store = MemoryPatternStore::new();
        store.upsert_or_increment(make_pattern(&kb, &[&["a", "b"]])).await.unwrap();
        store
            .upsert_or_increment(make_pattern(&kb, &[&["c", "d", "e", "f", "g", "h"]]))
            .await
            .unwrap();

        let mut cfg = SessionConfig::default();
        cfg.filter_pipeline = vec![FilterKind::Length];
        cfg.length_max_deviation = 0;
        let stm_tokens: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let stm_flat = vec!["a".to_string(), "b".to_string()];
        let ctx = FilterContext { kb_id: &kb, stm_tokens: &stm_tokens, stm_flat: &stm_flat, config: &cfg };
        let index = LshIndex::default();

        let out = run_pipeline(&ctx, &store, &index).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].length, 2);
    }

    #[tokio::test]
    async fn jaccard_filter_enforces_threshold() {
        let kb = KbId::new("kb1");
        let store = MemoryPatternStore::new();
        store.upsert_or_increment(make_pattern(&kb, &[&["a", "b"]])).await.unwrap();
        store.upsert_or_increment(make_pattern(&kb, &[&["x", "y"]])).await.unwrap();

        let mut cfg = SessionConfig::default();
        cfg.filter_pipeline = vec![FilterKind::Jaccard];
        cfg.jaccard_min_similarity = 0.5;
        let stm_tokens: BTreeSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let stm_flat = vec!["a".to_string(), "b".to_string()];
        let ctx = FilterContext { kb_id: &kb, stm_tokens: &stm_tokens, stm_flat: &stm_flat, config: &cfg };
        let index = LshIndex::default();

        let out = run_pipeline(&ctx, &store, &index).await.unwrap();
        assert_eq!(out.len(), 1);
    }
}
