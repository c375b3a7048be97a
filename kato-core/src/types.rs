//! Shared data-model types for the KATO pattern-matching core.

use crate::canon::{self, RawEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A partition namespace isolating patterns, metadata, symbol stats, and
/// sessions for one logical processor. Two different `KbId`s never share
/// state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KbId(pub String);

impl KbId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for KbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KbId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KbId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A named mapping from emotive key to scalar value, attached to one
/// learn-occurrence of a pattern, or buffered for the current STM.
pub type Emotives = BTreeMap<String, f64>;

/// Opaque, caller-supplied metadata attached verbatim to one learn-occurrence.
pub type Metadata = serde_json::Value;

/// A learned pattern: canonical events, content-addressed identity, and the
/// bookkeeping that accrues on repeated learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// `PTRN|<sha1 hex>` - immutable, content-addressed.
    pub name: String,
    pub kb_id: KbId,
    /// Canonical events: internally sorted, in original observed order.
    pub pattern_data: Vec<RawEvent>,
    /// `sum(len(ev) for ev in pattern_data)`.
    pub length: usize,
    /// Deduplicated flat set of symbols across `pattern_data`.
    pub token_set: BTreeSet<String>,
    /// MinHash signature over `token_set`.
    pub minhash_sig: Vec<u64>,
    /// LSH band hashes derived from `minhash_sig`.
    pub lsh_bands: Vec<u64>,
    /// Learn-count; `frequency >= 1` for any persisted pattern.
    pub frequency: u64,
    /// One entry per learn-occurrence; `emotives.len() == frequency`.
    pub emotives: Vec<Emotives>,
    /// One entry per learn-occurrence; `metadata.len() == frequency`.
    pub metadata: Vec<Metadata>,
}

impl Pattern {
    /// Build a brand-new pattern (`frequency == 1`) from a canonical STM
    /// snapshot. The caller is responsible for filling in `minhash_sig` and
    /// `lsh_bands` - that's the index's job, computed once `token_set` is
    /// known.
    pub fn new(kb_id: KbId, canonical_events: Vec<RawEvent>, emotives: Emotives, metadata: Metadata) -> Self {
        let name = canon::pattern_name(&canonical_events);
        let length = canon::flattened_length(&canonical_events);
        let token_set = canon::token_set(&canonical_events);
        Self {
            name,
            kb_id,
            pattern_data: canonical_events,
            length,
            token_set,
            minhash_sig: Vec::new(),
            lsh_bands: Vec::new(),
            frequency: 1,
            emotives: vec![emotives],
            metadata: vec![metadata],
        }
    }

    /// Flatten `pattern_data` into one symbol sequence, duplicates and all,
    /// in event order. Used by the similarity engine.
    pub fn flattened(&self) -> Vec<String> {
        canon::flatten(&self.pattern_data)
    }

    /// Arithmetic mean, key-wise, of every recorded emotive occurrence.
    pub fn mean_emotives(&self) -> BTreeMap<String, f64> {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for occurrence in &self.emotives {
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
}

/// One call to `observe`: symbols plus optional dense vectors (already
/// resolved to `VCTR|...` symbols by the caller of the observation pipeline),
/// emotive values, and opaque metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub symbols: Vec<String>,
    /// Raw dense vectors; resolved to `VCTR|<hex>` symbols by C6 before the
    /// event is canonicalized.
    pub vectors: Vec<Vec<f32>>,
    pub emotives: Emotives,
    pub metadata: Option<Metadata>,
}

/// A ranked prediction returned by `predict`. Field names are part of the
/// external contract and should not be renamed casually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub similarity: f64,
    pub frequency: u64,
    pub past: Vec<RawEvent>,
    pub present: Vec<RawEvent>,
    pub future: Vec<RawEvent>,
    pub matches: Vec<String>,
    pub missing: Vec<String>,
    pub extras: Vec<String>,
    pub emotives: BTreeMap<String, f64>,
    pub entropy: f64,
    pub potential: f64,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pattern_has_frequency_one() {
        let events = canon::canonicalize_pattern(&[vec!["a".to_string()]]);
        let p = Pattern::new(
            KbId::new("kb1"),
            events,
            Emotives::new(),
            serde_json::Value::Null,
        );
        assert_eq!(p.frequency, 1);
        assert_eq!(p.emotives.len(), 1);
        assert_eq!(p.metadata.len(), 1);
    }

    #[test]
    fn mean_emotives_averages_key_wise() {
        let events = canon::canonicalize_pattern(&[vec!["a".to_string()]]);
        let mut p = Pattern::new(
            KbId::new("kb1"),
            events,
            [("x".to_string(), 1.0)].into_iter().collect(),
            serde_json::Value::Null,
        );
        p.emotives.push([("x".to_string(), 3.0)].into_iter().collect());
        p.emotives.push([("x".to_string(), 2.0)].into_iter().collect());
        let means = p.mean_emotives();
        assert_eq!(means["x"], 2.0);
    }
}
