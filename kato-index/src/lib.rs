//! MinHash/LSH candidate index.
//!
//! Gives the `minhash` filter stage a sublinear way to narrow a `kb_id`'s
//! pattern set down to candidates that are likely Jaccard-similar to the
//! current STM, before the more expensive exact-similarity stages run.

pub mod lsh;
pub mod minhash;

use dashmap::DashMap;
use kato_core::KbId;
use std::collections::{BTreeSet, HashSet};

pub use lsh::{band_signature, band_signature_default, DEFAULT_BANDS, DEFAULT_ROWS};
pub use minhash::{estimated_jaccard, MinHasher, DEFAULT_WIDTH};

/// The per-pattern output of this component: the signature stored on the
/// `Pattern` row plus the derived band keys used for bucketing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSignature {
    pub minhash_sig: Vec<u64>,
    pub lsh_bands: Vec<u64>,
}

/// In-process MinHash/LSH index, partitioned by `kb_id`. Buckets map
/// `(kb_id, band_index, band_hash) -> pattern names`; a query bands the
/// probe signature the same way and unions the matching buckets.
pub struct LshIndex {
    hasher: MinHasher,
    bands: usize,
    rows: usize,
    buckets: DashMap<(KbId, usize, u64), HashSet<String>>,
}

impl Default for LshIndex {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_BANDS, DEFAULT_ROWS)
    }
}

impl LshIndex {
    pub fn new(width: usize, bands: usize, rows: usize) -> Self {
        assert_eq!(width, bands * rows, "minhash width must equal bands * rows");
        Self {
            hasher: MinHasher::new(width),
            bands,
            rows,
            buckets: DashMap::new(),
        }
    }

    /// Compute the signature and band keys for a token set. Call this once
    /// per pattern at learn time and store the result on the `Pattern` row;
    /// call it again per STM snapshot at predict time to query candidates.
    pub fn signature_of(&self, tokens: &BTreeSet<String>) -> PatternSignature {
        let minhash_sig = self.hasher.signature_of_set(tokens);
        let lsh_bands = band_signature(&minhash_sig, self.bands, self.rows);
        PatternSignature { minhash_sig, lsh_bands }
    }

    /// Register a pattern's band keys in every bucket they fall into.
    /// Idempotent: re-inserting the same `(kb_id, name)` is a no-op beyond
    /// the first time.
    pub fn insert(&self, kb_id: &KbId, pattern_name: &str, lsh_bands: &[u64]) {
        for (band_index, &band_hash) in lsh_bands.iter().enumerate() {
            self.buckets
                .entry((kb_id.clone(), band_index, band_hash))
                .or_default()
                .insert(pattern_name.to_string());
        }
    }

    /// Union of every bucket the probe signature's bands fall into, within
    /// `kb_id`. Empty if nothing shares a band with the probe - the caller
    /// falls back to `scan_all` in that case.
    pub fn candidates(&self, kb_id: &KbId, lsh_bands: &[u64]) -> HashSet<String> {
        let mut out = HashSet::new();
        for (band_index, &band_hash) in lsh_bands.iter().enumerate() {
            if let Some(bucket) = self.buckets.get(&(kb_id.clone(), band_index, band_hash)) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }

    pub fn width(&self) -> usize {
        self.hasher.width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn inserted_pattern_is_its_own_candidate() {
        let index = LshIndex::default();
        let kb = KbId::new("kb1");
        let sig = index.signature_of(&set(&["a", "b", "c"]));
        index.insert(&kb, "PTRN|abc", &sig.lsh_bands);
        let found = index.candidates(&kb, &sig.lsh_bands);
        assert!(found.contains("PTRN|abc"));
    }

    #[test]
    fn different_kb_ids_are_isolated() {
        let index = LshIndex::default();
        let sig = index.signature_of(&set(&["a", "b", "c"]));
        index.insert(&KbId::new("kb1"), "PTRN|abc", &sig.lsh_bands);
        let found = index.candidates(&KbId::new("kb2"), &sig.lsh_bands);
        assert!(found.is_empty());
    }

    #[test]
    fn disjoint_token_sets_rarely_share_a_bucket() {
        let index = LshIndex::default();
        let kb = KbId::new("kb1");
        let a = index.signature_of(&set(&["a", "b", "c"]));
        let b = index.signature_of(&set(&["x", "y", "z"]));
        index.insert(&kb, "PTRN|a", &a.lsh_bands);
        let found = index.candidates(&kb, &b.lsh_bands);
        assert!(!found.contains("PTRN|a"));
    }

    #[test]
    #[should_panic]
    fn mismatched_width_panics() {
        LshIndex::new(100, 32, 4);
    }
}
