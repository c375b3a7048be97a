//! In-process `MetadataStore` adapter: atomic symbol counters.

use crate::traits::MetadataStore;
use async_trait::async_trait;
use dashmap::DashMap;
use kato_core::{KbId, Result};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryMetadataStore {
    freq: DashMap<(KbId, String), AtomicU64>,
    pmf: DashMap<(KbId, String), AtomicU64>,
    total_freq: DashMap<KbId, AtomicU64>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn incr_symbol_freq(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64> {
        let key = (kb_id.clone(), symbol.to_string());
        let counter = self.freq.entry(key).or_insert_with(|| AtomicU64::new(0));
        let new_val = counter.fetch_add(by, Ordering::SeqCst) + by;
        self.total_freq
            .entry(kb_id.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::SeqCst);
        Ok(new_val)
    }

    async fn incr_symbol_pmf(&self, kb_id: &KbId, symbol: &str, by: u64) -> Result<u64> {
        let key = (kb_id.clone(), symbol.to_string());
        let counter = self.pmf.entry(key).or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(by, Ordering::SeqCst) + by)
    }

    async fn symbol_freq(&self, kb_id: &KbId, symbol: &str) -> Result<u64> {
        Ok(self
            .freq
            .get(&(kb_id.clone(), symbol.to_string()))
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn symbol_pmf(&self, kb_id: &KbId, symbol: &str) -> Result<u64> {
        Ok(self
            .pmf
            .get(&(kb_id.clone(), symbol.to_string()))
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }

    async fn total_symbol_freq(&self, kb_id: &KbId) -> Result<u64> {
        Ok(self
            .total_freq
            .get(kb_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freq_and_pmf_are_independent_counters() {
        let store = MemoryMetadataStore::new();
        let kb = KbId::new("kb");
        store.incr_symbol_freq(&kb, "a", 1).await.unwrap();
        store.incr_symbol_freq(&kb, "a", 1).await.unwrap();
        store.incr_symbol_pmf(&kb, "a", 1).await.unwrap();
        assert_eq!(store.symbol_freq(&kb, "a").await.unwrap(), 2);
        assert_eq!(store.symbol_pmf(&kb, "a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pmf_never_exceeds_freq_under_correct_usage() {
        let store = MemoryMetadataStore::new();
        let kb = KbId::new("kb");
        for _ in 0..5 {
            store.incr_symbol_freq(&kb, "a", 1).await.unwrap();
        }
        store.incr_symbol_pmf(&kb, "a", 1).await.unwrap();
        assert!(store.symbol_pmf(&kb, "a").await.unwrap() <= store.symbol_freq(&kb, "a").await.unwrap());
    }

    #[tokio::test]
    async fn total_symbol_freq_sums_across_symbols() {
        let store = MemoryMetadataStore::new();
        let kb = KbId::new("kb");
        store.incr_symbol_freq(&kb, "a", 3).await.unwrap();
        store.incr_symbol_freq(&kb, "b", 2).await.unwrap();
        assert_eq!(store.total_symbol_freq(&kb).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let store = MemoryMetadataStore::new();
        store.incr_symbol_freq(&KbId::new("kb1"), "a", 1).await.unwrap();
        assert_eq!(store.symbol_freq(&KbId::new("kb2"), "a").await.unwrap(), 0);
    }
}
