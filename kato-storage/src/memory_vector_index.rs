//! In-process `VectorIndexStore` adapter.

use crate::quantize::Quantizer;
use crate::traits::VectorIndexStore;
use async_trait::async_trait;
use dashmap::DashMap;
use kato_core::Result;

pub struct MemoryVectorIndex {
    quantizer: Quantizer,
    /// First vector sighted under each token; kept for diagnostics only, not
    /// consulted by `resolve` (which is a pure function of the input).
    sightings: DashMap<String, Vec<f32>>,
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new(Quantizer::default())
    }
}

impl MemoryVectorIndex {
    pub fn new(quantizer: Quantizer) -> Self {
        Self {
            quantizer,
            sightings: DashMap::new(),
        }
    }
}

#[async_trait]
impl VectorIndexStore for MemoryVectorIndex {
    async fn resolve(&self, vector: &[f32]) -> Result<String> {
        Ok(self.quantizer.token(vector))
    }

    async fn upsert(&self, vector: &[f32], symbol: &str) -> Result<()> {
        self.sightings.entry(symbol.to_string()).or_insert_with(|| vector.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_is_deterministic_across_calls() {
        let idx = MemoryVectorIndex::default();
        let v = vec![0.1, 0.2, 0.3];
        let a = idx.resolve(&v).await.unwrap();
        let b = idx.resolve(&v).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn resolved_token_is_a_vctr_symbol() {
        let idx = MemoryVectorIndex::default();
        let token = idx.resolve(&[1.0, 2.0]).await.unwrap();
        assert!(token.starts_with("VCTR|"));
    }
}
