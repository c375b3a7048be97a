//! Deterministic vector quantization underlying every `VectorIndexStore`.
//!
//! The resolution policy - metric, precision, parameters - is fixed at
//! construction and never changes at runtime: two vectors that
//! round to the same quantized cell produce the same `VCTR|<hex>` token on
//! every process, independent of which adapter (in-memory or Qdrant-backed)
//! is in front of it.

use sha1::{Digest, Sha1};

/// Quantizes dense vectors into deterministic symbol tokens by rounding each
/// component to a fixed number of decimal places and hashing the result.
/// This is a nearest-grid-point quantizer, not a learned codebook: any two
/// vectors differing by less than half the grid step in every dimension
/// collapse to the same token.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    /// Number of decimal places each component is rounded to before hashing.
    precision: u32,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self { precision: 3 }
    }
}

impl Quantizer {
    pub fn with_precision(precision: u32) -> Self {
        Self { precision }
    }

    /// Quantize a vector to its grid cell, returning the rounded components
    /// that will be hashed. Exposed so callers (e.g. a durable adapter
    /// persisting a centroid) can store the canonical cell representative.
    pub fn cell(&self, vector: &[f32]) -> Vec<i64> {
        let scale = 10f64.powi(self.precision as i32);
        vector
            .iter()
            .map(|&v| ((v as f64) * scale).round() as i64)
            .collect()
    }

    /// Deterministically map a vector to its `VCTR|<hex>` token.
    pub fn token(&self, vector: &[f32]) -> String {
        let cell = self.cell(vector);
        let mut hasher = Sha1::new();
        for component in &cell {
            hasher.update(component.to_le_bytes());
        }
        let digest = hasher.finalize();
        format!("VCTR|{}", hex_lower(&digest))
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_resolve_identically() {
        let q = Quantizer::default();
        let v = vec![0.123_456, -1.0, 2.5];
        assert_eq!(q.token(&v), q.token(&v));
    }

    #[test]
    fn nearby_vectors_within_grid_step_collapse() {
        let q = Quantizer::with_precision(2);
        let a = vec![1.001, 2.004];
        let b = vec![1.002, 2.003];
        assert_eq!(q.token(&a), q.token(&b));
    }

    #[test]
    fn distant_vectors_resolve_differently() {
        let q = Quantizer::default();
        let a = vec![0.0, 0.0];
        let b = vec![10.0, 10.0];
        assert_ne!(q.token(&a), q.token(&b));
    }

    #[test]
    fn token_has_expected_prefix() {
        let q = Quantizer::default();
        assert!(q.token(&[1.0, 2.0]).starts_with("VCTR|"));
    }
}
