//! Locality-sensitive banding over a MinHash signature.
//!
//! A signature of width `H = B * R` is split into `B` disjoint bands of `R`
//! consecutive rows; each band is folded into one `u64` bucket key. Two
//! patterns that share a bucket key in any band are Jaccard-similar with high
//! probability - this is the candidate filter the `minhash` pipeline stage
//! consults before falling back to an exact signature comparison.

/// Deployment-pinned band count. With `R = 4` this requires `H = 128`.
pub const DEFAULT_BANDS: usize = 32;

/// Deployment-pinned rows per band.
pub const DEFAULT_ROWS: usize = 4;

/// Fold `rows` consecutive signature entries into one bucket key. Order
/// matters (rotate-free), and reusing `splitmix64` keeps this consistent
/// with the rest of the hashing in this crate.
fn fold_band(rows: &[u64]) -> u64 {
    let mut acc: u64 = 0xcbf29ce484222325;
    for &r in rows {
        acc ^= r;
        acc = acc.wrapping_mul(0x100000001b3);
    }
    acc
}

/// Split a MinHash signature into `bands` bucket keys of `rows` rows each.
/// Panics if `signature.len() != bands * rows` - this is a programmer error
/// (the caller controls both the hasher width and the banding scheme), not a
/// runtime condition.
pub fn band_signature(signature: &[u64], bands: usize, rows: usize) -> Vec<u64> {
    assert_eq!(
        signature.len(),
        bands * rows,
        "signature width must equal bands * rows"
    );
    signature
        .chunks_exact(rows)
        .take(bands)
        .map(fold_band)
        .collect()
}

pub fn band_signature_default(signature: &[u64]) -> Vec<u64> {
    band_signature(signature, DEFAULT_BANDS, DEFAULT_ROWS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_one_key_per_band() {
        let sig: Vec<u64> = (0..128).collect();
        let bands = band_signature_default(&sig);
        assert_eq!(bands.len(), DEFAULT_BANDS);
    }

    #[test]
    fn identical_signatures_band_identically() {
        let sig: Vec<u64> = (0..128).map(|i| i * 7).collect();
        assert_eq!(band_signature_default(&sig), band_signature_default(&sig));
    }

    #[test]
    fn differing_signature_usually_bands_differently() {
        let a: Vec<u64> = (0..128).collect();
        let mut b = a.clone();
        b[0] += 1;
        assert_ne!(band_signature_default(&a), band_signature_default(&b));
    }

    #[test]
    #[should_panic]
    fn wrong_width_panics() {
        let sig: Vec<u64> = (0..10).collect();
        band_signature_default(&sig);
    }
}
