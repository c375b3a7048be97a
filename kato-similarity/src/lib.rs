//! Difflib-compatible similarity and temporal segmentation.
//!
//! Has no storage dependency: given a flattened STM and a candidate
//! pattern's canonical events, this crate alone computes the similarity
//! ratio and the past/present/future/matches/missing/extras split.

pub mod matcher;
pub mod segmentation;

pub use matcher::{MatchBlock, SequenceMatcher};
pub use segmentation::{align, Segmentation};

/// Token-mode ratio: symbols are atomic units (the default per
/// `use_token_matching = true`).
pub fn token_ratio(s: &[String], p: &[String]) -> f64 {
    SequenceMatcher::new(s, p).ratio()
}

/// Character-mode ratio, for `use_token_matching = false` deployments.
/// Symbols are joined with a single space before comparison; the separator
/// only matters for determinism (any two runs must agree), not for a
/// specific byte layout, so this is a fixed, documented choice rather than
/// a load-bearing wire format.
pub fn char_ratio(s: &[String], p: &[String]) -> f64 {
    let s_chars: Vec<char> = s.join(" ").chars().collect();
    let p_chars: Vec<char> = p.join(" ").chars().collect();
    SequenceMatcher::new(&s_chars, &p_chars).ratio()
}

/// Dispatches to [`token_ratio`] or [`char_ratio`] per `use_token_matching`.
/// This is the ratio reported on the `Prediction`; segmentation itself
/// always runs in token space (see [`segmentation::align`]).
pub fn ratio(s: &[String], p: &[String], use_token_matching: bool) -> f64 {
    if use_token_matching {
        token_ratio(s, p)
    } else {
        char_ratio(s, p)
    }
}
