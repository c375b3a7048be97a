//! Prediction assembler: ranks surviving candidates and attaches
//! entropy/potential/confidence.
//!
//! `potential` and `confidence` are left as deployment choices upstream; the
//! formulas below are the ones this deployment fixes, both total-order-stable
//! and independent of candidate iteration order.

use kato_core::{KbId, Pattern, Prediction, Result};
use kato_similarity::Segmentation;
use kato_storage::MetadataStore;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// `p(s) = freq(s) / total`, Laplace-smoothed so an unseen symbol (freq 0)
/// still carries a nonzero but small probability instead of forcing `ln(0)`.
/// When nothing has ever been learned in this `kb_id` (`total == 0`) every
/// symbol is treated as fully expected (`p = 1`, zero information) - there's
/// no statistic to be surprised against yet.
fn symbol_probability(freq: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else if freq == 0 {
        1.0 / (total as f64 + 1.0)
    } else {
        freq as f64 / total as f64
    }
}

/// Shannon entropy, in nats, of the present region's symbol distribution.
async fn present_entropy(metadata: &dyn MetadataStore, kb_id: &KbId, present_symbols: &BTreeSet<String>, total: u64) -> Result<f64> {
    let mut entropy = 0.0;
    for symbol in present_symbols {
        let freq = metadata.symbol_freq(kb_id, symbol).await?;
        let p = symbol_probability(freq, total);
        if p > 0.0 {
            entropy += -p * p.ln();
        }
    }
    Ok(entropy)
}

/// Total self-information (`-ln p(s)`, summed) carried by the symbols this
/// prediction forecasts but the STM hasn't observed yet - the `missing ∪
/// future` set. Rarer predicted symbols contribute more; a candidate whose
/// unobserved tail is all common symbols contributes little.
async fn unobserved_information(
    metadata: &dyn MetadataStore,
    kb_id: &KbId,
    unseen_symbols: &BTreeSet<String>,
    total: u64,
) -> Result<f64> {
    let mut info = 0.0;
    for symbol in unseen_symbols {
        let freq = metadata.symbol_freq(kb_id, symbol).await?;
        let p = symbol_probability(freq, total);
        info += -p.ln();
    }
    Ok(info)
}

/// `similarity * (1 - 1/(1 + ln(1 + frequency)))`, this deployment's fixed
/// confidence formula. Bounded in `[0, similarity)`:
/// more learn-occurrences of a pattern push confidence toward (but never to)
/// its similarity ceiling.
fn confidence(similarity: f64, frequency: u64) -> f64 {
    similarity * (1.0 - 1.0 / (1.0 + (1.0 + frequency as f64).ln()))
}

pub async fn assemble(
    metadata: &dyn MetadataStore,
    kb_id: &KbId,
    pattern: &Pattern,
    seg: Segmentation,
) -> Result<Prediction> {
    let total = metadata.total_symbol_freq(kb_id).await?;

    let present_symbols: BTreeSet<String> = seg.present.iter().flatten().cloned().collect();
    let entropy = present_entropy(metadata, kb_id, &present_symbols, total).await?;

    let unseen_symbols: BTreeSet<String> = seg
        .missing
        .iter()
        .cloned()
        .chain(seg.future.iter().flatten().cloned())
        .collect();
    let future_info = unobserved_information(metadata, kb_id, &unseen_symbols, total).await?;

    let potential = seg.similarity * (1.0 + future_info);
    let confidence = confidence(seg.similarity, pattern.frequency);

    Ok(Prediction {
        name: pattern.name.clone(),
        similarity: seg.similarity,
        frequency: pattern.frequency,
        past: seg.past,
        present: seg.present,
        future: seg.future,
        matches: seg.matches,
        missing: seg.missing,
        extras: seg.extras,
        emotives: pattern.mean_emotives(),
        entropy,
        potential,
        confidence,
    })
}

/// Sort by `potential` desc, tie-break `similarity` desc, then `frequency`
/// desc, then `name` asc - a total order independent of input order, so
/// ranking is a deterministic function of unordered content.
pub fn rank(mut predictions: Vec<Prediction>, max_predictions: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| {
        b.potential
            .partial_cmp(&a.potential)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal))
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.name.cmp(&b.name))
    });
    predictions.truncate(max_predictions);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_zero_for_zero_similarity() {
        assert_eq!(confidence(0.0, 100), 0.0);
    }

    #[test]
    fn confidence_increases_with_frequency() {
        let low = confidence(0.5, 1);
        let high = confidence(0.5, 1000);
        assert!(high > low);
        assert!(high < 0.5);
    }

    #[test]
    fn symbol_probability_handles_empty_corpus() {
        assert_eq!(symbol_probability(0, 0), 1.0);
    }

    #[test]
    fn rank_orders_by_potential_then_tiebreaks() {
        let base = |name: &str, potential: f64, similarity: f64, frequency: u64| Prediction {
            name: name.to_string(),
            similarity,
            frequency,
            past: Vec::new(),
            present: Vec::new(),
            future: Vec::new(),
            matches: Vec::new(),
            missing: Vec::new(),
            extras: Vec::new(),
            emotives: Default::default(),
            entropy: 0.0,
            potential,
            confidence: 0.0,
        };
        let preds = vec![
            base("b", 0.5, 0.5, 1),
            base("a", 0.9, 0.5, 1),
            base("c", 0.9, 0.5, 1),
        ];
        let ranked = rank(preds, 10);
        assert_eq!(ranked[0].name, "a");
        assert_eq!(ranked[1].name, "c");
        assert_eq!(ranked[2].name, "b");
    }

    #[test]
    fn rank_applies_max_predictions_cap() {
        let base = |name: &str| Prediction {
            name: name.to_string(),
            similarity: 0.5,
            frequency: 1,
            past: Vec::new(),
            present: Vec::new(),
            future: Vec::new(),
            matches: Vec::new(),
            missing: Vec::new(),
            extras: Vec::new(),
            emotives: Default::default(),
            entropy: 0.0,
            potential: 0.5,
            confidence: 0.0,
        };
        let preds = vec![base("a"), base("b"), base("c")];
        let ranked = rank(preds, 2);
        assert_eq!(ranked.len(), 2);
    }
}
