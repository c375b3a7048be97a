//! Temporal segmentation of a candidate pattern against an STM.
//!
//! Given where a pattern's events align against the current STM, splits the
//! pattern into `past` (before the alignment), `present` (the aligned span),
//! and `future` (after it), and derives `matches`/`missing`/`extras` as
//! multiset differences over the present region.

use crate::matcher::SequenceMatcher;
use kato_core::canon::RawEvent;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub similarity: f64,
    pub past: Vec<RawEvent>,
    pub present: Vec<RawEvent>,
    pub future: Vec<RawEvent>,
    pub matches: Vec<String>,
    pub missing: Vec<String>,
    pub extras: Vec<String>,
}

fn event_boundaries(events: &[RawEvent]) -> Vec<usize> {
    let mut bounds = Vec::with_capacity(events.len() + 1);
    let mut acc = 0;
    bounds.push(0);
    for ev in events {
        acc += ev.len();
        bounds.push(acc);
    }
    bounds
}

/// Index of the event containing flat position `idx`, given that event's
/// exclusive-end prefix sums (`boundaries[0] == 0`, `boundaries[n] ==
/// total_len`).
fn event_of(boundaries: &[usize], idx: usize) -> usize {
    match boundaries.binary_search(&(idx + 1)) {
        Ok(i) => i.saturating_sub(1).min(boundaries.len().saturating_sub(2)),
        Err(i) => i.saturating_sub(1),
    }
}

fn multiset(symbols: &[String]) -> BTreeMap<String, usize> {
    let mut m = BTreeMap::new();
    for s in symbols {
        *m.entry(s.clone()).or_insert(0) += 1;
    }
    m
}

fn flatten_multiset(m: &BTreeMap<String, usize>) -> Vec<String> {
    let mut out = Vec::new();
    for (sym, count) in m {
        for _ in 0..*count {
            out.push(sym.clone());
        }
    }
    out
}

fn subtract(a: &BTreeMap<String, usize>, b: &BTreeMap<String, usize>) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for (k, &v) in a {
        let remaining = v.saturating_sub(*b.get(k).unwrap_or(&0));
        if remaining > 0 {
            out.insert(k.clone(), remaining);
        }
    }
    out
}

fn intersect(a: &BTreeMap<String, usize>, b: &BTreeMap<String, usize>) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for (k, &v) in a {
        let shared = v.min(*b.get(k).unwrap_or(&0));
        if shared > 0 {
            out.insert(k.clone(), shared);
        }
    }
    out
}

/// Align a flattened STM against a pattern's canonical events. Always uses
/// token-granularity matching blocks: the `past`/`present`/`future` shape of
/// a `Prediction` is inherently event-based, so the character-mode ratio
/// (see [`crate::char_ratio`]) only ever substitutes for the *reported*
/// similarity score, never for this segmentation.
pub fn align(stm_flat: &[String], pattern_events: &[RawEvent]) -> Segmentation {
    let p_flat: Vec<String> = pattern_events.iter().flatten().cloned().collect();

    if stm_flat.is_empty() || p_flat.is_empty() {
        return Segmentation {
            similarity: 0.0,
            past: Vec::new(),
            present: Vec::new(),
            future: pattern_events.to_vec(),
            matches: Vec::new(),
            missing: Vec::new(),
            extras: Vec::new(),
        };
    }

    let sm = SequenceMatcher::new(stm_flat, &p_flat);
    let similarity = sm.ratio();
    let blocks: Vec<_> = sm.matching_blocks().into_iter().filter(|b| b.len > 0).collect();

    if blocks.is_empty() {
        return Segmentation {
            similarity,
            past: Vec::new(),
            present: Vec::new(),
            future: pattern_events.to_vec(),
            matches: Vec::new(),
            missing: Vec::new(),
            extras: multiset(stm_flat).into_iter().collect::<BTreeMap<_, _>>().keys().cloned().collect(),
        };
    }

    let first_p_idx = blocks.iter().map(|b| b.b_start).min().unwrap();
    let last_p_idx = blocks.iter().map(|b| b.b_start + b.len - 1).max().unwrap();

    let boundaries = event_boundaries(pattern_events);
    let first_event = event_of(&boundaries, first_p_idx);
    let last_event = event_of(&boundaries, last_p_idx);

    let past = pattern_events[..first_event].to_vec();
    let present = pattern_events[first_event..=last_event].to_vec();
    let future = pattern_events[last_event + 1..].to_vec();

    let present_flat: Vec<String> = present.iter().flatten().cloned().collect();
    let present_ms = multiset(&present_flat);
    let s_ms = multiset(stm_flat);

    let matches_ms = intersect(&present_ms, &s_ms);
    let missing_ms = subtract(&present_ms, &matches_ms);
    let extras_ms = subtract(&s_ms, &matches_ms);

    Segmentation {
        similarity,
        past,
        present,
        future,
        matches: flatten_multiset(&matches_ms),
        missing: flatten_multiset(&missing_ms),
        extras: flatten_multiset(&extras_ms),
    }
}
