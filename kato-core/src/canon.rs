//! Symbol and pattern canonicalization, and content-addressed pattern identity.
//!
//! These are the rules that make two observers who see the same events in
//! the same order compute the same pattern name, regardless of the order
//! symbols arrived within any single event.

use sha1::{Digest, Sha1};

/// One observation tick: an unordered (but duplicate-preserving) collection
/// of symbols. Canonical form sorts the symbols lexicographically.
pub type RawEvent = Vec<String>;

/// Sort the symbols of a single event lexicographically, stably. Duplicate
/// symbols are preserved - an event `["b", "a", "b"]` canonicalizes to
/// `["a", "b", "b"]`, not `["a", "b"]`.
pub fn canonicalize_event(symbols: &[String]) -> RawEvent {
    let mut sorted = symbols.to_vec();
    sorted.sort();
    sorted
}

/// Canonicalize every event of a pattern. Event order is preserved - only the
/// symbols *within* each event are reordered.
pub fn canonicalize_pattern(events: &[RawEvent]) -> Vec<RawEvent> {
    events.iter().map(|e| canonicalize_event(e)).collect()
}

/// Deterministic byte encoding of a canonical pattern, used as the hash
/// preimage. `serde_json` on a `Vec<Vec<String>>` is stable: it never
/// reorders the outer or inner sequences, so two canonicalizations that are
/// `==` always serialize to the same bytes. Fixed for the lifetime of a
/// deployment - changing this function changes every existing pattern's
/// identity.
pub fn serialize_canonical(canonical_events: &[RawEvent]) -> Vec<u8> {
    serde_json::to_vec(canonical_events).expect("Vec<Vec<String>> is always serializable")
}

/// Compute the content-addressed identity of a canonical pattern:
/// `PTRN|<lowercase hex sha1>`.
pub fn pattern_name(canonical_events: &[RawEvent]) -> String {
    let bytes = serialize_canonical(canonical_events);
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    format!("PTRN|{}", hex_lower(&digest))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Sum of the lengths of every event once canonicalized (duplicates count).
pub fn flattened_length(events: &[RawEvent]) -> usize {
    events.iter().map(|e| e.len()).sum()
}

/// Deduplicated flat set of symbols across all events of a pattern.
pub fn token_set(events: &[RawEvent]) -> std::collections::BTreeSet<String> {
    events.iter().flatten().cloned().collect()
}

/// Flatten a pattern's events into a single symbol sequence, in event order,
/// duplicates and all. Used by the similarity engine's token-mode LCS.
pub fn flatten(events: &[RawEvent]) -> Vec<String> {
    events.iter().flatten().cloned().collect()
}
