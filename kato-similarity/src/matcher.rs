//! A from-scratch port of the block-matching algorithm behind Python's
//! `difflib.SequenceMatcher` (minus junk/autojunk heuristics, which this
//! domain has no use for: symbols are opaque tokens, not source lines).
//!
//! Finding the longest match is a sliding hash-map scan, not a full
//! `|a|*|b|` DP table, so this stays usable on long STMs against long
//! learned patterns.

use std::collections::HashMap;
use std::hash::Hash;

/// One maximal run of `len` equal elements, `a[a_start..a_start+len] ==
/// b[b_start..b_start+len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub len: usize,
}

/// Computes matching blocks between two sequences and the difflib ratio
/// derived from them. Held onto across calls only for the `b2j` index; build
/// one per `(a, b)` pair.
pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elem) in b.iter().enumerate() {
            b2j.entry(elem).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest matching block fully contained in `a[alo..ahi]` and
    /// `b[blo..bhi]`. Ties broken the way difflib breaks them: earliest `a`
    /// start, then earliest `b` start.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> MatchBlock {
        let mut best = MatchBlock { a_start: alo, b_start: blo, len: 0 };
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut new_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(js) = self.b2j.get(&self.a[i]) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = if j == 0 {
                        1
                    } else {
                        j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                    };
                    new_j2len.insert(j, k);
                    if k > best.len {
                        best = MatchBlock { a_start: i + 1 - k, b_start: j + 1 - k, len: k };
                    }
                }
            }
            j2len = new_j2len;
        }

        best
    }

    /// Every non-overlapping matching block, left to right, with adjacent
    /// blocks merged and a trailing zero-length sentinel appended (as
    /// difflib does, to simplify callers that walk gaps between blocks).
    pub fn matching_blocks(&self) -> Vec<MatchBlock> {
        let mut queue = vec![(0usize, self.a.len(), 0usize, self.b.len())];
        let mut raw = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.len > 0 {
                if alo < m.a_start && blo < m.b_start {
                    queue.push((alo, m.a_start, blo, m.b_start));
                }
                if m.a_start + m.len < ahi && m.b_start + m.len < bhi {
                    queue.push((m.a_start + m.len, ahi, m.b_start + m.len, bhi));
                }
                raw.push(m);
            }
        }
        raw.sort_by_key(|m| (m.a_start, m.b_start));

        let mut merged: Vec<MatchBlock> = Vec::with_capacity(raw.len() + 1);
        for m in raw {
            if let Some(last) = merged.last_mut() {
                if last.a_start + last.len == m.a_start && last.b_start + last.len == m.b_start {
                    last.len += m.len;
                    continue;
                }
            }
            merged.push(m);
        }
        merged.push(MatchBlock { a_start: self.a.len(), b_start: self.b.len(), len: 0 });
        merged
    }

    /// `2 * matches / (|a| + |b|)`, matching `difflib.SequenceMatcher.ratio()`.
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 0.0;
        }
        let matches: usize = self.matching_blocks().iter().map(|m| m.len).sum();
        2.0 * matches as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_have_ratio_one() {
        let a = vec!["x", "y", "z"];
        let sm = SequenceMatcher::new(&a, &a);
        assert_eq!(sm.ratio(), 1.0);
    }

    #[test]
    fn disjoint_sequences_have_ratio_zero() {
        let a = vec!["a", "b"];
        let b = vec!["c", "d"];
        let sm = SequenceMatcher::new(&a, &b);
        assert_eq!(sm.ratio(), 0.0);
    }

    #[test]
    fn empty_sequences_have_ratio_zero() {
        let a: Vec<&str> = vec![];
        let b: Vec<&str> = vec![];
        let sm = SequenceMatcher::new(&a, &b);
        assert_eq!(sm.ratio(), 0.0);
    }

    #[test]
    fn partial_overlap_matches_known_value() {
        // difflib.SequenceMatcher(None, "abcd", "bcde").ratio() == 0.75
        let a: Vec<char> = "abcd".chars().collect();
        let b: Vec<char> = "bcde".chars().collect();
        let sm = SequenceMatcher::new(&a, &b);
        assert!((sm.ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn matching_blocks_end_with_zero_length_sentinel() {
        let a = vec!["a", "b"];
        let b = vec!["a", "b"];
        let sm = SequenceMatcher::new(&a, &b);
        let blocks = sm.matching_blocks();
        assert_eq!(blocks.last().unwrap().len, 0);
    }

    #[test]
    fn finds_single_longest_match() {
        let a: Vec<char> = "abxcd".chars().collect();
        let b: Vec<char> = "abcd".chars().collect();
        let sm = SequenceMatcher::new(&a, &b);
        let m = sm.find_longest_match(0, a.len(), 0, b.len());
        assert_eq!(m.len, 2);
        assert_eq!(m.a_start, 0);
        assert_eq!(m.b_start, 0);
    }
}
