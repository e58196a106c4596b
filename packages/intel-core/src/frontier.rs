//! Frontier: a max-priority queue over scored URLs (spec §4.2). Keyed by
//! score (max), then depth (min), then insertion order (FIFO on ties).
//! Rust's `BinaryHeap` has no incidental pop-order stability the way
//! Python's tuple-compared list-heap does, so the insertion sequence is
//! carried explicitly as the final tie-break field (SPEC_FULL.md §4.2).
//! Does not deduplicate — the Explorer owns visited tracking (spec §4.2,
//! §4.7).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct FrontierEntry {
    score: f64,
    depth: u32,
    sequence: u64,
    url: String,
    anchor_text: String,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    /// Higher score first; tie -> smaller depth first; tie -> earlier
    /// insertion first (spec §4.1 tie-break, §4.2, §5 ordering
    /// guarantees). `BinaryHeap` is a max-heap, so depth and sequence
    /// comparisons are inverted to make "smaller wins" sort as "greater".
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// One popped frontier item.
#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub score: f64,
    pub depth: u32,
    pub url: String,
    pub anchor_text: String,
}

#[derive(Default)]
pub struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    next_sequence: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_sequence: 0 }
    }

    pub fn push(&mut self, score: f64, depth: u32, url: impl Into<String>, anchor_text: impl Into<String>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(FrontierEntry {
            score,
            depth,
            sequence,
            url: url.into(),
            anchor_text: anchor_text.into(),
        });
    }

    pub fn pop(&mut self) -> Option<FrontierItem> {
        self.heap.pop().map(|entry| FrontierItem {
            score: entry.score,
            depth: entry.depth,
            url: entry.url,
            anchor_text: entry.anchor_text,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// spec §8 scenario 3: push (50,0,A), (60,2,B), (60,1,C), (50,0,D).
    /// Pop order: C (score 60, depth 1) then B (score 60, depth 2), then
    /// A then D (both score 50 depth 0, A inserted first).
    #[test]
    fn frontier_ordering_matches_scenario_3() {
        let mut frontier = Frontier::new();
        frontier.push(50.0, 0, "A", "");
        frontier.push(60.0, 2, "B", "");
        frontier.push(60.0, 1, "C", "");
        frontier.push(50.0, 0, "D", "");

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop()).map(|i| i.url).collect();
        assert_eq!(order, vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn empty_frontier_pops_none() {
        let mut frontier = Frontier::new();
        assert!(frontier.pop().is_none());
        assert!(frontier.is_empty());
    }
}
