//! Interval conflict index keeping annotation spans from overlapping.

use rand::{seq::SliceRandom, Rng};

/// Closed interval `[low, high]` over unit offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    low: usize,
    high: usize,
}

impl Interval {
    /// `None` when `low > high`.
    pub fn new(low: usize, high: usize) -> Option<Self> {
        (low <= high).then_some(Self { low, high })
    }

    /// Closed interval for a half-open `[start, end)` span. Empty spans have none.
    pub fn from_span(start: usize, end: usize) -> Option<Self> {
        Self::new(start, end.checked_sub(1)?)
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.low <= other.high && self.high >= other.low
    }
}

#[derive(Debug, Clone)]
struct Node {
    interval: Interval,
    /// Largest `high` in this subtree.
    max_high: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Augmented binary search tree keyed by `low`, one per text unit.
///
/// Nodes live in an arena and refer to their children by index. Callers feed
/// intervals through [`IntervalIndex::insert_all`], which shuffles them first:
/// spans arrive in text order and inserting them sorted would degrade the
/// tree into a list.
#[derive(Debug, Default, Clone)]
pub struct IntervalIndex {
    nodes: Vec<Node>,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Shuffle with the thread rng, then insert.
    pub fn insert_all(&mut self, intervals: Vec<Interval>) {
        self.insert_all_with(intervals, &mut rand::thread_rng());
    }

    /// Shuffle with the given rng, then insert.
    pub fn insert_all_with<R: Rng + ?Sized>(&mut self, mut intervals: Vec<Interval>, rng: &mut R) {
        intervals.shuffle(rng);
        self.nodes.reserve(intervals.len());
        for interval in intervals {
            self.insert(interval);
        }
    }

    /// Insert one interval without shuffling.
    pub fn insert(&mut self, interval: Interval) {
        let new_idx = self.nodes.len();
        self.nodes.push(Node {
            interval,
            max_high: interval.high,
            left: None,
            right: None,
        });
        if new_idx == 0 {
            return;
        }

        let mut current = 0;
        loop {
            let node = &mut self.nodes[current];
            node.max_high = node.max_high.max(interval.high);
            let slot = if interval.low < node.interval.low {
                &mut node.left
            } else {
                &mut node.right
            };
            match *slot {
                Some(child) => current = child,
                None => {
                    *slot = Some(new_idx);
                    return;
                }
            }
        }
    }

    /// Whether any stored interval overlaps `query`.
    pub fn overlaps(&self, query: &Interval) -> bool {
        let mut cursor = if self.nodes.is_empty() { None } else { Some(0) };
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.interval.overlaps(query) {
                return true;
            }
            // Nothing on the left reaches the query: only the right can hold a hit.
            cursor = match node.left {
                Some(left) if self.nodes[left].max_high >= query.low => Some(left),
                _ => node.right,
            };
        }
        false
    }

    /// Height of the tree in nodes; 0 when empty.
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((idx, level)) = stack.pop() {
            deepest = deepest.max(level);
            let node = &self.nodes[idx];
            stack.extend(node.left.map(|child| (child, level + 1)));
            stack.extend(node.right.map(|child| (child, level + 1)));
        }
        deepest
    }
}
