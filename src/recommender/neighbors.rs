//! Neighbor lists and bounded top-N selection.

use crate::model::EntityId;
use crate::similarity::is_defined;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A scored neighbor of some query entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: EntityId,
    pub value: f64,
}

impl Neighbor {
    pub fn new(id: EntityId, value: f64) -> Self {
        Self { id, value }
    }

    /// Ranking order: higher value first, then lower ID.
    ///
    /// `Less` means `self` ranks ahead of `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Neighbors of one entity, best first.
///
/// Never contains the query entity or an undefined score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborList {
    neighbors: Vec<Neighbor>,
}

impl NeighborList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    pub fn as_slice(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.neighbors.iter().map(|n| n.id).collect()
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.neighbors
    }
}

/// Collects into ranking order, dropping undefined scores.
impl FromIterator<Neighbor> for NeighborList {
    fn from_iter<I: IntoIterator<Item = Neighbor>>(iter: I) -> Self {
        let mut neighbors: Vec<Neighbor> =
            iter.into_iter().filter(|n| is_defined(n.value)).collect();
        neighbors.sort_by(Neighbor::rank_cmp);
        Self { neighbors }
    }
}

impl<'a> IntoIterator for &'a NeighborList {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

/// Heap entry ordered so the worst retained neighbor sits on top.
#[derive(Clone, Copy)]
struct Retained(Neighbor);

impl PartialEq for Retained {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Retained {}

impl Ord for Retained {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the entry ranked last compares greatest.
        self.0.rank_cmp(&other.0)
    }
}

impl PartialOrd for Retained {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Streaming selector keeping the `n` best candidates seen so far.
///
/// Memory is `O(n)` and each offer is `O(log n)`, so scoring a large
/// candidate universe never materializes every score at once.
pub struct TopN {
    n: usize,
    heap: BinaryHeap<Retained>,
}

impl TopN {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            heap: BinaryHeap::with_capacity(n.saturating_add(1).min(1024)),
        }
    }

    /// Consider a candidate. Undefined scores are ignored.
    ///
    /// Returns whether the candidate is currently retained.
    pub fn offer(&mut self, id: EntityId, value: f64) -> bool {
        if self.n == 0 || !is_defined(value) {
            return false;
        }
        let candidate = Retained(Neighbor::new(id, value));
        if self.heap.len() < self.n {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek() {
            Some(worst) if candidate < *worst => {
                self.heap.pop();
                self.heap.push(candidate);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn into_list(self) -> NeighborList {
        let neighbors = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| r.0)
            .collect();
        NeighborList { neighbors }
    }
}
