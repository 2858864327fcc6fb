//! Sorted, duplicate-free sets of entity IDs.

use super::EntityId;

/// An immutable set of entity IDs.
///
/// Stored as a sorted `Vec` so that membership is a binary search and
/// iteration order is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<EntityId>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary IDs; duplicates are collapsed.
    pub fn from_unsorted(mut ids: Vec<EntityId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Number of IDs present in both sets.
    ///
    /// Iterates the smaller set and probes the larger one, so the cost is
    /// `O(min * log max)` regardless of argument order.
    pub fn intersection_size(&self, other: &IdSet) -> usize {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.ids.iter().filter(|&&id| large.contains(id)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }
}

impl FromIterator<EntityId> for IdSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}
