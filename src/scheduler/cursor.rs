//! Shared pull cursor over a fixed ID sequence.

use crate::model::EntityId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hands out each ID of a sequence exactly once across all threads.
///
/// A single `fetch_add` claims a position, so two callers can never
/// receive the same index.
#[derive(Debug)]
pub struct IdCursor {
    ids: Arc<[EntityId]>,
    next: AtomicUsize,
}

impl IdCursor {
    pub fn new(ids: impl Into<Arc<[EntityId]>>) -> Self {
        Self {
            ids: ids.into(),
            next: AtomicUsize::new(0),
        }
    }

    /// Claim the next unprocessed ID, or `None` once exhausted.
    pub fn claim(&self) -> Option<EntityId> {
        if self.next.load(Ordering::Relaxed) >= self.ids.len() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.ids.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// IDs handed out so far.
    pub fn claimed(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.ids.len())
    }

    pub fn remaining(&self) -> usize {
        self.ids.len() - self.claimed()
    }
}
