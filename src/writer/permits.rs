//! Bounded count of in-flight sink operations.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct State {
    active: usize,
    closed: bool,
}

/// Counting gate for concurrent sink writes.
///
/// Acquiring blocks while `limit` permits are out. Once closed, no new
/// permit is granted, including to callers already waiting.
#[derive(Debug)]
pub(crate) struct InFlight {
    limit: usize,
    state: Mutex<State>,
    changed: Condvar,
}

/// Held for the duration of one sink call.
pub(crate) struct Permit<'a> {
    owner: &'a InFlight,
}

impl InFlight {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
        }
    }

    /// Wait for a free slot. Returns `None` once closed.
    pub(crate) fn acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if state.active < self.limit {
                state.active += 1;
                return Some(Permit { owner: self });
            }
            self.changed.wait(&mut state);
        }
    }

    /// Stop granting permits and wait up to `timeout` for held ones.
    ///
    /// Returns whether every permit was released in time.
    pub(crate) fn close_and_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.closed = true;
        self.changed.notify_all();
        while state.active > 0 {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.active == 0;
            }
        }
        true
    }

    pub(crate) fn active(&self) -> usize {
        self.state.lock().active
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.owner.state.lock();
        state.active -= 1;
        self.owner.changed.notify_all();
    }
}
