//! Deduplicating, backpressured delivery of neighbor lists to a sink.
//!
//! # Architecture
//!
//! ```text
//! worker ─┐
//! worker ─┼─► ResultWriter::write(owner, list)
//! worker ─┘        │
//!                  ├─ cache hit, same payload ──► Deduplicated (no sink call)
//!                  ▼
//!             InFlight permit  ◄── blocks at max_outstanding
//!                  │
//!                  ▼
//!             Sink::write ──► Written  (cache updated)
//!                         └─► Failed   (logged, run continues)
//! ```
//!
//! # Delivery policy
//!
//! Writes are best-effort. A sink failure is logged and reported as
//! [`WriteOutcome::Failed`]; it never propagates to the caller, and
//! [`ResultWriter::close`] never fails. Records lost this way are not
//! retried.

mod permits;
mod record;
mod sink;

pub use record::{RecordLayout, SimilarityRecord};
pub use sink::{JsonLinesSink, MemorySink, Sink};

use crate::config::seconds;
use crate::error::{AffinityError, Result};
use crate::model::EntityId;
use crate::recommender::{Neighbor, NeighborList};
use lru::LruCache;
use parking_lot::Mutex;
use permits::InFlight;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for [`ResultWriter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Keep a cache of last-written payloads and skip identical rewrites.
    pub verbose: bool,
    /// Cache capacity (entries) when `verbose` is set.
    pub cache_size: usize,
    /// Maximum concurrent sink writes.
    pub max_outstanding: usize,
    /// Upper bound on how long `close` waits for in-flight writes.
    #[serde(deserialize_with = "seconds")]
    pub close_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            cache_size: 1000,
            max_outstanding: 4,
            close_timeout: Duration::from_secs(60),
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.verbose && self.cache_size == 0 {
            return Err(AffinityError::InvalidConfig(
                "writer.cache_size must be at least 1".to_string(),
            ));
        }
        if self.max_outstanding == 0 {
            return Err(AffinityError::InvalidConfig(
                "writer.max_outstanding must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened to a single `write` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Delivered to the sink.
    Written,
    /// Identical to the cached payload; the sink was not called.
    Deduplicated,
    /// The sink returned an error; the record is lost.
    Failed,
    /// The writer was already closed.
    Closed,
}

/// Counters accumulated over the writer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub deduplicated: u64,
    pub failed: u64,
    pub rejected: u64,
}

/// Result of [`ResultWriter::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReport {
    /// Every in-flight write finished before the timeout.
    pub drained: bool,
    /// The final sink flush succeeded.
    pub flush_ok: bool,
    /// `close` had already run; nothing was done.
    pub already_closed: bool,
}

/// Thread-safe front end to a [`Sink`].
pub struct ResultWriter {
    sink: Arc<dyn Sink>,
    layout: RecordLayout,
    config: WriterConfig,
    cache: Option<Mutex<LruCache<EntityId, Vec<Neighbor>>>>,
    in_flight: InFlight,
    closed: AtomicBool,
    written: AtomicU64,
    deduplicated: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl ResultWriter {
    /// Validate `config` and prepare the sink schema.
    ///
    /// Fails if the configuration is invalid or the sink rejects `layout`.
    pub fn new(sink: Arc<dyn Sink>, layout: RecordLayout, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        sink.ensure_schema(&layout)?;

        let cache = if config.verbose {
            let capacity = NonZeroUsize::new(config.cache_size).ok_or_else(|| {
                AffinityError::InvalidConfig("writer.cache_size must be at least 1".to_string())
            })?;
            Some(Mutex::new(LruCache::new(capacity)))
        } else {
            None
        };

        debug!(
            verbose = config.verbose,
            cache_size = config.cache_size,
            max_outstanding = config.max_outstanding,
            "result writer opened"
        );

        Ok(Self {
            sink,
            layout,
            in_flight: InFlight::new(config.max_outstanding),
            config,
            cache,
            closed: AtomicBool::new(false),
            written: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }

    /// Deliver `neighbors` as the neighborhood of `owner_id`.
    ///
    /// Blocks while `max_outstanding` writes are already in progress.
    pub fn write(&self, owner_id: EntityId, neighbors: &NeighborList) -> WriteOutcome {
        if self.closed.load(Ordering::Acquire) {
            return self.reject(owner_id);
        }

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            if cache
                .get(&owner_id)
                .is_some_and(|prev| prev.as_slice() == neighbors.as_slice())
            {
                self.deduplicated.fetch_add(1, Ordering::Relaxed);
                return WriteOutcome::Deduplicated;
            }
        }

        let Some(_permit) = self.in_flight.acquire() else {
            return self.reject(owner_id);
        };

        let record = SimilarityRecord::new(owner_id, neighbors);
        match self.sink.write(&record, &self.layout) {
            Ok(()) => {
                if let Some(cache) = &self.cache {
                    cache.lock().put(owner_id, record.neighbors);
                }
                self.written.fetch_add(1, Ordering::Relaxed);
                WriteOutcome::Written
            }
            Err(e) => {
                warn!(owner_id, error = %e, "failed to write similarity record");
                self.failed.fetch_add(1, Ordering::Relaxed);
                WriteOutcome::Failed
            }
        }
    }

    fn reject(&self, owner_id: EntityId) -> WriteOutcome {
        debug!(owner_id, "write after close ignored");
        self.rejected.fetch_add(1, Ordering::Relaxed);
        WriteOutcome::Closed
    }

    /// Stop accepting writes, drain in-flight ones, and flush the sink.
    ///
    /// Idempotent. Drain timeouts and flush errors are logged and reported
    /// in the returned [`CloseReport`], never returned as errors.
    pub fn close(&self) -> CloseReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return CloseReport {
                drained: true,
                flush_ok: true,
                already_closed: true,
            };
        }

        let drained = self.in_flight.close_and_drain(self.config.close_timeout);
        if !drained {
            warn!(
                outstanding = self.in_flight.active(),
                timeout_ms = self.config.close_timeout.as_millis() as u64,
                "writer closed with writes still in flight"
            );
        }

        let flush_ok = match self.sink.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to flush sink on close");
                false
            }
        };

        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }

        let stats = self.stats();
        info!(
            written = stats.written,
            deduplicated = stats.deduplicated,
            failed = stats.failed,
            rejected = stats.rejected,
            "result writer closed"
        );

        CloseReport {
            drained,
            flush_ok,
            already_closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            written: self.written.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Entries currently cached, or `None` when caching is off.
    pub fn cached_entries(&self) -> Option<usize> {
        self.cache.as_ref().map(|c| c.lock().len())
    }
}

impl Drop for ResultWriter {
    fn drop(&mut self) {
        self.close();
    }
}
