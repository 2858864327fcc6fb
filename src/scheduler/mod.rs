//! Parallel neighborhood computation with an optional time budget.
//!
//! # The Problem
//!
//! Per-ID cost is wildly uneven: a user with thousands of preferences costs
//! far more to score than one with three. Statically partitioning IDs
//! across threads leaves some threads idle while others grind.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────┐
//!            │ IdCursor │ ◄── one atomic position over all IDs
//!            └────┬─────┘
//!       claim     │     claim
//!    ┌────────────┼────────────┐
//!    ▼            ▼            ▼
//! worker 0     worker 1 ... worker P-1
//!    │  most_similar(id, n)    │
//!    ▼            ▼            ▼
//! ┌──────────────────────────────┐
//! │         ResultWriter         │
//! └──────────────────────────────┘
//! ```
//!
//! Workers pull until the cursor is exhausted. With a budget, the scheduler
//! raises a cancellation flag at the deadline; each worker checks it before
//! claiming another ID, so a computation already running finishes normally.
//! Workers still busy after the grace period are detached and reported as
//! stragglers. Running out of budget is a normal outcome, not an error.
//!
//! A failure (error or panic) while computing or writing one ID is logged
//! and counted, and the worker moves on.

mod cursor;

pub use cursor::IdCursor;

use crate::config::default_parallelism;
use crate::error::{AffinityError, Result};
use crate::model::EntityId;
use crate::recommender::Recommender;
use crate::writer::{ResultWriter, WriteOutcome};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker thread count.
    pub num_threads: usize,
    /// Neighbors requested per ID.
    pub num_neighbors: usize,
    /// Wall-clock budget; `None` runs to completion.
    pub max_duration: Option<Duration>,
    /// How long to wait for workers after the budget expires.
    pub grace_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_threads: default_parallelism(),
            num_neighbors: 10,
            max_duration: None,
            grace_period: Duration::from_secs(10),
        }
    }
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// IDs in the run.
    pub total: usize,
    /// IDs whose neighbors were computed and accepted by the writer
    /// (written or deduplicated).
    pub processed: u64,
    /// IDs whose neighbors were computed but the writer reported
    /// [`WriteOutcome::Failed`] or [`WriteOutcome::Closed`].
    pub undelivered: u64,
    /// IDs whose computation returned an error, or whose computation or
    /// write panicked.
    pub failed: u64,
    /// IDs never claimed because the run was cancelled.
    pub unclaimed: usize,
    /// The budget expired while IDs were still waiting to be claimed.
    pub timed_out: bool,
    /// Workers still running when the scheduler returned.
    pub stragglers: usize,
    pub elapsed: Duration,
}

/// State shared between the scheduler and its workers.
struct Shared {
    cursor: IdCursor,
    cancelled: AtomicBool,
    processed: AtomicU64,
    undelivered: AtomicU64,
    failed: AtomicU64,
    live: Mutex<usize>,
    finished: Condvar,
}

/// Marks a worker finished when dropped, including on unwind.
struct LiveGuard<'a>(&'a Shared);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        let mut live = self.0.live.lock();
        *live -= 1;
        self.0.finished.notify_all();
    }
}

/// Fixed-size worker pool over a shared ID cursor.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(AffinityError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Compute and write neighborhoods for every ID in `ids`.
    ///
    /// Returns once all workers finish, or once the budget and grace period
    /// have both elapsed. Fails only if no worker thread could be started.
    pub fn run(
        &self,
        recommender: Arc<dyn Recommender>,
        ids: impl Into<Arc<[EntityId]>>,
        writer: Arc<ResultWriter>,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let shared = Arc::new(Shared {
            cursor: IdCursor::new(ids),
            cancelled: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            live: Mutex::new(self.config.num_threads),
            finished: Condvar::new(),
        });

        info!(
            recommender = %recommender,
            ids = shared.cursor.len(),
            num_threads = self.config.num_threads,
            num_neighbors = self.config.num_neighbors,
            max_duration_secs = self.config.max_duration.map_or(0, |d| d.as_secs()),
            "starting similarity workers"
        );

        let handles = self.spawn_workers(&shared, &recommender, &writer)?;
        let deadline_hit = self.wait(&shared, start);
        // Stopped workers no longer claim, so this count is final.
        let unclaimed = shared.cursor.remaining();
        let timed_out = deadline_hit && unclaimed > 0;

        let stragglers = *shared.live.lock();
        if stragglers == 0 {
            for handle in handles {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                if let Err(payload) = handle.join() {
                    warn!(
                        worker = %name,
                        panic = panic_message(payload.as_ref()),
                        "worker thread panicked outside per-id handling"
                    );
                }
            }
        } else {
            warn!(
                stragglers,
                grace_ms = self.config.grace_period.as_millis() as u64,
                "workers did not stop within the grace period; detaching"
            );
        }

        let report = RunReport {
            total: shared.cursor.len(),
            processed: shared.processed.load(Ordering::Acquire),
            undelivered: shared.undelivered.load(Ordering::Acquire),
            failed: shared.failed.load(Ordering::Acquire),
            unclaimed,
            timed_out,
            stragglers,
            elapsed: start.elapsed(),
        };

        info!(
            total = report.total,
            processed = report.processed,
            undelivered = report.undelivered,
            failed = report.failed,
            unclaimed = report.unclaimed,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "similarity workers finished"
        );

        Ok(report)
    }

    fn spawn_workers(
        &self,
        shared: &Arc<Shared>,
        recommender: &Arc<dyn Recommender>,
        writer: &Arc<ResultWriter>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(self.config.num_threads);
        for worker in 0..self.config.num_threads {
            let shared_w = Arc::clone(shared);
            let recommender = Arc::clone(recommender);
            let writer = Arc::clone(writer);
            let n = self.config.num_neighbors;

            let spawned = thread::Builder::new()
                .name(format!("affinity-worker-{worker}"))
                .spawn(move || work(worker, &shared_w, recommender.as_ref(), &writer, n));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Account for this worker and every one not yet spawned.
                    let missing = self.config.num_threads - worker;
                    {
                        let mut live = shared.live.lock();
                        *live -= missing;
                        shared.finished.notify_all();
                    }
                    if handles.is_empty() {
                        return Err(AffinityError::Io(e));
                    }
                    warn!(worker, error = %e, "failed to spawn worker; continuing with fewer");
                    break;
                }
            }
        }
        Ok(handles)
    }

    /// Block until workers finish or the budget (plus grace) runs out.
    ///
    /// Returns whether the deadline passed with workers still running.
    fn wait(&self, shared: &Shared, start: Instant) -> bool {
        let mut live = shared.live.lock();
        let Some(budget) = self.config.max_duration else {
            while *live > 0 {
                shared.finished.wait(&mut live);
            }
            return false;
        };

        let deadline = start + budget;
        while *live > 0 {
            if shared.finished.wait_until(&mut live, deadline).timed_out() {
                break;
            }
        }
        if *live == 0 {
            return false;
        }

        shared.cancelled.store(true, Ordering::Release);
        info!(
            budget_secs = budget.as_secs(),
            remaining = shared.cursor.remaining(),
            "time budget exhausted; cancelling workers"
        );

        let grace_deadline = Instant::now() + self.config.grace_period;
        while *live > 0 {
            if shared.finished.wait_until(&mut live, grace_deadline).timed_out() {
                break;
            }
        }
        true
    }
}

fn work(
    worker: usize,
    shared: &Shared,
    recommender: &dyn Recommender,
    writer: &ResultWriter,
    n: usize,
) {
    let _live = LiveGuard(shared);
    debug!(worker, "worker started");
    let mut handled = 0u64;

    while !shared.cancelled.load(Ordering::Acquire) {
        let Some(id) = shared.cursor.claim() else {
            break;
        };
        handled += 1;

        let step = panic::catch_unwind(AssertUnwindSafe(|| {
            recommender
                .most_similar(id, n)
                .map(|neighbors| writer.write(id, &neighbors))
        }));

        match step {
            Ok(Ok(WriteOutcome::Written | WriteOutcome::Deduplicated)) => {
                shared.processed.fetch_add(1, Ordering::AcqRel);
            }
            Ok(Ok(WriteOutcome::Failed | WriteOutcome::Closed)) => {
                shared.undelivered.fetch_add(1, Ordering::AcqRel);
            }
            Ok(Err(e)) => {
                warn!(worker, id, recommender = %recommender, error = %e, "failed to compute neighbors");
                shared.failed.fetch_add(1, Ordering::AcqRel);
            }
            Err(payload) => {
                warn!(
                    worker,
                    id,
                    recommender = %recommender,
                    panic = panic_message(payload.as_ref()),
                    "neighbor computation or write panicked"
                );
                shared.failed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    debug!(
        worker,
        handled,
        cancelled = shared.cancelled.load(Ordering::Acquire),
        "worker stopped"
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommender::{Neighbor, NeighborList, Target};
    use crate::writer::{MemorySink, RecordLayout, Sink, SimilarityRecord, WriterConfig};
    use std::collections::HashSet;
    use std::fmt;

    /// Returns the query's successor as its only neighbor.
    struct Successor {
        fail_on: Option<EntityId>,
        panic_on: Option<EntityId>,
        delay: Duration,
    }

    impl Successor {
        fn new() -> Self {
            Self {
                fail_on: None,
                panic_on: None,
                delay: Duration::ZERO,
            }
        }
    }

    impl fmt::Display for Successor {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("Successor")
        }
    }

    impl Recommender for Successor {
        fn most_similar(&self, id: EntityId, _n: usize) -> Result<NeighborList> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if self.fail_on == Some(id) {
                return Err(AffinityError::Similarity {
                    id,
                    cause: "synthetic".into(),
                });
            }
            if self.panic_on == Some(id) {
                panic!("synthetic panic for {id}");
            }
            Ok(std::iter::once(Neighbor::new(id + 1, 1.0)).collect())
        }

        fn target(&self) -> Target {
            Target::Users
        }
    }

    fn writer(sink: &Arc<MemorySink>) -> Arc<ResultWriter> {
        Arc::new(
            ResultWriter::new(sink.clone(), RecordLayout::users(), WriterConfig::default())
                .unwrap(),
        )
    }

    fn scheduler(threads: usize, budget: Option<Duration>) -> Scheduler {
        Scheduler::new(SchedulerConfig {
            num_threads: threads,
            num_neighbors: 5,
            max_duration: budget,
            grace_period: Duration::from_millis(500),
        })
        .unwrap()
    }

    #[test]
    fn test_every_id_written_once() {
        let sink = Arc::new(MemorySink::new());
        let ids: Vec<EntityId> = (0..500).collect();
        let report = scheduler(4, None)
            .run(Arc::new(Successor::new()), ids, writer(&sink))
            .unwrap();

        assert_eq!(report.processed, 500);
        assert_eq!(report.unclaimed, 0);
        assert!(!report.timed_out);

        let owners: Vec<EntityId> = sink.records().iter().map(|r| r.owner_id).collect();
        let unique: HashSet<_> = owners.iter().copied().collect();
        assert_eq!(owners.len(), 500);
        assert_eq!(unique.len(), 500);
    }

    #[test]
    fn test_failures_do_not_stop_the_run() {
        let sink = Arc::new(MemorySink::new());
        let rec = Successor {
            fail_on: Some(3),
            panic_on: Some(7),
            delay: Duration::ZERO,
        };
        let report = scheduler(2, None)
            .run(Arc::new(rec), (0..20).collect::<Vec<EntityId>>(), writer(&sink))
            .unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.processed, 18);
        assert_eq!(report.stragglers, 0);
        assert_eq!(sink.write_count(), 18);
    }

    #[test]
    fn test_budget_cancels_remaining_work() {
        let sink = Arc::new(MemorySink::new());
        let rec = Successor {
            delay: Duration::from_millis(20),
            ..Successor::new()
        };
        let start = Instant::now();
        let report = scheduler(2, Some(Duration::from_millis(100)))
            .run(Arc::new(rec), (0..1_000).collect::<Vec<EntityId>>(), writer(&sink))
            .unwrap();

        assert!(report.timed_out);
        assert!(report.unclaimed > 0);
        assert!(report.processed < 1_000);
        assert_eq!(report.stragglers, 0);
        assert!(start.elapsed() < Duration::from_millis(100 + 500 + 200));
    }

    /// Collects records but panics on one owner.
    struct PanickyOn {
        owner: EntityId,
        inner: MemorySink,
    }

    impl Sink for PanickyOn {
        fn write(&self, record: &SimilarityRecord, layout: &RecordLayout) -> Result<()> {
            if record.owner_id == self.owner {
                panic!("sink rejected owner {}", record.owner_id);
            }
            self.inner.write(record, layout)
        }
    }

    #[test]
    fn test_sink_panic_is_per_id() {
        let sink = Arc::new(PanickyOn {
            owner: 3,
            inner: MemorySink::new(),
        });
        let writer = Arc::new(
            ResultWriter::new(sink.clone(), RecordLayout::users(), WriterConfig::default())
                .unwrap(),
        );
        let report = scheduler(1, None)
            .run(Arc::new(Successor::new()), (0..10).collect::<Vec<EntityId>>(), writer)
            .unwrap();

        assert_eq!(report.processed, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.unclaimed, 0);
        assert_eq!(sink.inner.write_count(), 9);
    }

    #[test]
    fn test_closed_writer_counts_undelivered() {
        let sink = Arc::new(MemorySink::new());
        let writer = writer(&sink);
        writer.close();
        let report = scheduler(2, None)
            .run(Arc::new(Successor::new()), (0..6).collect::<Vec<EntityId>>(), writer.clone())
            .unwrap();

        assert_eq!(report.processed, 0);
        assert_eq!(report.undelivered, 6);
        assert_eq!(writer.stats().rejected, 6);
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_slow_last_id_is_not_a_timeout() {
        let sink = Arc::new(MemorySink::new());
        let rec = Successor {
            delay: Duration::from_millis(300),
            ..Successor::new()
        };
        let report = Scheduler::new(SchedulerConfig {
            num_threads: 1,
            num_neighbors: 5,
            max_duration: Some(Duration::from_millis(100)),
            grace_period: Duration::from_secs(2),
        })
        .unwrap()
        .run(Arc::new(rec), vec![1i64], writer(&sink))
        .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.unclaimed, 0);
        assert!(!report.timed_out);
        assert_eq!(report.stragglers, 0);
    }

    #[test]
    fn test_straggler_detached_and_late_write_rejected() {
        let sink = Arc::new(MemorySink::new());
        let writer = writer(&sink);
        let rec = Successor {
            delay: Duration::from_millis(800),
            ..Successor::new()
        };
        let report = Scheduler::new(SchedulerConfig {
            num_threads: 1,
            num_neighbors: 5,
            max_duration: Some(Duration::from_millis(50)),
            grace_period: Duration::from_millis(100),
        })
        .unwrap()
        .run(Arc::new(rec), (0..10).collect::<Vec<EntityId>>(), writer.clone())
        .unwrap();

        assert_eq!(report.stragglers, 1);
        assert!(report.timed_out);
        assert_eq!(report.unclaimed, 9);
        assert!(report.elapsed < Duration::from_millis(50 + 100 + 400));

        writer.close();
        let deadline = Instant::now() + Duration::from_secs(5);
        while writer.stats().rejected == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(writer.stats().rejected, 1);
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_empty_id_list() {
        let sink = Arc::new(MemorySink::new());
        let report = scheduler(3, Some(Duration::from_secs(5)))
            .run(Arc::new(Successor::new()), Vec::<EntityId>::new(), writer(&sink))
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(!report.timed_out);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let err = Scheduler::new(SchedulerConfig {
            num_threads: 0,
            ..SchedulerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, AffinityError::InvalidConfig(_)));
    }
}
