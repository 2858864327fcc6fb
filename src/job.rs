//! End-to-end similarity runs.
//!
//! [`run`] wires a configuration, a data model and a sink together:
//!
//! 1. open the [`ResultWriter`] (schema setup; fatal on error)
//! 2. build the recommender (fatal on error)
//! 3. resolve target IDs (explicit list, or full enumeration)
//! 4. schedule workers until done or out of budget
//! 5. close the writer
//!
//! The writer is closed on every path out of [`compute`], including fatal
//! errors after it was opened.

use crate::config::RunConfig;
use crate::error::{AffinityError, Result};
use crate::model::{DataModel, EntityId};
use crate::recommender::{RecommenderBuilder, Target};
use crate::scheduler::{RunReport, Scheduler, SchedulerConfig};
use crate::writer::{CloseReport, ResultWriter, Sink, WriterStats};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of a completed (possibly time-limited) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub run: RunReport,
    pub writer: WriterStats,
    pub close: CloseReport,
}

/// Closes the writer when dropped.
struct CloseOnExit<'a>(&'a ResultWriter);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Run a full similarity job described by `config`.
pub fn run(config: &RunConfig, model: Arc<dyn DataModel>, sink: Arc<dyn Sink>) -> Result<JobReport> {
    config.validate()?;

    info!(
        entity = %config.target,
        similarity = %config.similarity,
        num_of_neighbors = config.num_of_neighbors,
        max_duration_secs = config.max_duration.as_secs(),
        num_of_threads = config.num_of_threads,
        "similarity job configured"
    );

    let writer = match ResultWriter::new(sink, config.layout(), config.writer.clone()) {
        Ok(writer) => Arc::new(writer),
        Err(e) => {
            error!(error = %e, "failed to open result writer");
            return Err(e);
        }
    };
    let builder = config.target.builder(config.similarity);

    compute(
        builder.as_ref(),
        model,
        config.target,
        config.target_ids.clone(),
        writer,
        config.scheduler_config(),
    )
}

/// Build a recommender and schedule it over `ids`.
///
/// When `ids` is `None` every entity of `target` in the model is processed.
/// `writer` is closed before this returns, whether or not the run succeeded.
pub fn compute(
    builder: &dyn RecommenderBuilder,
    model: Arc<dyn DataModel>,
    target: Target,
    ids: Option<Vec<EntityId>>,
    writer: Arc<ResultWriter>,
    scheduler_config: SchedulerConfig,
) -> Result<JobReport> {
    let guard = CloseOnExit(&writer);

    let recommender = builder.build_recommender(model.clone()).map_err(|e| {
        error!(error = %e, "recommender construction failed; aborting run");
        e
    })?;

    let ids = match ids {
        Some(ids) => ids,
        None => target.enumerate(model.as_ref()).map_err(|e| {
            error!(error = %e, entity = %target, "failed to enumerate target ids; aborting run");
            AffinityError::DataModel(format!("cannot enumerate {target}: {e}"))
        })?,
    };

    let scheduler = Scheduler::new(scheduler_config)?;
    let run = scheduler.run(recommender, ids, writer.clone())?;

    let close = writer.close();
    drop(guard);

    Ok(JobReport {
        run,
        writer: writer.stats(),
        close,
    })
}
