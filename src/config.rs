//! Run configuration.
//!
//! Settings arrive as a JSON object, typically forwarded from a request
//! body or a settings file:
//!
//! ```json
//! {
//!   "target": "users",
//!   "num_of_neighbors": 10,
//!   "max_duration": 600,
//!   "num_of_threads": 8,
//!   "similarity": "tanimoto",
//!   "writer": { "verbose": true, "cache_size": 1000 }
//! }
//! ```
//!
//! Every key is optional. Durations are whole seconds; a `max_duration` of
//! zero means the run is unbounded. Unknown keys are ignored so that
//! settings meant for the data model or the store can share the document.

use crate::error::{AffinityError, Result};
use crate::model::EntityId;
use crate::recommender::Target;
use crate::scheduler::SchedulerConfig;
use crate::similarity::SimilarityMetric;
use crate::writer::{RecordLayout, WriterConfig};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Deserialize whole seconds into a [`Duration`].
pub(crate) fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

pub(crate) fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Everything needed to run one batch similarity job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Compute user or item neighborhoods.
    pub target: Target,
    /// Neighbors kept per entity (N).
    #[serde(alias = "num_of_users", alias = "num_of_items")]
    pub num_of_neighbors: usize,
    /// Wall-clock budget; zero disables it.
    #[serde(deserialize_with = "seconds")]
    pub max_duration: Duration,
    /// Extra time workers get to finish after the budget expires.
    #[serde(deserialize_with = "seconds")]
    pub grace_period: Duration,
    /// Worker thread count.
    pub num_of_threads: usize,
    /// Similarity metric.
    pub similarity: SimilarityMetric,
    /// Restrict the run to these IDs instead of enumerating the model.
    pub target_ids: Option<Vec<EntityId>>,
    /// Result writer settings.
    pub writer: WriterConfig,
    /// Output field names; defaults follow the target.
    pub fields: Option<RecordLayout>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: Target::Users,
            num_of_neighbors: 10,
            max_duration: Duration::ZERO,
            grace_period: Duration::from_secs(10),
            num_of_threads: default_parallelism(),
            similarity: SimilarityMetric::Tanimoto,
            target_ids: None,
            writer: WriterConfig::default(),
            fields: None,
        }
    }
}

impl RunConfig {
    /// Parse and validate a JSON settings document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AffinityError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an already-decoded settings value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| AffinityError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_of_threads == 0 {
            return Err(AffinityError::InvalidConfig(
                "num_of_threads must be at least 1".to_string(),
            ));
        }
        self.writer.validate()
    }

    /// Budget as an option; `None` when unbounded.
    pub fn budget(&self) -> Option<Duration> {
        (!self.max_duration.is_zero()).then_some(self.max_duration)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            num_threads: self.num_of_threads,
            num_neighbors: self.num_of_neighbors,
            max_duration: self.budget(),
            grace_period: self.grace_period,
        }
    }

    pub fn layout(&self) -> RecordLayout {
        self.fields
            .clone()
            .unwrap_or_else(|| RecordLayout::for_target(self.target))
    }
}
