//! Error types for affinity.

use crate::model::EntityId;
use thiserror::Error;

/// Errors that can occur while building or running a similarity job.
///
/// Whether an error is fatal depends on where it surfaces: anything returned
/// before workers start (configuration, data model, recommender, writer
/// schema) aborts the run, while the same variants raised for a single ID
/// are logged and skipped.
#[derive(Debug, Error)]
pub enum AffinityError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The data model could not be constructed or queried.
    #[error("data model error: {0}")]
    DataModel(String),

    /// Recommender construction failed.
    #[error("failed to build recommender: {0}")]
    Build(String),

    /// Operation not supported by this component.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Similarity computation failed for a single entity.
    #[error("similarity computation failed for {id}: {cause}")]
    Similarity { id: EntityId, cause: String },

    /// The result sink rejected an operation.
    #[error("sink error: {0}")]
    Sink(String),

    /// I/O error (file sinks, data model loading).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AffinityError {
    /// Whether this error is scoped to a single unit of work.
    pub fn is_per_unit(&self) -> bool {
        matches!(
            self,
            AffinityError::Similarity { .. } | AffinityError::Sink(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AffinityError>;
