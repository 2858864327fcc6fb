//! affinity: batch top-N similarity neighborhoods over preference data.
//!
//! For every user (or item) in a preference dataset, compute the N most
//! similar other users (items) and hand the result to a sink. The output is
//! meant to be materialized periodically and looked up at serving time.
//!
//! - `model/`: read-only [`DataModel`](model::DataModel) abstraction and an in-memory model
//! - `similarity/`: pluggable metrics (Tanimoto / extended Jaccard)
//! - `recommender/`: user- and item-based top-N neighbor queries
//! - `scheduler/`: worker pool over a shared ID cursor, with a time budget
//! - `writer/`: LRU-deduplicated, backpressured delivery to a [`Sink`](writer::Sink)
//! - `job`: configuration-driven glue for a full run
//!
//! # Critical Nuances
//!
//! ## Undefined is not zero
//!
//! Similarity metrics return `NaN` when a pair has nothing to compare (both
//! sides empty, or no overlap at all). `0.0` means the pair was measurably
//! dissimilar. Neighbor lists drop `NaN` candidates entirely.
//!
//! ## Determinism
//!
//! Neighbor lists are ordered by score descending, then by ID ascending, so
//! reruns over the same snapshot produce identical output regardless of
//! thread count. Write *order* across workers is not deterministic.
//!
//! ## Best-effort output
//!
//! Sink failures are logged and counted, never raised. A run that hits its
//! time budget stops claiming new IDs and returns normally; records already
//! written stay written.
//!
//! # Example
//!
//! ```rust,ignore
//! use affinity::config::RunConfig;
//! use affinity::model::InMemoryDataModel;
//! use affinity::writer::JsonLinesSink;
//! use std::sync::Arc;
//!
//! let config = RunConfig::from_json_str(r#"{"num_of_neighbors": 20, "max_duration": 600}"#)?;
//! let model = Arc::new(InMemoryDataModel::from_json_lines(reader)?);
//! let sink = Arc::new(JsonLinesSink::create("user_similarity.jsonl")?);
//! let report = affinity::job::run(&config, model, sink)?;
//! println!("{} users processed", report.run.processed);
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod model;
pub mod recommender;
pub mod scheduler;
pub mod similarity;
pub mod writer;

// Re-exports
pub use error::{AffinityError, Result};
pub use model::{DataModel, EntityId};
pub use recommender::{Neighbor, NeighborList, Recommender, RecommenderBuilder};
pub use similarity::Similarity;
