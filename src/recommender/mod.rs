//! Nearest-neighbor queries over a data model.
//!
//! A [`RecommenderBuilder`] turns a [`DataModel`] plus a configured
//! [`SimilarityMetric`] into a [`Recommender`]. Building happens once per
//! run, before any worker starts, and is the last point where the run can
//! fail as a whole: a builder error aborts the job.
//!
//! # Example
//!
//! ```rust,ignore
//! use affinity::model::InMemoryDataModel;
//! use affinity::recommender::{RecommenderBuilder, UserBasedRecommenderBuilder};
//!
//! let model = Arc::new(InMemoryDataModel::from_preferences(prefs)?);
//! let recommender = UserBasedRecommenderBuilder::default().build_recommender(model)?;
//! let neighbors = recommender.most_similar(42, 10)?;
//! ```

mod item_based;
mod neighbors;
mod user_based;

pub use item_based::{ItemBasedRecommender, ItemBasedRecommenderBuilder};
pub use neighbors::{Neighbor, NeighborList, TopN};
pub use user_based::{UserBasedRecommender, UserBasedRecommenderBuilder};

use crate::error::{AffinityError, Result};
use crate::model::{DataModel, EntityId};
use crate::similarity::SimilarityMetric;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Which entity kind neighborhoods are computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    #[default]
    Users,
    Items,
}

impl Target {
    /// Every ID of this kind in the model.
    pub fn enumerate(self, model: &dyn DataModel) -> Result<Vec<EntityId>> {
        match self {
            Target::Users => model.user_ids(),
            Target::Items => model.item_ids(),
        }
    }

    /// Builder for this target using `metric`.
    pub fn builder(self, metric: SimilarityMetric) -> Box<dyn RecommenderBuilder> {
        match self {
            Target::Users => Box::new(UserBasedRecommenderBuilder::new(metric)),
            Target::Items => Box::new(ItemBasedRecommenderBuilder::new(metric)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Users => f.write_str("users"),
            Target::Items => f.write_str("items"),
        }
    }
}

/// Answers "which entities are most similar to this one".
pub trait Recommender: Send + Sync + fmt::Display {
    /// Up to `n` most similar entities to `id`, best first.
    fn most_similar(&self, id: EntityId, n: usize) -> Result<NeighborList>;

    /// Entity kind this recommender ranks.
    fn target(&self) -> Target;
}

/// Builds a [`Recommender`] over a data model.
pub trait RecommenderBuilder: Send + Sync {
    fn build_recommender(&self, model: Arc<dyn DataModel>) -> Result<Arc<dyn Recommender>>;
}

/// Candidate universe for a target, failing if the model has none.
fn candidate_universe(model: &dyn DataModel, target: Target) -> Result<Arc<[EntityId]>> {
    let ids = target
        .enumerate(model)
        .map_err(|e| AffinityError::Build(format!("cannot enumerate {target}: {e}")))?;
    if ids.is_empty() {
        return Err(AffinityError::Build(format!("data model has no {target}")));
    }
    Ok(ids.into())
}
