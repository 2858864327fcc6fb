//! Similarity metrics between users and between items.
//!
//! A metric reads a [`DataModel`] and returns a symmetric score for a pair of
//! IDs. Scores are plain `f64`, with `NaN` reserved for "undefined": the
//! metric had nothing to compare (no preferences on either side, or no
//! overlap for co-occurrence metrics). Undefined is not the same as `0.0`,
//! which means the pair was measurably dissimilar, and callers ranking
//! neighbors must drop undefined scores rather than sort them.
//!
//! | Metric | Range | Weighted | Notes |
//! |--------|-------|----------|-------|
//! | [`TanimotoCoefficient`] | `[0, 1]` | no | extended Jaccard over preference sets |
//!
//! Correlation and log-likelihood metrics fit the same [`Similarity`] trait
//! and can be added as further [`SimilarityMetric`] variants.

mod tanimoto;

pub use tanimoto::TanimotoCoefficient;

use crate::error::{AffinityError, Result};
use crate::model::{DataModel, EntityId};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Whether a score carries information.
#[inline]
#[must_use]
pub fn is_defined(score: f64) -> bool {
    !score.is_nan()
}

/// Estimates a preference value for a user/item pair with no recorded one.
///
/// Only weighted metrics can make use of an inferrer.
pub trait PreferenceInferrer: Send + Sync {
    fn infer_preference(&self, user_id: EntityId, item_id: EntityId) -> Result<f64>;
}

/// Symmetric similarity between two users or two items.
pub trait Similarity: Send + Sync + fmt::Display {
    /// Similarity between two users.
    fn user_similarity(&self, user_id1: EntityId, user_id2: EntityId) -> Result<f64>;

    /// Similarity between two items.
    fn item_similarity(&self, item_id1: EntityId, item_id2: EntityId) -> Result<f64>;

    /// Similarities between `item_id1` and each of `item_id2s`, in order.
    ///
    /// Implementations should share any work that only depends on `item_id1`.
    fn item_similarities(&self, item_id1: EntityId, item_id2s: &[EntityId]) -> Result<Vec<f64>> {
        item_id2s
            .iter()
            .map(|&item_id2| self.item_similarity(item_id1, item_id2))
            .collect()
    }

    /// Refresh the underlying data model.
    fn refresh(&self) -> Result<()>;

    /// Whether preference magnitudes influence the score.
    fn supports_weighted_preferences(&self) -> bool {
        false
    }

    /// Install a preference inferrer.
    ///
    /// Metrics that ignore preference values reject this with
    /// [`AffinityError::Unsupported`].
    fn set_preference_inferrer(&mut self, _inferrer: Arc<dyn PreferenceInferrer>) -> Result<()> {
        Err(AffinityError::Unsupported(format!(
            "{self} does not use preference values"
        )))
    }
}

/// Configured choice of similarity metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Tanimoto / extended Jaccard coefficient.
    #[default]
    #[serde(alias = "jaccard")]
    Tanimoto,
}

impl SimilarityMetric {
    /// Instantiate the metric over `model`.
    pub fn build(self, model: Arc<dyn DataModel>) -> Arc<dyn Similarity> {
        match self {
            SimilarityMetric::Tanimoto => Arc::new(TanimotoCoefficient::new(model)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SimilarityMetric::Tanimoto => "tanimoto",
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = AffinityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanimoto" | "jaccard" => Ok(SimilarityMetric::Tanimoto),
            other => Err(AffinityError::InvalidConfig(format!(
                "unknown similarity metric: {other}"
            ))),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
