//! Tanimoto coefficient (extended Jaccard) similarity.
//!
//! Intended for "binary" datasets where a preference either exists or does
//! not. Preference values never enter the computation:
//!
//! ```text
//! T(X, Y) = |X ∩ Y| / (|X| + |Y| - |X ∩ Y|)
//! ```
//!
//! For users, `X` and `Y` are the item sets of each user. For items, the
//! same formula runs over co-occurrence counts from the data model.

use super::Similarity;
use crate::error::Result;
use crate::model::{DataModel, EntityId};
use std::fmt;
use std::sync::Arc;

/// Set-overlap similarity returning values in `[0, 1]`, or `NaN`.
#[derive(Clone)]
pub struct TanimotoCoefficient {
    model: Arc<dyn DataModel>,
}

impl TanimotoCoefficient {
    pub fn new(model: Arc<dyn DataModel>) -> Self {
        Self { model }
    }

    pub fn data_model(&self) -> &Arc<dyn DataModel> {
        &self.model
    }

    fn do_item_similarity(
        &self,
        item_id1: EntityId,
        item_id2: EntityId,
        preferring1: usize,
    ) -> Result<f64> {
        let preferring1and2 = self
            .model
            .num_users_with_preference_for_both(item_id1, item_id2)?;
        if preferring1and2 == 0 {
            return Ok(f64::NAN);
        }
        let preferring2 = self.model.num_users_with_preference_for(item_id2)?;
        Ok(coefficient(preferring1, preferring2, preferring1and2))
    }
}

/// `intersection / (a + b - intersection)`.
#[inline]
fn coefficient(a: usize, b: usize, intersection: usize) -> f64 {
    let union = a + b - intersection;
    intersection as f64 / union as f64
}

impl Similarity for TanimotoCoefficient {
    fn user_similarity(&self, user_id1: EntityId, user_id2: EntityId) -> Result<f64> {
        let x_prefs = self.model.item_ids_from_user(user_id1)?;
        let y_prefs = self.model.item_ids_from_user(user_id2)?;

        match (x_prefs.is_empty(), y_prefs.is_empty()) {
            (true, true) => return Ok(f64::NAN),
            (true, false) | (false, true) => return Ok(0.0),
            (false, false) => {}
        }

        let intersection = x_prefs.intersection_size(&y_prefs);
        if intersection == 0 {
            return Ok(f64::NAN);
        }
        Ok(coefficient(x_prefs.len(), y_prefs.len(), intersection))
    }

    fn item_similarity(&self, item_id1: EntityId, item_id2: EntityId) -> Result<f64> {
        let preferring1 = self.model.num_users_with_preference_for(item_id1)?;
        self.do_item_similarity(item_id1, item_id2, preferring1)
    }

    fn item_similarities(&self, item_id1: EntityId, item_id2s: &[EntityId]) -> Result<Vec<f64>> {
        let preferring1 = self.model.num_users_with_preference_for(item_id1)?;
        item_id2s
            .iter()
            .map(|&item_id2| self.do_item_similarity(item_id1, item_id2, preferring1))
            .collect()
    }

    fn refresh(&self) -> Result<()> {
        self.model.refresh()
    }
}

impl fmt::Display for TanimotoCoefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TanimotoCoefficientSimilarity")
    }
}

impl fmt::Debug for TanimotoCoefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TanimotoCoefficient").finish_non_exhaustive()
    }
}
