//! Item-to-item neighborhoods.

use super::{candidate_universe, NeighborList, Recommender, RecommenderBuilder, Target, TopN};
use crate::error::Result;
use crate::model::{DataModel, EntityId, IdSet};
use crate::similarity::{Similarity, SimilarityMetric};
use std::fmt;
use std::sync::Arc;

/// Candidates scored per batched similarity call.
const BATCH_SIZE: usize = 256;

/// Builds [`ItemBasedRecommender`]s.
#[derive(Debug, Clone, Default)]
pub struct ItemBasedRecommenderBuilder {
    metric: SimilarityMetric,
}

impl ItemBasedRecommenderBuilder {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }
}

impl RecommenderBuilder for ItemBasedRecommenderBuilder {
    fn build_recommender(&self, model: Arc<dyn DataModel>) -> Result<Arc<dyn Recommender>> {
        let item_ids = candidate_universe(model.as_ref(), Target::Items)?;
        let similarity = self.metric.build(model);
        Ok(Arc::new(ItemBasedRecommender {
            similarity,
            item_ids,
        }))
    }
}

/// Scores a query item against other items using batched similarities.
pub struct ItemBasedRecommender {
    similarity: Arc<dyn Similarity>,
    item_ids: Arc<[EntityId]>,
}

impl ItemBasedRecommender {
    /// Up to `n` most similar items to `item_id` among `candidates`.
    ///
    /// Repeated candidates are scored once, and the query item is skipped if
    /// it appears among them.
    pub fn most_similar_among(
        &self,
        item_id: EntityId,
        candidates: &[EntityId],
        n: usize,
    ) -> Result<NeighborList> {
        let distinct = IdSet::from_unsorted(candidates.to_vec());
        self.score_distinct(item_id, distinct.as_slice(), n)
    }

    /// `candidates` must not repeat an ID.
    fn score_distinct(
        &self,
        item_id: EntityId,
        candidates: &[EntityId],
        n: usize,
    ) -> Result<NeighborList> {
        let mut top = TopN::new(n);
        if n == 0 {
            return Ok(top.into_list());
        }
        let mut batch = Vec::with_capacity(BATCH_SIZE.min(candidates.len()));
        for chunk in candidates.chunks(BATCH_SIZE) {
            batch.clear();
            batch.extend(chunk.iter().copied().filter(|&id| id != item_id));
            let scores = self.similarity.item_similarities(item_id, &batch)?;
            for (&other, score) in batch.iter().zip(scores) {
                top.offer(other, score);
            }
        }
        Ok(top.into_list())
    }

    pub fn similarity(&self) -> &Arc<dyn Similarity> {
        &self.similarity
    }
}

impl Recommender for ItemBasedRecommender {
    fn most_similar(&self, item_id: EntityId, n: usize) -> Result<NeighborList> {
        self.score_distinct(item_id, &self.item_ids, n)
    }

    fn target(&self) -> Target {
        Target::Items
    }
}

impl fmt::Display for ItemBasedRecommender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ItemBasedRecommender[similarity:{}, items:{}]",
            self.similarity,
            self.item_ids.len()
        )
    }
}
