//! User-to-user neighborhoods.

use super::{candidate_universe, NeighborList, Recommender, RecommenderBuilder, Target, TopN};
use crate::error::Result;
use crate::model::{DataModel, EntityId};
use crate::similarity::{Similarity, SimilarityMetric};
use std::fmt;
use std::sync::Arc;

/// Builds [`UserBasedRecommender`]s.
#[derive(Debug, Clone, Default)]
pub struct UserBasedRecommenderBuilder {
    metric: SimilarityMetric,
}

impl UserBasedRecommenderBuilder {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }
}

impl RecommenderBuilder for UserBasedRecommenderBuilder {
    fn build_recommender(&self, model: Arc<dyn DataModel>) -> Result<Arc<dyn Recommender>> {
        let user_ids = candidate_universe(model.as_ref(), Target::Users)?;
        let similarity = self.metric.build(model);
        Ok(Arc::new(UserBasedRecommender {
            similarity,
            user_ids,
        }))
    }
}

/// Scores a query user against every other user in the model.
pub struct UserBasedRecommender {
    similarity: Arc<dyn Similarity>,
    user_ids: Arc<[EntityId]>,
}

impl UserBasedRecommender {
    pub fn similarity(&self) -> &Arc<dyn Similarity> {
        &self.similarity
    }

    pub fn num_candidates(&self) -> usize {
        self.user_ids.len()
    }
}

impl Recommender for UserBasedRecommender {
    fn most_similar(&self, user_id: EntityId, n: usize) -> Result<NeighborList> {
        let mut top = TopN::new(n);
        if n == 0 {
            return Ok(top.into_list());
        }
        for &other in self.user_ids.iter() {
            if other == user_id {
                continue;
            }
            let score = self.similarity.user_similarity(user_id, other)?;
            top.offer(other, score);
        }
        Ok(top.into_list())
    }

    fn target(&self) -> Target {
        Target::Users
    }
}

impl fmt::Display for UserBasedRecommender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UserBasedRecommender[similarity:{}, users:{}]",
            self.similarity,
            self.user_ids.len()
        )
    }
}
