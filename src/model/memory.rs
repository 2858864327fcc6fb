//! In-memory data model built from preference records.

use super::{DataModel, EntityId, IdSet};
use crate::error::{AffinityError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;

/// One `user -> item` preference as read from an input stream.
///
/// The value is carried for compatibility with weighted datasets but the
/// model only records presence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: EntityId,
    pub item_id: EntityId,
    #[serde(default)]
    pub value: Option<f64>,
}

/// A [`DataModel`] holding both directions of the preference relation.
#[derive(Debug, Clone)]
pub struct InMemoryDataModel {
    items_by_user: HashMap<EntityId, IdSet>,
    users_by_item: HashMap<EntityId, IdSet>,
    user_ids: Vec<EntityId>,
    item_ids: Vec<EntityId>,
    num_preferences: usize,
}

impl InMemoryDataModel {
    /// Build from `(user, item)` pairs.
    ///
    /// Repeated pairs count once. An empty input is rejected.
    pub fn from_preferences<I>(preferences: I) -> Result<Self>
    where
        I: IntoIterator<Item = (EntityId, EntityId)>,
    {
        let mut items: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        let mut users: HashMap<EntityId, Vec<EntityId>> = HashMap::new();

        for (user_id, item_id) in preferences {
            items.entry(user_id).or_default().push(item_id);
            users.entry(item_id).or_default().push(user_id);
        }

        if items.is_empty() {
            return Err(AffinityError::DataModel(
                "no preferences found".to_string(),
            ));
        }

        let items_by_user: HashMap<EntityId, IdSet> = items
            .into_iter()
            .map(|(id, ids)| (id, IdSet::from_unsorted(ids)))
            .collect();
        let users_by_item: HashMap<EntityId, IdSet> = users
            .into_iter()
            .map(|(id, ids)| (id, IdSet::from_unsorted(ids)))
            .collect();

        let mut user_ids: Vec<EntityId> = items_by_user.keys().copied().collect();
        user_ids.sort_unstable();
        let mut item_ids: Vec<EntityId> = users_by_item.keys().copied().collect();
        item_ids.sort_unstable();
        let num_preferences = items_by_user.values().map(IdSet::len).sum();

        Ok(Self {
            items_by_user,
            users_by_item,
            user_ids,
            item_ids,
            num_preferences,
        })
    }

    /// Parse newline-delimited JSON [`PreferenceRecord`]s.
    ///
    /// Blank lines are skipped. A malformed line fails the whole load and
    /// the error names its line number.
    pub fn from_json_lines<R: BufRead>(reader: R) -> Result<Self> {
        let mut pairs = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: PreferenceRecord = serde_json::from_str(trimmed).map_err(|e| {
                AffinityError::DataModel(format!("line {}: {}", lineno + 1, e))
            })?;
            pairs.push((record.user_id, record.item_id));
        }
        Self::from_preferences(pairs)
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }

    /// Distinct `(user, item)` pairs.
    pub fn num_preferences(&self) -> usize {
        self.num_preferences
    }
}

impl DataModel for InMemoryDataModel {
    fn item_ids_from_user(&self, user_id: EntityId) -> Result<IdSet> {
        Ok(self.items_by_user.get(&user_id).cloned().unwrap_or_default())
    }

    fn user_ids_from_item(&self, item_id: EntityId) -> Result<IdSet> {
        Ok(self.users_by_item.get(&item_id).cloned().unwrap_or_default())
    }

    fn num_users_with_preference_for(&self, item_id: EntityId) -> Result<usize> {
        Ok(self.users_by_item.get(&item_id).map_or(0, IdSet::len))
    }

    fn num_users_with_preference_for_both(
        &self,
        item_id1: EntityId,
        item_id2: EntityId,
    ) -> Result<usize> {
        match (
            self.users_by_item.get(&item_id1),
            self.users_by_item.get(&item_id2),
        ) {
            (Some(a), Some(b)) => Ok(a.intersection_size(b)),
            _ => Ok(0),
        }
    }

    fn user_ids(&self) -> Result<Vec<EntityId>> {
        Ok(self.user_ids.clone())
    }

    fn item_ids(&self) -> Result<Vec<EntityId>> {
        Ok(self.item_ids.clone())
    }
}

impl std::fmt::Display for InMemoryDataModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "InMemoryDataModel[users:{}, items:{}, preferences:{}]",
            self.num_users(),
            self.num_items(),
            self.num_preferences
        )
    }
}
