//! Read-only access to preference data.
//!
//! Everything the engine knows about "who prefers what" comes through the
//! [`DataModel`] trait. A model is a snapshot: it is built once per run,
//! shared across worker threads behind an `Arc`, and never mutated by the
//! engine.
//!
//! Unknown IDs are not errors. A user with no recorded preferences simply
//! has an empty [`IdSet`], and an item nobody prefers has a count of zero.

mod id_set;
mod memory;

pub use id_set::IdSet;
pub use memory::{InMemoryDataModel, PreferenceRecord};

use crate::error::Result;

/// Identifier of a user or an item.
pub type EntityId = i64;

/// Read-only view over a preference store.
pub trait DataModel: Send + Sync {
    /// Items the user has expressed a preference for.
    fn item_ids_from_user(&self, user_id: EntityId) -> Result<IdSet>;

    /// Users that have expressed a preference for the item.
    fn user_ids_from_item(&self, item_id: EntityId) -> Result<IdSet>;

    /// Number of users with a preference for `item_id`.
    fn num_users_with_preference_for(&self, item_id: EntityId) -> Result<usize>;

    /// Number of users with a preference for both items.
    fn num_users_with_preference_for_both(
        &self,
        item_id1: EntityId,
        item_id2: EntityId,
    ) -> Result<usize>;

    /// All user IDs, ascending.
    fn user_ids(&self) -> Result<Vec<EntityId>>;

    /// All item IDs, ascending.
    fn item_ids(&self) -> Result<Vec<EntityId>>;

    /// Reload cached state from the backing store, if any.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}
