// Adapters layer: concrete implementations of the ports (persistence, search, routing)

pub mod json_store;
pub mod memory;
pub mod router;
pub mod search;

pub use json_store::JsonFileEntityManager;
pub use memory::MemoryEntityManager;
pub use router::RouteTable;
pub use search::IdentitySearch;

use crate::domain::model::Entity;
use crate::utils::error::{Result, UpdateError};
use chrono::Utc;
use indexmap::IndexMap;

/// (entity type, id)
pub(crate) type EntityKey = (String, String);

/// A write waiting for the next flush.
#[derive(Debug, Clone)]
pub(crate) enum Staged {
    Persist(Entity),
    Remove,
}

/// Writes staged since the last flush, in staging order. Staging the same
/// entity twice keeps only the latest write.
pub(crate) type StagedWrites = IndexMap<EntityKey, Staged>;

/// Assigns an id to new entities, stamps timestamps and returns the storage key.
pub(crate) fn prepare_for_persist(entity: &mut Entity) -> EntityKey {
    if entity.is_new() {
        entity.id = Some(uuid::Uuid::new_v4().to_string());
    }
    let now = Utc::now();
    entity.created_at.get_or_insert(now);
    entity.modified_at = Some(now);
    (
        entity.entity_type.clone(),
        entity.id().map(str::to_string).unwrap_or_default(),
    )
}

pub(crate) fn key_of(entity: &Entity) -> Result<EntityKey> {
    let id = entity.id().ok_or_else(|| {
        UpdateError::persistence(format!(
            "Cannot remove a {} that was never persisted",
            entity.entity_type
        ))
    })?;
    Ok((entity.entity_type.clone(), id.to_string()))
}

pub(crate) fn stage(staged: &mut StagedWrites, key: EntityKey, write: Staged) {
    // 重新排入佇列尾端，維持最後寫入的順序
    staged.shift_remove(&key);
    staged.insert(key, write);
}
