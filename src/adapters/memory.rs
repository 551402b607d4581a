use crate::adapters::{key_of, prepare_for_persist, stage, EntityKey, Staged, StagedWrites};
use crate::domain::model::Entity;
use crate::domain::ports::EntityManager;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    committed: HashMap<EntityKey, Entity>,
    staged: StagedWrites,
}

/// Entity manager keeping everything in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryEntityManager {
    state: Mutex<MemoryState>,
}

impl MemoryEntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds committed entities. Entities without an id are skipped.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let committed = entities
            .into_iter()
            .filter_map(|entity| {
                let id = entity.id()?.to_string();
                Some(((entity.entity_type.clone(), id), entity))
            })
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                committed,
                staged: StagedWrites::new(),
            }),
        }
    }

    /// Committed entities of one type, in no particular order.
    pub async fn all(&self, entity_type: &str) -> Vec<Entity> {
        let state = self.state.lock().await;
        state
            .committed
            .iter()
            .filter(|((t, _), _)| t == entity_type)
            .map(|(_, entity)| entity.clone())
            .collect()
    }

    pub async fn committed_count(&self) -> usize {
        self.state.lock().await.committed.len()
    }
}

#[async_trait]
impl EntityManager for MemoryEntityManager {
    async fn find(&self, entity_type: &str, id: &str) -> Result<Option<Entity>> {
        let state = self.state.lock().await;
        Ok(state
            .committed
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned())
    }

    async fn persist(&self, entity: &mut Entity) -> Result<()> {
        let key = prepare_for_persist(entity);
        let mut state = self.state.lock().await;
        stage(&mut state.staged, key, Staged::Persist(entity.clone()));
        Ok(())
    }

    async fn remove(&self, entity: &Entity) -> Result<()> {
        let key = key_of(entity)?;
        let mut state = self.state.lock().await;
        stage(&mut state.staged, key, Staged::Remove);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let staged = std::mem::take(&mut state.staged);
        let written = staged.len();
        for (key, write) in staged {
            match write {
                Staged::Persist(entity) => {
                    state.committed.insert(key, entity);
                }
                Staged::Remove => {
                    state.committed.remove(&key);
                }
            }
        }
        tracing::debug!(written, "💾 Memory store flushed");
        Ok(written)
    }

    async fn pending(&self) -> usize {
        self.state.lock().await.staged.len()
    }
}
