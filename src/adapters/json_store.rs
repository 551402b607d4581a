use crate::adapters::{key_of, prepare_for_persist, stage, Staged, StagedWrites};
use crate::domain::model::Entity;
use crate::domain::ports::EntityManager;
use crate::utils::error::{Result, UpdateError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Entity manager storing each entity as `<base>/<entity_type>/<id>.json`.
#[derive(Debug)]
pub struct JsonFileEntityManager {
    base_path: PathBuf,
    staged: Mutex<StagedWrites>,
}

impl JsonFileEntityManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            staged: Mutex::new(StagedWrites::new()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entity_path(&self, entity_type: &str, id: &str) -> Result<PathBuf> {
        check_component("entity_type", entity_type)?;
        check_component("id", id)?;
        Ok(self
            .base_path
            .join(entity_type)
            .join(format!("{}.json", id)))
    }
}

// 型別與 id 會成為路徑的一部分，不允許跳出 base 目錄
fn check_component(kind: &str, value: &str) -> Result<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
    {
        return Err(UpdateError::persistence(format!(
            "Invalid {} for file storage: '{}'",
            kind, value
        )));
    }
    Ok(())
}

async fn apply_write(path: &Path, write: &Staged) -> Result<()> {
    match write {
        Staged::Persist(entity) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_vec_pretty(entity)?;
            tokio::fs::write(path, content).await?;
            tracing::debug!("📁 Wrote {}", path.display());
        }
        Staged::Remove => match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("🗑️ Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

#[async_trait]
impl EntityManager for JsonFileEntityManager {
    async fn find(&self, entity_type: &str, id: &str) -> Result<Option<Entity>> {
        let path = self.entity_path(entity_type, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entity: &mut Entity) -> Result<()> {
        let key = prepare_for_persist(entity);
        self.entity_path(&key.0, &key.1)?;
        let mut staged = self.staged.lock().await;
        stage(&mut staged, key, Staged::Persist(entity.clone()));
        Ok(())
    }

    async fn remove(&self, entity: &Entity) -> Result<()> {
        let key = key_of(entity)?;
        self.entity_path(&key.0, &key.1)?;
        let mut staged = self.staged.lock().await;
        stage(&mut staged, key, Staged::Remove);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let mut staged = self.staged.lock().await;
        let mut written = 0;
        // 寫入成功才移出佇列；失敗時該筆與其後的寫入都保留，可再次 flush
        while let Some(((entity_type, id), write)) = staged.first() {
            let path = self.entity_path(entity_type, id)?;
            apply_write(&path, write).await?;
            staged.shift_remove_index(0);
            written += 1;
        }
        Ok(written)
    }

    async fn pending(&self) -> usize {
        self.staged.lock().await.len()
    }
}
