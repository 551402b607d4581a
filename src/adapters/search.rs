use crate::domain::model::{Entity, Params, DEFAULT_ID_PARAM};
use crate::domain::ports::{EntityManager, SearchService};
use crate::utils::error::{Result, UpdateError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Finds the main entity of an update by the id found in the request params.
pub struct IdentitySearch<M: EntityManager + ?Sized> {
    manager: Arc<M>,
    entity_type: String,
    id_param: String,
}

impl<M: EntityManager + ?Sized> IdentitySearch<M> {
    pub fn new(manager: Arc<M>, entity_type: impl Into<String>) -> Self {
        Self {
            manager,
            entity_type: entity_type.into(),
            id_param: DEFAULT_ID_PARAM.to_string(),
        }
    }

    pub fn with_id_param(mut self, id_param: impl Into<String>) -> Self {
        self.id_param = id_param.into();
        self
    }

    /// The id carried by `params`: strings as is, numbers in their decimal form.
    pub fn requested_id(&self, params: &Params) -> Option<String> {
        match params.get(&self.id_param)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl<M: EntityManager + ?Sized> SearchService for IdentitySearch<M> {
    async fn identity_search(&self, params: &Params) -> Result<Entity> {
        let id = self
            .requested_id(params)
            .ok_or_else(|| UpdateError::not_found(self.entity_type.as_str(), ""))?;
        self.manager
            .find(&self.entity_type, &id)
            .await?
            .ok_or_else(|| UpdateError::not_found(self.entity_type.as_str(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryEntityManager;
    use serde_json::json;

    fn search() -> IdentitySearch<MemoryEntityManager> {
        let manager = MemoryEntityManager::with_entities(vec![
            Entity::new("user").with_id("7").with_field("name", "Ada"),
        ]);
        IdentitySearch::new(Arc::new(manager), "user")
    }

    #[tokio::test]
    async fn test_finds_by_string_or_numeric_id() {
        let search = search();
        let by_string = search
            .identity_search(&Params::create(json!({"id": "7"})))
            .await
            .unwrap();
        assert_eq!(by_string.get_str("name"), Some("Ada"));

        let by_number = search
            .identity_search(&Params::create(json!({"id": 7})))
            .await
            .unwrap();
        assert_eq!(by_number.id(), Some("7"));
    }

    #[tokio::test]
    async fn test_missing_or_unknown_id_is_not_found() {
        let search = search();
        for params in [json!({}), json!({"id": ""}), json!({"id": "8"}), json!({"id": null})] {
            let err = search
                .identity_search(&Params::create(params))
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
    }

    #[tokio::test]
    async fn test_custom_id_param() {
        let search = search().with_id_param("user_id");
        assert!(search
            .identity_search(&Params::create(json!({"user_id": "7"})))
            .await
            .is_ok());
    }
}
