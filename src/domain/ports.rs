use crate::domain::model::{Entity, FormMessages, Params, RouteOptions};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A data-entry form bound to one entity.
pub trait Form: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn element_names(&self) -> Vec<String>;

    fn has_element(&self, name: &str) -> bool {
        self.element_names().iter().any(|element| element == name)
    }

    /// Drops an element from the form. Returns false when it did not exist.
    fn remove(&mut self, element: &str) -> bool;

    fn set_data(&mut self, data: Params);

    fn data(&self) -> &Params;

    /// Restricts validation to the named elements.
    fn set_validation_group(&mut self, elements: Vec<String>);

    fn validation_group(&self) -> Option<&[String]>;

    /// Validates the bound data. On success the bound object is hydrated.
    fn is_valid(&mut self) -> bool;

    fn messages(&self) -> &FormMessages;

    fn object(&self) -> &Entity;

    fn object_mut(&mut self) -> &mut Entity;
}

/// Converts entities into forms bound to them.
pub trait FormFactory: Send + Sync {
    fn convert_entity(&self, entity: &Entity) -> Result<Box<dyn Form>>;
}

/// Unit-of-work style persistence.
#[async_trait]
pub trait EntityManager: Send + Sync {
    async fn find(&self, entity_type: &str, id: &str) -> Result<Option<Entity>>;

    /// Stages the entity for the next flush, assigning an id when it has none.
    async fn persist(&self, entity: &mut Entity) -> Result<()>;

    /// Stages the removal of a stored entity for the next flush.
    async fn remove(&self, entity: &Entity) -> Result<()>;

    /// Writes every staged entity and returns how many were written.
    async fn flush(&self) -> Result<usize>;

    async fn pending(&self) -> usize;
}

/// Looks up the main entity of an update from request parameters.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Returns `UpdateError::NotFound` when no entity matches.
    async fn identity_search(&self, params: &Params) -> Result<Entity>;
}

/// Assembles URLs from named routes.
pub trait Router: Send + Sync {
    fn url_from_route(&self, route: &str, params: &Params, options: &RouteOptions)
        -> Result<String>;
}
