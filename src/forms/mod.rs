//! Schema driven forms: the form library the update workflow binds entities to.

pub mod element;
pub mod factory;
pub mod form;

pub use element::{Element, Pattern, Rule};
pub use factory::{FormSchema, SchemaFormFactory};
pub use form::EntityForm;
