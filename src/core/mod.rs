pub mod events;
pub mod hooks;
pub mod listeners;
pub mod messages;
pub mod update;

pub use events::{EntityMap, EventKind, EventManager, FormMapEntries};
pub use hooks::{FormSetup, FormValidator, FormValidators, Services, UpdateHooks};
pub use listeners::{AttachEvent, AttachToMain};
pub use update::{FormMap, UpdateService};
pub use crate::utils::error::Result;
