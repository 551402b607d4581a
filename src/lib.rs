pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod forms;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::UpdateConfig;

pub use crate::core::{Services, UpdateHooks, UpdateService};
pub use domain::model::{Entity, Operation, Params, UpdateOptions, UpdateOutcome};
pub use utils::error::{Result, UpdateError};
