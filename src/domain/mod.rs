// Domain layer: core models and ports (interfaces) for the update workflow.

pub mod model;
pub mod ports;
