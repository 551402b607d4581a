pub mod configured;

pub use configured::ConfiguredUpdate;

use crate::adapters::IdentitySearch;
use crate::config::UpdateConfig;
use crate::core::{Services, UpdateService};
use crate::domain::model::{Params, UpdateOptions, UpdateOutcome};
use crate::domain::ports::{EntityManager, SearchService};
use crate::utils::error::Result;

fn configured_service(
    config: UpdateConfig,
    services: Services,
) -> (UpdateService<ConfiguredUpdate>, IdentitySearch<dyn EntityManager>) {
    let search = IdentitySearch::new(
        services.entity_manager.clone(),
        config.service.entity_type.as_str(),
    )
    .with_id_param(config.id_param());
    let use_session_message = config.use_session_message();

    let mut service = UpdateService::new(ConfiguredUpdate::new(config), services);
    service.set_use_session_message(use_session_message);
    (service, search)
}

/// Runs one update with the collaborators described by `config`.
pub async fn run_update(
    config: UpdateConfig,
    params: &Params,
    options: UpdateOptions,
) -> Result<UpdateOutcome> {
    let services = config.build_services()?;
    run_update_with(config, services, params, options).await
}

/// Locates or creates the main entity, validates `params` and persists on success.
pub async fn run_update_with(
    config: UpdateConfig,
    services: Services,
    params: &Params,
    options: UpdateOptions,
) -> Result<UpdateOutcome> {
    let (mut service, search) = configured_service(config, services);
    service.set_main_entity_from_param(params, &search).await?;

    let valid = service.update(params, options).await?;
    if valid {
        tracing::info!(operation = %service.operation(), "✅ Update completed");
    } else {
        tracing::warn!(forms = service.error_messages().len(), "❌ Update rejected");
    }
    service.outcome()
}

/// Deletes the entity identified by `params`. A missing entity is an error.
pub async fn run_delete_with(
    config: UpdateConfig,
    services: Services,
    params: &Params,
    options: UpdateOptions,
) -> Result<UpdateOutcome> {
    let (mut service, search) = configured_service(config, services);
    let entity = search.identity_search(params).await?;
    service.set_entity(entity);
    service.delete(options).await?;
    service.outcome()
}

pub async fn run_delete(
    config: UpdateConfig,
    params: &Params,
    options: UpdateOptions,
) -> Result<UpdateOutcome> {
    let services = config.build_services()?;
    run_delete_with(config, services, params, options).await
}
