use crate::config::{SideEntityConfig, UpdateConfig};
use crate::core::messages::{ucwords, GENERIC_SUCCESS_MESSAGE};
use crate::core::{AttachToMain, FormSetup, Services, UpdateHooks};
use crate::domain::model::{Entity, Params, Tag};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Update hooks driven by an [`UpdateConfig`].
///
/// Every `[[entities]]` table becomes a side entity: loaded through the main
/// entity's relation when it points at a stored entity, a placeholder
/// otherwise. Side forms read their data from the nested params object named
/// by `data_param`.
#[derive(Debug, Clone)]
pub struct ConfiguredUpdate {
    config: UpdateConfig,
}

impl ConfiguredUpdate {
    pub fn new(config: UpdateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    async fn load_side_entity(
        &self,
        side: &SideEntityConfig,
        main: &Entity,
        services: &Services,
    ) -> Result<Entity> {
        let related_id = side
            .relation
            .as_deref()
            .and_then(|relation| main.relation(relation))
            .and_then(|relation| relation.id.clone());

        if let Some(id) = related_id {
            if let Some(entity) = services.entity_manager.find(&side.entity_type, &id).await? {
                tracing::debug!(
                    tag = %side.tag,
                    id = %id,
                    "🔗 Loaded related {}",
                    side.entity_type
                );
                return Ok(entity);
            }
            tracing::warn!(
                tag = %side.tag,
                id = %id,
                "⚠️ Related {} not found, using a placeholder",
                side.entity_type
            );
        }
        Ok(Entity::placeholder(side.entity_type.as_str()))
    }
}

#[async_trait]
impl UpdateHooks for ConfiguredUpdate {
    fn entity_type(&self) -> &str {
        &self.config.service.entity_type
    }

    fn main_tag(&self) -> &str {
        self.config.main_tag()
    }

    fn id_param(&self) -> &str {
        self.config.id_param()
    }

    async fn generate_entities(
        &self,
        main: &Entity,
        services: &Services,
    ) -> Result<Vec<(Tag, Entity)>> {
        let mut entities = Vec::with_capacity(self.config.entities.len());
        for side in &self.config.entities {
            let entity = self.load_side_entity(side, main, services).await?;
            entities.push((side.tag.clone(), entity));
        }
        Ok(entities)
    }

    fn set_up_form_data_listeners(&self, setup: &mut FormSetup<'_>) {
        let main_tag = setup.main_tag().to_string();
        setup.form_data_event(main_tag, None);
        for side in &self.config.entities {
            setup.set_sub_form_data_handler(side.tag.as_str(), side.data_param());
        }
    }

    fn before_form_generation(&self, setup: &mut FormSetup<'_>) -> Result<()> {
        for side in &self.config.entities {
            if let Some(relation) = &side.relation {
                if side.excluded_fields.is_empty() {
                    setup.attach_to_main_entity(AttachToMain::new(
                        side.tag.as_str(),
                        relation.as_str(),
                    ));
                } else {
                    setup.attach_to_main_entity_excluding(&side.tag, relation);
                }
            }
            if !side.exclude_data.is_empty() {
                setup.configure_form_to_exclude_data(
                    side.tag.as_str(),
                    side.exclude_data.clone(),
                );
            }
        }
        Ok(())
    }

    fn excluded_fields(&self) -> HashMap<Tag, Vec<String>> {
        self.config
            .entities
            .iter()
            .filter(|side| !side.excluded_fields.is_empty())
            .map(|side| (side.tag.clone(), side.excluded_fields.clone()))
            .collect()
    }

    fn display_name(&self) -> String {
        self.config
            .service
            .display_name
            .clone()
            .unwrap_or_else(|| ucwords(self.main_tag()))
    }

    fn generic_success_message(&self) -> String {
        self.config
            .service
            .generic_success_message
            .clone()
            .unwrap_or_else(|| GENERIC_SUCCESS_MESSAGE.to_string())
    }

    fn success_redirect_route_name(&self) -> &str {
        self.config.success_route()
    }

    fn success_redirect_route_params(&self) -> Params {
        self.config.success_route_params()
    }
}
