use crate::core::events::{EntityListener, EntityMap, EventManager, FormListener};
use crate::core::listeners::{self, AfterAttach, AttachToMain, DataTransform};
use crate::core::messages::{ucwords, GENERIC_SUCCESS_MESSAGE};
use crate::domain::model::{Entity, Params, RouteOptions, Tag, DEFAULT_ID_PARAM, MAIN_TAG};
use crate::domain::ports::{EntityManager, Form, FormFactory, Router};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Replaces `form.is_valid()` for one tag.
pub type FormValidator = Box<dyn Fn(&Params, &mut dyn Form) -> bool + Send + Sync>;

pub type FormValidators = HashMap<Tag, FormValidator>;

/// Collaborators an update delegates to.
#[derive(Clone)]
pub struct Services {
    pub entity_manager: Arc<dyn EntityManager>,
    pub forms: Arc<dyn FormFactory>,
    pub router: Arc<dyn Router>,
}

impl Services {
    pub fn new(
        entity_manager: Arc<dyn EntityManager>,
        forms: Arc<dyn FormFactory>,
        router: Arc<dyn Router>,
    ) -> Self {
        Self {
            entity_manager,
            forms,
            router,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Specialization points of an update for one entity type.
///
/// Only `entity_type` is required; every other hook has the behaviour of a
/// plain single-form update.
#[async_trait]
pub trait UpdateHooks: Send + Sync {
    fn entity_type(&self) -> &str;

    fn main_tag(&self) -> &str {
        MAIN_TAG
    }

    fn id_param(&self) -> &str {
        DEFAULT_ID_PARAM
    }

    fn create_new_entity(&self, _params: &Params) -> Entity {
        Entity::new(self.entity_type())
    }

    fn pre_set_entity(&self, entity: Entity) -> Entity {
        entity
    }

    /// Side entities of the update, keyed by tag. The main entity is added after them.
    async fn generate_entities(
        &self,
        _main: &Entity,
        _services: &Services,
    ) -> Result<Vec<(Tag, Entity)>> {
        Ok(Vec::new())
    }

    fn generate_form_validators(&self) -> FormValidators {
        FormValidators::new()
    }

    fn set_up_form_data_listeners(&self, setup: &mut FormSetup<'_>) {
        let main_tag = setup.main_tag().to_string();
        setup.form_data_event(main_tag, None);
    }

    /// Runs once, after the entities exist and before they are turned into forms.
    fn before_form_generation(&self, _setup: &mut FormSetup<'_>) -> Result<()> {
        Ok(())
    }

    /// Fields removed from attached sub-forms, per tag.
    fn excluded_fields(&self) -> HashMap<Tag, Vec<String>> {
        HashMap::new()
    }

    async fn after_persist(&self, _entities: &EntityMap, _services: &Services) -> Result<()> {
        Ok(())
    }

    fn display_name(&self) -> String {
        ucwords(self.main_tag())
    }

    fn generic_success_message(&self) -> String {
        GENERIC_SUCCESS_MESSAGE.to_string()
    }

    fn success_redirect_route_name(&self) -> &str {
        "home"
    }

    fn success_redirect_route_params(&self) -> Params {
        Params::new()
    }

    fn success_redirect_route_options(&self) -> RouteOptions {
        RouteOptions::default()
    }
}

/// Handle given to hooks for wiring listeners while forms are being set up.
pub struct FormSetup<'a> {
    main_tag: &'a str,
    entities: &'a EntityMap,
    events: &'a mut EventManager,
    excluded_fields: HashMap<Tag, Vec<String>>,
}

impl<'a> FormSetup<'a> {
    pub fn new(
        main_tag: &'a str,
        entities: &'a EntityMap,
        events: &'a mut EventManager,
        excluded_fields: HashMap<Tag, Vec<String>>,
    ) -> Self {
        Self {
            main_tag,
            entities,
            events,
            excluded_fields,
        }
    }

    pub fn main_tag(&self) -> &str {
        self.main_tag
    }

    pub fn entities(&self) -> &EntityMap {
        self.entities
    }

    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut *self.events
    }

    pub fn form_data_event(&mut self, tag: impl Into<Tag>, transform: Option<DataTransform>) {
        self.events
            .attach_form_data(tag, listeners::form_data(transform));
    }

    pub fn set_sub_form_data_handler(&mut self, tag: impl Into<Tag>, param: impl Into<String>) {
        self.events
            .attach_form_data(tag, listeners::sub_form_data(param));
    }

    pub fn configure_form_to_exclude_data(&mut self, tag: impl Into<Tag>, elements: Vec<String>) {
        self.events
            .attach_form(tag, listeners::exclude_data(elements));
    }

    pub fn attach_to_main_entity(&mut self, attach: AttachToMain) {
        let tag = attach.tag.clone();
        self.events
            .attach_form(tag, listeners::attach_to_main_entity(self.main_tag, attach));
    }

    /// Attaches `tag` through `relation` and strips its excluded fields afterwards.
    pub fn attach_to_main_entity_excluding(&mut self, tag: &str, relation: &str) {
        let after_attach = self.after_attach_exclusions(tag);
        self.attach_to_main_entity(AttachToMain::new(tag, relation).with_after_attach(after_attach));
    }

    pub fn excluded_fields_for(&self, tag: &str) -> Vec<String> {
        self.excluded_fields.get(tag).cloned().unwrap_or_default()
    }

    pub fn after_attach_exclusions(&self, tag: &str) -> AfterAttach {
        listeners::remove_fields(self.excluded_fields_for(tag))
    }

    pub fn on_configure_entity(&mut self, tag: impl Into<Tag>, listener: EntityListener) {
        self.events.attach_entity(tag, listener);
    }

    pub fn on_configure_form(&mut self, tag: impl Into<Tag>, listener: FormListener) {
        self.events.attach_form(tag, listener);
    }
}
