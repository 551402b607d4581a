use crate::core::events::{EntityMap, EventManager, FormMapEntries};
use crate::core::hooks::{FormSetup, FormValidators, Services, UpdateHooks};
use crate::core::listeners;
use crate::core::messages::{deleted_message, edit_link_message, normalize_messages};
use crate::domain::model::{
    Entity, ErrorMessages, Operation, Params, RedirectTarget, RouteOptions, Tag, UpdateOptions,
    UpdateOutcome,
};
use crate::domain::ports::{Form, SearchService};
use crate::utils::error::{Result, UpdateError};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Forms of an update, in entity order.
pub type FormMap = IndexMap<Tag, Box<dyn Form>>;

/// Locates or creates an entity, binds forms to it and its side entities,
/// validates submitted data and persists the result.
pub struct UpdateService<H: UpdateHooks> {
    hooks: H,
    services: Services,
    events: EventManager,
    entity: Option<Entity>,
    entities: Option<EntityMap>,
    forms: Option<FormMap>,
    form_validators: Option<FormValidators>,
    form_map: FormMapEntries,
    params: Option<Params>,
    valid: Option<bool>,
    error_messages: ErrorMessages,
    operation: Operation,
    use_session_message: bool,
    form_data_ready: bool,
}

impl<H: UpdateHooks> UpdateService<H> {
    pub fn new(hooks: H, services: Services) -> Self {
        let mut service = Self {
            hooks,
            services,
            events: EventManager::new(),
            entity: None,
            entities: None,
            forms: None,
            form_validators: None,
            form_map: FormMapEntries::new(),
            params: None,
            valid: None,
            error_messages: ErrorMessages::new(),
            operation: Operation::None,
            use_session_message: true,
            form_data_ready: false,
        };
        service.events.set_identifiers(Self::identifiers());
        service
    }

    fn identifiers() -> Vec<String> {
        vec![
            std::any::type_name::<UpdateService<H>>().to_string(),
            std::any::type_name::<H>().to_string(),
        ]
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Back to the state of a freshly built service. Listeners are dropped too.
    pub fn reset(&mut self) -> &mut Self {
        self.entity = None;
        self.entities = None;
        self.forms = None;
        self.form_validators = None;
        self.form_map.clear();
        self.params = None;
        self.valid = None;
        self.error_messages.clear();
        self.operation = Operation::None;
        self.use_session_message = true;
        self.events.clear();
        self.form_data_ready = false;
        self
    }

    pub fn create_new_entity(&self, params: &Params) -> Entity {
        self.hooks.create_new_entity(params)
    }

    /// Uses the entity found by `search`, or a new one when nothing matches.
    pub async fn set_main_entity_from_param(
        &mut self,
        params: &Params,
        search: &dyn SearchService,
    ) -> Result<&mut Self> {
        let entity = match search.identity_search(params).await {
            Ok(entity) => {
                tracing::debug!(id = ?entity.id(), "🔎 Found existing {}", entity.entity_type);
                self.set_operation(Operation::Update);
                entity
            }
            Err(UpdateError::NotFound { entity_type, id }) => {
                tracing::debug!("🆕 No {} matches '{}', creating a new one", entity_type, id);
                self.set_operation(Operation::Create);
                self.create_new_entity(params)
            }
            Err(e) => return Err(e),
        };
        Ok(self.set_entity(entity))
    }

    /// Stores the main entity. Already generated entities and forms are kept.
    pub fn set_entity(&mut self, entity: Entity) -> &mut Self {
        self.operation = if entity.is_new() {
            Operation::Create
        } else {
            Operation::Update
        };
        self.entity = Some(self.hooks.pre_set_entity(entity));
        self
    }

    pub fn main_entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    pub async fn entities(&mut self) -> Result<&EntityMap> {
        self.ensure_entities().await?;
        self.entities.as_ref().ok_or(UpdateError::MissingEntity)
    }

    async fn ensure_entities(&mut self) -> Result<()> {
        if self.entities.is_some() {
            return Ok(());
        }
        let main = self.entity.clone().ok_or(UpdateError::MissingEntity)?;
        let main_tag = self.hooks.main_tag().to_string();

        let mut entities = EntityMap::new();
        for (tag, entity) in self.hooks.generate_entities(&main, &self.services).await? {
            entities.insert(tag, entity);
        }
        entities.insert(main_tag, main);

        let tags: Vec<Tag> = entities.keys().cloned().collect();
        for tag in &tags {
            self.events.trigger_entity(tag, &mut entities)?;
            if let Some(entity) = entities.get_mut(tag) {
                entity.set_form_tag(tag.as_str());
            }
        }

        tracing::debug!(tags = ?tags, "📦 Entities generated");
        self.entities = Some(entities);
        Ok(())
    }

    /// Replaces the entity at `tag` and fires its configure event again.
    pub async fn swap_entity(&mut self, tag: &str, entity: Entity) -> Result<&mut Self> {
        self.ensure_entities().await?;
        let entities = self.entities.as_mut().ok_or(UpdateError::MissingEntity)?;
        crate::core::events::swap_entity(&self.events, entities, tag, entity)?;
        // 表單已建立時，改綁到新的實體
        if let (Some(form), Some(configured)) = (
            self.forms.as_mut().and_then(|forms| forms.get_mut(tag)),
            entities.get(tag),
        ) {
            *form.object_mut() = configured.clone();
        }
        Ok(self)
    }

    pub async fn entities_as_json(&mut self) -> Result<Map<String, Value>> {
        let entities = self.entities().await?;
        Ok(entities
            .iter()
            .map(|(tag, entity)| (tag.clone(), entity.flatten()))
            .collect())
    }

    /// Entity registered under `tag`, the main tag when `None`.
    pub async fn entity(&mut self, tag: Option<&str>) -> Result<&Entity> {
        self.ensure_entities().await?;
        let tag = tag.unwrap_or(self.hooks.main_tag());
        self.entities
            .as_ref()
            .and_then(|entities| entities.get(tag))
            .ok_or_else(|| UpdateError::unknown_tag(tag))
    }

    pub async fn forms(&mut self) -> Result<&FormMap> {
        self.ensure_forms().await?;
        self.forms.as_ref().ok_or(UpdateError::MissingEntity)
    }

    /// Form registered under `tag`, the main tag when `None`.
    pub async fn form(&mut self, tag: Option<&str>) -> Result<&dyn Form> {
        self.ensure_forms().await?;
        let tag = tag.unwrap_or(self.hooks.main_tag());
        self.forms
            .as_ref()
            .and_then(|forms| forms.get(tag))
            .map(|form| form.as_ref())
            .ok_or_else(|| UpdateError::unknown_tag(tag))
    }

    pub async fn form_mut(&mut self, tag: Option<&str>) -> Result<&mut dyn Form> {
        self.ensure_forms().await?;
        let tag = tag.unwrap_or(self.hooks.main_tag());
        match self.forms.as_mut().and_then(|forms| forms.get_mut(tag)) {
            Some(form) => Ok(form.as_mut()),
            None => Err(UpdateError::unknown_tag(tag)),
        }
    }

    async fn ensure_forms(&mut self) -> Result<()> {
        if self.forms.is_some() {
            return Ok(());
        }
        self.ensure_entities().await?;

        let Self {
            hooks,
            services,
            events,
            entities,
            form_map,
            ..
        } = self;
        let entities = entities.as_mut().ok_or(UpdateError::MissingEntity)?;

        {
            let mut setup =
                FormSetup::new(hooks.main_tag(), &*entities, events, hooks.excluded_fields());
            hooks.before_form_generation(&mut setup)?;
        }

        let tags: Vec<Tag> = entities.keys().cloned().collect();
        let mut forms = FormMap::new();
        for tag in tags {
            let entity = entities
                .get(&tag)
                .ok_or_else(|| UpdateError::unknown_tag(tag.as_str()))?;
            let mut form = services.forms.convert_entity(entity)?;
            events.trigger_form(&tag, form.as_mut(), entities, form_map)?;
            tracing::debug!(tag = %tag, form = form.name(), "📝 Form configured");
            forms.insert(tag, form);
        }

        self.forms = Some(forms);
        Ok(())
    }

    fn set_up_form_data_listeners(&mut self) -> Result<()> {
        if self.form_data_ready {
            return Ok(());
        }
        let Self {
            hooks,
            events,
            entities,
            ..
        } = self;
        let entities = entities.as_ref().ok_or(UpdateError::MissingEntity)?;
        let mut setup = FormSetup::new(hooks.main_tag(), entities, events, hooks.excluded_fields());
        hooks.set_up_form_data_listeners(&mut setup);
        self.form_data_ready = true;
        Ok(())
    }

    fn ensure_form_validators(&mut self) {
        if self.form_validators.is_none() {
            self.form_validators = Some(self.hooks.generate_form_validators());
        }
    }

    /// Binds `params` to every form, validates them and persists on success.
    pub async fn update(&mut self, params: &Params, options: UpdateOptions) -> Result<bool> {
        self.ensure_forms().await?;
        self.set_up_form_data_listeners()?;
        self.params = Some(params.clone());
        self.error_messages.clear();

        let tags: Vec<Tag> = self
            .forms
            .as_ref()
            .map(|forms| forms.keys().cloned().collect())
            .unwrap_or_default();
        tracing::info!(
            entity_type = self.hooks.entity_type(),
            operation = %self.operation,
            forms = tags.len(),
            "🔄 Validating update"
        );

        let mut valid = true;
        for tag in &tags {
            if !self.update_iteration(tag, params)? {
                valid = false;
                if options.short_circuit {
                    tracing::debug!(tag = %tag, "⏹️ Short-circuiting after first invalid form");
                    break;
                }
            }
        }

        self.valid = Some(valid);
        self.post_validate(valid, options).await?;
        Ok(valid)
    }

    /// Binds and validates the form at `tag`. Forms must already exist.
    pub fn update_iteration(&mut self, tag: &str, params: &Params) -> Result<bool> {
        self.ensure_form_validators();
        let Self {
            forms,
            events,
            form_validators,
            error_messages,
            ..
        } = self;
        let form = forms
            .as_mut()
            .and_then(|forms| forms.get_mut(tag))
            .ok_or_else(|| UpdateError::unknown_tag(tag))?;

        events.trigger_form_data(tag, form.as_mut(), params)?;

        let valid = match form_validators.as_ref().and_then(|validators| validators.get(tag)) {
            Some(validator) => validator(params, form.as_mut()),
            None => form.is_valid(),
        };

        if !valid {
            let normalized = normalize_messages(form.messages());
            tracing::warn!(tag = %tag, fields = normalized.len(), "⚠️ Form validation failed");
            error_messages.insert(tag.to_string(), normalized);
        }
        Ok(valid)
    }

    async fn post_validate(&mut self, valid: bool, options: UpdateOptions) -> Result<()> {
        if !valid {
            return Ok(());
        }
        self.sync_entities_from_forms()?;

        let main_tag = self.hooks.main_tag().to_string();
        let entity_manager = self.services.entity_manager.clone();
        let entities = self.entities.as_mut().ok_or(UpdateError::MissingEntity)?;

        // 關聯目標先寫入，主實體最後，才能取得關聯的 id
        let mut order: Vec<Tag> = entities
            .keys()
            .filter(|tag| **tag != main_tag)
            .cloned()
            .collect();
        if entities.contains_key(&main_tag) {
            order.push(main_tag.clone());
        }

        let mut persisted: HashMap<Tag, String> = HashMap::new();
        for tag in &order {
            let entity = entities
                .get_mut(tag)
                .ok_or_else(|| UpdateError::unknown_tag(tag.as_str()))?;
            for relation in entity.relations.values_mut() {
                if let Some(id) = persisted.get(&relation.tag) {
                    relation.id = Some(id.clone());
                }
            }
            entity_manager.persist(entity).await?;
            if let Some(id) = entity.id() {
                persisted.insert(tag.clone(), id.to_string());
            }
        }

        if options.no_flush {
            tracing::debug!(staged = order.len(), "⏸️ Flush skipped, caller owns the unit of work");
        } else {
            let written = entity_manager.flush().await?;
            tracing::info!(written, "💾 Update persisted");
        }

        if let Some(forms) = self.forms.as_mut() {
            for (tag, form) in forms.iter_mut() {
                if let Some(entity) = entities.get(tag) {
                    *form.object_mut() = entity.clone();
                }
            }
        }
        self.entity = entities.get(&main_tag).cloned();

        self.hooks.after_persist(entities, &self.services).await
    }

    // 表單物件是驗證後的最新資料；實體上後來設定的關聯優先保留
    fn sync_entities_from_forms(&mut self) -> Result<()> {
        let (Some(entities), Some(forms)) = (self.entities.as_mut(), self.forms.as_ref()) else {
            return Err(UpdateError::MissingEntity);
        };
        for (tag, form) in forms {
            let mut object = form.object().clone();
            if let Some(current) = entities.get(tag) {
                object.relations.extend(current.relations.clone());
                if object.id.is_none() {
                    object.id = current.id.clone();
                }
            }
            object.set_form_tag(tag.as_str());
            entities.insert(tag.clone(), object);
        }
        Ok(())
    }

    /// Removes the main entity and marks the update as a delete.
    pub async fn delete(&mut self, options: UpdateOptions) -> Result<()> {
        let entity = self.entity.as_ref().ok_or(UpdateError::MissingEntity)?;
        let entity_manager = self.services.entity_manager.clone();
        entity_manager.remove(entity).await?;
        if !options.no_flush {
            entity_manager.flush().await?;
        }
        tracing::info!(id = ?entity.id(), "🗑️ {} deleted", entity.entity_type);
        self.operation = Operation::Delete;
        self.valid = Some(true);
        Ok(())
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// `None` until `update` (or `set_valid`) ran.
    pub fn valid(&self) -> Option<bool> {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) -> &mut Self {
        self.valid = Some(valid);
        self
    }

    pub fn error_messages(&self) -> &ErrorMessages {
        &self.error_messages
    }

    pub fn set_error_messages(&mut self, error_messages: ErrorMessages) -> &mut Self {
        self.error_messages = error_messages;
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    pub fn use_session_message(&self) -> bool {
        self.use_session_message
    }

    pub fn set_use_session_message(&mut self, use_session_message: bool) -> &mut Self {
        self.use_session_message = use_session_message;
        self
    }

    pub fn configure_form_to_exclude_data(&mut self, tag: &str, elements: Vec<String>) {
        self.events
            .attach_form(tag, listeners::exclude_data(elements));
    }

    pub fn set_sub_form_data_handler(&mut self, tag: &str, param: &str) -> &mut Self {
        self.events
            .attach_form_data(tag, listeners::sub_form_data(param));
        self
    }

    pub fn set_form_map_entry(&mut self, key: impl Into<String>, tag: impl Into<Tag>) -> &mut Self {
        self.form_map.insert(key.into(), tag.into());
        self
    }

    pub fn form_map(&self) -> &FormMapEntries {
        &self.form_map
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventManager {
        &mut self.events
    }

    pub fn set_event_manager(&mut self, mut events: EventManager) -> &mut Self {
        events.set_identifiers(Self::identifiers());
        self.events = events;
        self
    }

    pub fn entity_display_name(&self) -> String {
        self.hooks.display_name()
    }

    pub fn generic_success_message(&self) -> String {
        self.hooks.generic_success_message()
    }

    // 訊息使用實體清單中的主實體（持久化後已有 id），尚未產生時退回 set_entity 的實體
    fn current_entity(&self) -> Result<&Entity> {
        self.entities
            .as_ref()
            .and_then(|entities| entities.get(self.hooks.main_tag()))
            .or(self.entity.as_ref())
            .ok_or(UpdateError::MissingEntity)
    }

    pub fn entity_edit_url(&self, entity: &Entity) -> Result<String> {
        let mut params = Params::new();
        params.insert(
            self.hooks.id_param(),
            entity.id().map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        params.insert("action", "edit");
        self.services.router.url_from_route(
            self.success_redirect_route_name(),
            &params,
            &RouteOptions::default(),
        )
    }

    pub fn update_success_message(&self) -> Result<String> {
        let url = self.entity_edit_url(self.current_entity()?)?;
        Ok(edit_link_message(&self.entity_display_name(), "updated", &url))
    }

    pub fn create_success_message(&self) -> Result<String> {
        let url = self.entity_edit_url(self.current_entity()?)?;
        Ok(edit_link_message(&self.entity_display_name(), "created", &url))
    }

    pub fn delete_success_message(&self) -> String {
        deleted_message(&self.entity_display_name())
    }

    pub fn success_message(&self, operation: Operation) -> Result<String> {
        match operation {
            Operation::Create => self.create_success_message(),
            Operation::Update => self.update_success_message(),
            Operation::Delete => Ok(self.delete_success_message()),
            Operation::None => Ok(self.generic_success_message()),
        }
    }

    /// Success message for the current operation.
    pub fn formatted_success_message(&self) -> Result<String> {
        self.success_message(self.operation)
    }

    pub fn success_redirect_route_name(&self) -> &str {
        self.hooks.success_redirect_route_name()
    }

    pub fn success_redirect_route_params(&self) -> Params {
        self.hooks.success_redirect_route_params()
    }

    pub fn success_redirect_route_options(&self) -> RouteOptions {
        self.hooks.success_redirect_route_options()
    }

    pub fn success_redirect(&self) -> Result<RedirectTarget> {
        let route = self.success_redirect_route_name().to_string();
        let params = self.success_redirect_route_params();
        let options = self.success_redirect_route_options();
        let url = self
            .services
            .router
            .url_from_route(&route, &params, &options)?;
        Ok(RedirectTarget {
            route,
            params,
            options,
            url,
        })
    }

    /// Summary for the caller: success message and redirect, or the form errors.
    pub fn outcome(&self) -> Result<UpdateOutcome> {
        let valid = self.valid.unwrap_or(false);
        let (message, redirect) = if valid {
            (
                Some(self.formatted_success_message()?),
                Some(self.success_redirect()?),
            )
        } else {
            (None, None)
        };
        Ok(UpdateOutcome {
            valid,
            operation: self.operation,
            message,
            errors: self.error_messages.clone(),
            redirect,
            use_session_message: self.use_session_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryEntityManager, RouteTable};
    use crate::core::events::{EntityEvent, EventKind, FormEvent};
    use crate::core::hooks::FormValidator;
    use crate::core::listeners::DataTransform;
    use crate::domain::ports::EntityManager;
    use crate::forms::{Element, FormSchema, Rule, SchemaFormFactory};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct UserHooks {
        with_address: bool,
        reject_main: bool,
        address_country: Option<&'static str>,
        failing_form_listener: bool,
        full_name_param: bool,
    }

    #[async_trait]
    impl UpdateHooks for UserHooks {
        fn entity_type(&self) -> &str {
            "user"
        }

        async fn generate_entities(
            &self,
            _main: &Entity,
            _services: &Services,
        ) -> Result<Vec<(Tag, Entity)>> {
            if self.with_address {
                Ok(vec![("address".to_string(), Entity::placeholder("address"))])
            } else {
                Ok(Vec::new())
            }
        }

        fn generate_form_validators(&self) -> FormValidators {
            let mut validators = FormValidators::new();
            if self.reject_main {
                let reject: FormValidator = Box::new(|_: &Params, _: &mut dyn Form| false);
                validators.insert("entity".to_string(), reject);
            }
            validators
        }

        fn set_up_form_data_listeners(&self, setup: &mut FormSetup<'_>) {
            if self.full_name_param {
                let transform: DataTransform = Arc::new(|data: &Params| {
                    Params::from_pairs([("name", data.get_or("full_name", Value::Null))])
                });
                setup.form_data_event("entity", Some(transform));
            } else {
                setup.form_data_event("entity", None);
            }
            if self.with_address {
                setup.set_sub_form_data_handler("address", "address");
            }
        }

        fn before_form_generation(&self, setup: &mut FormSetup<'_>) -> Result<()> {
            if self.with_address {
                setup.attach_to_main_entity_excluding("address", "address");
            }
            if let Some(country) = self.address_country {
                setup.on_configure_entity(
                    "address",
                    Box::new(move |event: &mut EntityEvent<'_>| {
                        if let Some(address) = event.entity_mut() {
                            address.set("country", country);
                        }
                        Ok(())
                    }),
                );
            }
            if self.failing_form_listener {
                setup.on_configure_form(
                    "entity",
                    Box::new(|_: &mut FormEvent<'_>| Err(UpdateError::form("form setup failed"))),
                );
            }
            Ok(())
        }

        fn excluded_fields(&self) -> HashMap<Tag, Vec<String>> {
            HashMap::from([("address".to_string(), vec!["country".to_string()])])
        }

        fn display_name(&self) -> String {
            "User".to_string()
        }

        fn success_redirect_route_name(&self) -> &str {
            "user"
        }
    }

    fn services(manager: Arc<MemoryEntityManager>) -> Services {
        let forms = SchemaFormFactory::new()
            .with_schema(
                FormSchema::new("user")
                    .with_element(Element::new("name").with_rule(Rule::Required))
                    .with_element(Element::new("email").with_rule(Rule::Email)),
            )
            .with_schema(
                FormSchema::new("address")
                    .with_element(Element::new("street").with_rule(Rule::Required))
                    .with_element(Element::new("country").with_rule(Rule::Required)),
            );
        let router = RouteTable::new("http://localhost/")
            .unwrap()
            .with_route("user", "/users/:action?/:id?");
        Services::new(manager, Arc::new(forms), Arc::new(router))
    }

    fn build_service(hooks: UserHooks) -> (UpdateService<UserHooks>, Arc<MemoryEntityManager>) {
        let manager = Arc::new(MemoryEntityManager::new());
        (UpdateService::new(hooks, services(manager.clone())), manager)
    }

    fn params(value: Value) -> Params {
        Params::create(value)
    }

    #[tokio::test]
    async fn test_create_persists_and_builds_messages() {
        let (mut service, manager) = build_service(UserHooks::default());
        service.set_entity(Entity::new("user"));
        assert_eq!(service.operation(), Operation::Create);

        let valid = service
            .update(
                &params(json!({"name": "Ada", "email": "ada@example.com"})),
                UpdateOptions::default(),
            )
            .await
            .unwrap();

        assert!(valid);
        assert_eq!(service.valid(), Some(true));
        assert_eq!(manager.pending().await, 0);
        let stored = manager.all("user").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_str("name"), Some("Ada"));

        let id = stored[0].id().unwrap().to_string();
        assert_eq!(service.main_entity().and_then(Entity::id), Some(id.as_str()));
        assert_eq!(
            service.create_success_message().unwrap(),
            format!(
                "User was created. <a href=\"http://localhost/users/edit/{}\">Click here to edit.</a>",
                id
            )
        );

        let outcome = service.outcome().unwrap();
        assert!(outcome.valid);
        assert_eq!(outcome.operation, Operation::Create);
        assert!(outcome.use_session_message);
        assert_eq!(outcome.redirect.unwrap().url, "http://localhost/users");
    }

    #[tokio::test]
    async fn test_set_main_entity_from_param() {
        let manager = Arc::new(MemoryEntityManager::with_entities(vec![Entity::new("user")
            .with_id("7")
            .with_field("name", "Ada")]));
        let search = crate::adapters::IdentitySearch::new(manager.clone(), "user");
        let mut service = UpdateService::new(UserHooks::default(), services(manager.clone()));

        service
            .set_main_entity_from_param(&params(json!({"id": "7"})), &search)
            .await
            .unwrap();
        assert_eq!(service.operation(), Operation::Update);
        assert_eq!(service.main_entity().unwrap().get_str("name"), Some("Ada"));

        service.reset();
        service
            .set_main_entity_from_param(&params(json!({"id": "404"})), &search)
            .await
            .unwrap();
        assert_eq!(service.operation(), Operation::Create);
        assert!(service.main_entity().unwrap().is_new());
    }

    #[tokio::test]
    async fn test_update_existing_entity_keeps_untouched_fields() {
        let manager = Arc::new(MemoryEntityManager::with_entities(vec![Entity::new("user")
            .with_id("7")
            .with_field("name", "Ada")
            .with_field("email", "ada@example.com")]));
        let mut service = UpdateService::new(UserHooks::default(), services(manager.clone()));
        let existing = manager.find("user", "7").await.unwrap().unwrap();
        service.set_entity(existing);

        assert!(service
            .update(&params(json!({"name": "Grace"})), UpdateOptions::default())
            .await
            .unwrap());

        let stored = manager.find("user", "7").await.unwrap().unwrap();
        assert_eq!(stored.get_str("name"), Some("Grace"));
        assert_eq!(stored.get_str("email"), Some("ada@example.com"));
        assert!(service
            .formatted_success_message()
            .unwrap()
            .starts_with("User was updated."));
    }

    #[tokio::test]
    async fn test_attached_side_entity_is_persisted_before_main() {
        let (mut service, manager) = build_service(UserHooks {
            with_address: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));

        let address_form = service.form(Some("address")).await.unwrap();
        assert!(!address_form.has_element("country"));
        assert_eq!(service.form_map().get("address").map(String::as_str), Some("address"));

        let valid = service
            .update(
                &params(json!({
                    "name": "Ada",
                    "address": {"street": "Main St"}
                })),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert!(valid);

        let addresses = manager.all("address").await;
        let users = manager.all("user").await;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].get_str("street"), Some("Main St"));
        assert_eq!(
            users[0].relation("address").and_then(|r| r.id.as_deref()),
            addresses[0].id()
        );

        let json = service.entities_as_json().await.unwrap();
        assert_eq!(json["address"]["street"], json!("Main St"));
        assert_eq!(json["entity"]["address"], json!(addresses[0].id()));
    }

    #[tokio::test]
    async fn test_short_circuit_stops_at_first_invalid_form() {
        let invalid = params(json!({"email": "nope", "address": {}}));

        let (mut service, _) = build_service(UserHooks {
            with_address: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));
        assert!(!service.update(&invalid, UpdateOptions::default()).await.unwrap());
        let tags: Vec<&str> = service.error_messages().keys().map(String::as_str).collect();
        assert_eq!(tags, vec!["address", "entity"]);
        assert_eq!(
            service.error_messages()["entity"]["email"],
            vec!["The input is not a valid email address".to_string()]
        );

        let (mut service, manager) = build_service(UserHooks {
            with_address: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));
        assert!(!service.update(&invalid, UpdateOptions::short_circuit()).await.unwrap());
        assert_eq!(service.error_messages().len(), 1);
        assert!(service.error_messages().contains_key("address"));
        assert_eq!(manager.committed_count().await, 0);
        assert!(service.outcome().unwrap().message.is_none());
    }

    #[tokio::test]
    async fn test_no_flush_leaves_writes_staged() {
        let (mut service, manager) = build_service(UserHooks::default());
        service.set_entity(Entity::new("user"));

        assert!(service
            .update(&params(json!({"name": "Ada"})), UpdateOptions::no_flush())
            .await
            .unwrap());
        assert_eq!(manager.pending().await, 1);
        assert_eq!(manager.committed_count().await, 0);
    }

    #[tokio::test]
    async fn test_tagged_validator_replaces_form_validation() {
        let (mut service, manager) = build_service(UserHooks {
            reject_main: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));

        let valid = service
            .update(&params(json!({"name": "Ada"})), UpdateOptions::default())
            .await
            .unwrap();
        assert!(!valid);
        assert!(service.error_messages()["entity"].is_empty());
        assert_eq!(manager.pending().await, 0);
    }

    #[tokio::test]
    async fn test_error_messages_reset_between_updates() {
        let (mut service, _) = build_service(UserHooks::default());
        service.set_entity(Entity::new("user"));

        assert!(!service.update(&params(json!({})), UpdateOptions::default()).await.unwrap());
        assert!(!service.error_messages().is_empty());

        assert!(service
            .update(&params(json!({"name": "Ada"})), UpdateOptions::default())
            .await
            .unwrap());
        assert!(service.error_messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_entity_and_unknown_tag() {
        let (mut service, _) = build_service(UserHooks::default());
        assert!(matches!(
            service.entities().await,
            Err(UpdateError::MissingEntity)
        ));

        service.set_entity(Entity::new("user"));
        let err = service.form(Some("ghost")).await.unwrap_err();
        assert_eq!(err.to_string(), "No entry associated with tag ghost");
        assert!(matches!(
            service.swap_entity("ghost", Entity::new("user")).await,
            Err(UpdateError::SwapMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_state_and_listeners() {
        let (mut service, _) = build_service(UserHooks {
            with_address: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));
        service.forms().await.unwrap();
        service.set_use_session_message(false);
        assert!(service.events().listener_count() > 0);

        service.reset();

        assert!(service.main_entity().is_none());
        assert!(service.form_map().is_empty());
        assert_eq!(service.operation(), Operation::None);
        assert!(service.use_session_message());
        assert_eq!(service.events().listener_count(), 0);
        assert!(service.events().identifiers()[0].contains("UpdateService"));
    }

    #[tokio::test]
    async fn test_delete() {
        let manager = Arc::new(MemoryEntityManager::with_entities(vec![
            Entity::new("user").with_id("7")
        ]));
        let mut service = UpdateService::new(UserHooks::default(), services(manager.clone()));
        let existing = manager.find("user", "7").await.unwrap().unwrap();
        service.set_entity(existing);

        service.delete(UpdateOptions::default()).await.unwrap();

        assert_eq!(service.operation(), Operation::Delete);
        assert!(manager.find("user", "7").await.unwrap().is_none());
        assert_eq!(service.formatted_success_message().unwrap(), "User was deleted");
        assert_eq!(service.success_message(Operation::None).unwrap(), "Success");
    }

    struct FailingSearch;

    #[async_trait]
    impl SearchService for FailingSearch {
        async fn identity_search(&self, _params: &Params) -> Result<Entity> {
            Err(UpdateError::persistence("storage offline"))
        }
    }

    #[tokio::test]
    async fn test_set_main_entity_from_param_propagates_search_errors() {
        let (mut service, _) = build_service(UserHooks::default());

        let result = service
            .set_main_entity_from_param(&params(json!({"id": "7"})), &FailingSearch)
            .await;

        assert!(matches!(result, Err(UpdateError::PersistenceError { .. })));
        assert!(service.main_entity().is_none());
        assert_eq!(service.operation(), Operation::None);
    }

    #[tokio::test]
    async fn test_configured_side_entity_survives_attach() {
        let (mut service, manager) = build_service(UserHooks {
            with_address: true,
            address_country: Some("US"),
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));

        let form = service.form(Some("address")).await.unwrap();
        assert_eq!(form.object().get_str("country"), Some("US"));
        let entity = service.entity(Some("address")).await.unwrap();
        assert_eq!(entity.get_str("country"), Some("US"));

        assert!(service
            .update(
                &params(json!({"name": "Ada", "address": {"street": "Main St"}})),
                UpdateOptions::default(),
            )
            .await
            .unwrap());

        let addresses = manager.all("address").await;
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].get_str("street"), Some("Main St"));
        assert_eq!(addresses[0].get_str("country"), Some("US"));
    }

    #[tokio::test]
    async fn test_swap_entity_rebinds_existing_form() {
        let (mut service, manager) = build_service(UserHooks::default());
        service.set_entity(Entity::new("user"));
        service.forms().await.unwrap();

        service
            .swap_entity("entity", Entity::new("user").with_field("nickname", "ace"))
            .await
            .unwrap();
        let form = service.form(None).await.unwrap();
        assert_eq!(form.object().get_str("nickname"), Some("ace"));

        assert!(service
            .update(&params(json!({"name": "Ada"})), UpdateOptions::default())
            .await
            .unwrap());
        let stored = manager.all("user").await;
        assert_eq!(stored[0].get_str("name"), Some("Ada"));
        assert_eq!(stored[0].get_str("nickname"), Some("ace"));
    }

    #[tokio::test]
    async fn test_listener_error_aborts_update() {
        let (mut service, manager) = build_service(UserHooks {
            failing_form_listener: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));

        let err = service.forms().await.unwrap_err();
        match err {
            UpdateError::ListenerError { event, message } => {
                assert_eq!(event, "configure_formentity");
                assert!(message.contains("form setup failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let result = service
            .update(&params(json!({"name": "Ada"})), UpdateOptions::default())
            .await;
        assert!(matches!(result, Err(UpdateError::ListenerError { .. })));
        assert_eq!(service.valid(), None);
        assert_eq!(manager.pending().await, 0);
        assert_eq!(manager.committed_count().await, 0);
    }

    #[tokio::test]
    async fn test_form_data_transform_maps_params() {
        let (mut service, manager) = build_service(UserHooks {
            full_name_param: true,
            ..UserHooks::default()
        });
        service.set_entity(Entity::new("user"));

        assert!(service
            .update(&params(json!({"full_name": "Ada Lovelace"})), UpdateOptions::default())
            .await
            .unwrap());
        let stored = manager.all("user").await;
        assert_eq!(stored[0].get_str("name"), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_set_event_manager_binds_identifiers() {
        let (mut service, _) = build_service(UserHooks::default());
        let mut events = EventManager::new();
        events.set_identifiers(vec!["custom".to_string()]);
        events.attach_entity("entity", Box::new(|_: &mut EntityEvent<'_>| Ok(())));

        service.set_event_manager(events);

        let identifiers = service.events().identifiers();
        assert!(!identifiers.iter().any(|id| id == "custom"));
        assert!(identifiers[0].contains("UpdateService"));
        assert_eq!(service.events().count(EventKind::ConfigureEntity, "entity"), 1);
    }
}
