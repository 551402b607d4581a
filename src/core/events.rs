//! Named event hooks fired while an update configures its entities and forms.
//!
//! Event names are the hook prefix followed by the tag, e.g. `configure_formaddress`.
//! Listeners receive mutable access to the state they are allowed to change and run in
//! attachment order; the first failing listener stops the trigger.

use crate::domain::model::{Entity, Params, Tag};
use crate::domain::ports::Form;
use crate::utils::error::{Result, UpdateError};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Entities of an update, in form order.
pub type EntityMap = IndexMap<Tag, Entity>;

/// Relation getter => tag of the sub-form rendered for it.
pub type FormMapEntries = IndexMap<String, Tag>;

pub type EntityListener = Box<dyn Fn(&mut EntityEvent<'_>) -> Result<()> + Send + Sync>;
pub type FormListener = Box<dyn Fn(&mut FormEvent<'_>) -> Result<()> + Send + Sync>;
pub type FormDataListener = Box<dyn Fn(&mut FormDataEvent<'_>) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConfigureEntity,
    ConfigureForm,
    FormData,
}

impl EventKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            EventKind::ConfigureEntity => "configure",
            EventKind::ConfigureForm => "configure_form",
            EventKind::FormData => "formdata",
        }
    }

    pub fn event_name(&self, tag: &str) -> String {
        format!("{}{}", self.prefix(), tag)
    }
}

/// Payload of `configure{tag}`.
pub struct EntityEvent<'a> {
    pub tag: &'a str,
    pub entities: &'a mut EntityMap,
}

impl EntityEvent<'_> {
    pub fn entity(&self) -> Option<&Entity> {
        self.entities.get(self.tag)
    }

    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        self.entities.get_mut(self.tag)
    }
}

/// Payload of `configure_form{tag}`.
pub struct FormEvent<'a> {
    pub tag: &'a str,
    pub form: &'a mut dyn Form,
    pub entities: &'a mut EntityMap,
    pub form_map: &'a mut FormMapEntries,
    pub events: &'a EventManager,
}

impl FormEvent<'_> {
    /// Replaces the entity at `tag` and re-fires its configure event.
    ///
    /// Swapping the entity of the form being configured rebinds the form to the
    /// configured entry, so listener changes reach the persisted object.
    pub fn swap_entity(&mut self, tag: &str, entity: Entity) -> Result<Entity> {
        let previous = swap_entity(self.events, self.entities, tag, entity)?;
        if tag == self.tag {
            if let Some(configured) = self.entities.get(tag) {
                *self.form.object_mut() = configured.clone();
            }
        }
        Ok(previous)
    }

    pub fn set_form_map_entry(&mut self, key: impl Into<String>, tag: impl Into<Tag>) {
        self.form_map.insert(key.into(), tag.into());
    }
}

/// Payload of `formdata{tag}`.
pub struct FormDataEvent<'a> {
    pub tag: &'a str,
    pub form: &'a mut dyn Form,
    pub data: &'a Params,
}

#[derive(Default)]
pub struct EventManager {
    identifiers: Vec<String>,
    entity_listeners: HashMap<Tag, Vec<EntityListener>>,
    form_listeners: HashMap<Tag, Vec<FormListener>>,
    form_data_listeners: HashMap<Tag, Vec<FormDataListener>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identifiers(&mut self, identifiers: Vec<String>) -> &mut Self {
        self.identifiers = identifiers;
        self
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn attach_entity(&mut self, tag: impl Into<Tag>, listener: EntityListener) -> &mut Self {
        self.entity_listeners
            .entry(tag.into())
            .or_default()
            .push(listener);
        self
    }

    pub fn attach_form(&mut self, tag: impl Into<Tag>, listener: FormListener) -> &mut Self {
        self.form_listeners.entry(tag.into()).or_default().push(listener);
        self
    }

    pub fn attach_form_data(
        &mut self,
        tag: impl Into<Tag>,
        listener: FormDataListener,
    ) -> &mut Self {
        self.form_data_listeners
            .entry(tag.into())
            .or_default()
            .push(listener);
        self
    }

    pub fn has_listeners(&self, kind: EventKind, tag: &str) -> bool {
        self.count(kind, tag) > 0
    }

    pub fn count(&self, kind: EventKind, tag: &str) -> usize {
        match kind {
            EventKind::ConfigureEntity => self.entity_listeners.get(tag).map_or(0, Vec::len),
            EventKind::ConfigureForm => self.form_listeners.get(tag).map_or(0, Vec::len),
            EventKind::FormData => self.form_data_listeners.get(tag).map_or(0, Vec::len),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.entity_listeners.values().map(Vec::len).sum::<usize>()
            + self.form_listeners.values().map(Vec::len).sum::<usize>()
            + self.form_data_listeners.values().map(Vec::len).sum::<usize>()
    }

    /// Drops every listener; identifiers are kept.
    pub fn clear(&mut self) {
        self.entity_listeners.clear();
        self.form_listeners.clear();
        self.form_data_listeners.clear();
    }

    pub fn trigger_entity(&self, tag: &str, entities: &mut EntityMap) -> Result<()> {
        let Some(listeners) = self.entity_listeners.get(tag) else {
            return Ok(());
        };
        let name = EventKind::ConfigureEntity.event_name(tag);
        tracing::trace!(event = %name, listeners = listeners.len(), "triggering");

        let mut event = EntityEvent { tag, entities };
        for listener in listeners {
            listener(&mut event).map_err(|e| wrap_listener_error(&name, e))?;
        }
        Ok(())
    }

    pub fn trigger_form(
        &self,
        tag: &str,
        form: &mut dyn Form,
        entities: &mut EntityMap,
        form_map: &mut FormMapEntries,
    ) -> Result<()> {
        let Some(listeners) = self.form_listeners.get(tag) else {
            return Ok(());
        };
        let name = EventKind::ConfigureForm.event_name(tag);
        tracing::trace!(event = %name, listeners = listeners.len(), "triggering");

        let mut event = FormEvent {
            tag,
            form,
            entities,
            form_map,
            events: self,
        };
        for listener in listeners {
            listener(&mut event).map_err(|e| wrap_listener_error(&name, e))?;
        }
        Ok(())
    }

    pub fn trigger_form_data(&self, tag: &str, form: &mut dyn Form, data: &Params) -> Result<()> {
        let Some(listeners) = self.form_data_listeners.get(tag) else {
            return Ok(());
        };
        let name = EventKind::FormData.event_name(tag);
        tracing::trace!(event = %name, listeners = listeners.len(), "triggering");

        let mut event = FormDataEvent { tag, form, data };
        for listener in listeners {
            listener(&mut event).map_err(|e| wrap_listener_error(&name, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("identifiers", &self.identifiers)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Replaces the entity stored at `tag`, returning the previous one.
pub fn swap_entity(
    events: &EventManager,
    entities: &mut EntityMap,
    tag: &str,
    mut entity: Entity,
) -> Result<Entity> {
    let slot = entities.get_mut(tag).ok_or_else(|| UpdateError::SwapMissing {
        tag: tag.to_string(),
    })?;
    entity.set_form_tag(tag);
    let previous = std::mem::replace(slot, entity);
    events.trigger_entity(tag, entities)?;
    Ok(previous)
}

// 保留原本的工作流程錯誤，其他錯誤標註事件名稱
fn wrap_listener_error(event: &str, error: UpdateError) -> UpdateError {
    match error {
        UpdateError::ListenerError { .. }
        | UpdateError::UnknownTag { .. }
        | UpdateError::SwapMissing { .. }
        | UpdateError::MissingEntity => error,
        other => UpdateError::listener(event, other.to_string()),
    }
}
