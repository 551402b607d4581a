//! Ready-made listeners for the common configuration hooks.

use crate::core::events::{FormDataListener, FormListener};
use crate::domain::model::{Entity, Params, Tag};
use crate::domain::ports::Form;
use crate::utils::error::{Result, UpdateError};
use std::sync::Arc;

/// Maps submitted params before they are bound to a form.
pub type DataTransform = Arc<dyn Fn(&Params) -> Params + Send + Sync>;

/// Called once a sub-form has been attached to the main entity.
pub type AfterAttach = Box<dyn Fn(&mut AttachEvent<'_>) -> Result<()> + Send + Sync>;

pub struct AttachEvent<'a> {
    pub tag: &'a str,
    pub form: &'a mut dyn Form,
    pub main_entity: &'a mut Entity,
}

/// How a side entity hangs off the main entity.
pub struct AttachToMain {
    pub tag: Tag,
    pub relation: String,
    pub getter: Option<String>,
    pub after_attach: Option<AfterAttach>,
}

impl AttachToMain {
    pub fn new(tag: impl Into<Tag>, relation: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            relation: relation.into(),
            getter: None,
            after_attach: None,
        }
    }

    pub fn with_getter(mut self, getter: impl Into<String>) -> Self {
        self.getter = Some(getter.into());
        self
    }

    pub fn with_after_attach(mut self, after_attach: AfterAttach) -> Self {
        self.after_attach = Some(after_attach);
        self
    }

    /// Key used for the form map entry; the relation name unless a getter was given.
    pub fn form_map_key(&self) -> &str {
        self.getter.as_deref().unwrap_or(&self.relation)
    }
}

/// Binds the submitted params (optionally transformed) to the form.
pub fn form_data(transform: Option<DataTransform>) -> FormDataListener {
    Box::new(move |event| {
        let data = match &transform {
            Some(transform) => transform(event.data),
            None => event.data.clone(),
        };
        event.form.set_data(data);
        Ok(())
    })
}

/// Binds the object found under `param` in the submitted params.
pub fn sub_form_data(param: impl Into<String>) -> FormDataListener {
    let param = param.into();
    form_data(Some(Arc::new(move |params: &Params| params.nested(&param))))
}

/// Validates every element except the given ones.
pub fn exclude_data(elements: Vec<String>) -> FormListener {
    Box::new(move |event| {
        let fields: Vec<String> = event
            .form
            .element_names()
            .into_iter()
            .filter(|name| !elements.contains(name))
            .collect();
        event.form.set_validation_group(fields);
        Ok(())
    })
}

/// Points the main entity at the object generated by the form for `attach.tag`,
/// swaps that object into the entity map and records the form map entry.
pub fn attach_to_main_entity(main_tag: impl Into<Tag>, attach: AttachToMain) -> FormListener {
    let main_tag = main_tag.into();
    Box::new(move |event| {
        let tag = attach.tag.as_str();
        // 表單可能為 placeholder 產生了新的實體，主實體必須指向表單的物件
        let object = event.form.object().clone();
        let main_entity = event
            .entities
            .get_mut(&main_tag)
            .ok_or_else(|| UpdateError::unknown_tag(main_tag.as_str()))?;
        main_entity.set_relation(attach.relation.as_str(), tag, &object);

        event.swap_entity(tag, object)?;
        event.set_form_map_entry(attach.form_map_key(), tag);

        if let Some(after_attach) = &attach.after_attach {
            let main_entity = event
                .entities
                .get_mut(&main_tag)
                .ok_or_else(|| UpdateError::unknown_tag(main_tag.as_str()))?;
            let mut attached = AttachEvent {
                tag,
                form: &mut *event.form,
                main_entity,
            };
            after_attach(&mut attached)?;
        }
        Ok(())
    })
}

/// After-attach callback removing `fields` from the attached form.
pub fn remove_fields(fields: Vec<String>) -> AfterAttach {
    Box::new(move |event| {
        for field in &fields {
            if !event.form.remove(field) {
                tracing::debug!(tag = event.tag, field = %field, "excluded field not on form");
            }
        }
        Ok(())
    })
}
