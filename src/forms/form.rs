use crate::domain::model::{Entity, FormMessages, Params};
use crate::domain::ports::Form;
use crate::forms::element::Element;
use indexmap::IndexMap;

/// Form built from a [`FormSchema`](crate::forms::FormSchema) and bound to one entity.
#[derive(Debug, Clone)]
pub struct EntityForm {
    name: String,
    elements: Vec<Element>,
    data: Params,
    validation_group: Option<Vec<String>>,
    messages: FormMessages,
    object: Entity,
}

impl EntityForm {
    /// Binds `entity`. A placeholder is replaced by a fresh entity of the same type.
    pub fn new(name: impl Into<String>, elements: Vec<Element>, entity: &Entity) -> Self {
        let object = if entity.is_placeholder() {
            Entity::new(entity.entity_type.clone())
        } else {
            entity.clone()
        };
        Self {
            name: name.into(),
            elements,
            data: Params::from(object.data.clone()),
            validation_group: None,
            messages: FormMessages::new(),
            object,
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
}

fn in_group(group: Option<&[String]>, element: &Element) -> bool {
    group.map_or(true, |group| group.iter().any(|name| name == &element.name))
}

impl Form for EntityForm {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_names(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.name.clone()).collect()
    }

    fn remove(&mut self, element: &str) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.name != element);
        if let Some(group) = self.validation_group.as_mut() {
            group.retain(|name| name != element);
        }
        self.messages.shift_remove(element);
        self.elements.len() != before
    }

    fn set_data(&mut self, data: Params) {
        self.data = data;
    }

    fn data(&self) -> &Params {
        &self.data
    }

    fn set_validation_group(&mut self, elements: Vec<String>) {
        self.validation_group = Some(elements);
    }

    fn validation_group(&self) -> Option<&[String]> {
        self.validation_group.as_deref()
    }

    fn is_valid(&mut self) -> bool {
        let group = self.validation_group.as_deref();
        let mut messages = FormMessages::new();
        for element in self.elements.iter().filter(|e| in_group(group, e)) {
            let failures = element.check(self.data.get(&element.name));
            if !failures.is_empty() {
                let by_rule: IndexMap<String, String> = failures.into_iter().collect();
                messages.insert(element.name.clone(), by_rule);
            }
        }
        self.messages = messages;
        if !self.messages.is_empty() {
            return false;
        }

        // 只寫回有送出的欄位，其餘保持物件原值
        for element in self.elements.iter().filter(|e| in_group(group, e)) {
            if let Some(value) = self.data.get(&element.name) {
                self.object.set(element.name.clone(), element.filter(value));
            }
        }
        true
    }

    fn messages(&self) -> &FormMessages {
        &self.messages
    }

    fn object(&self) -> &Entity {
        &self.object
    }

    fn object_mut(&mut self) -> &mut Entity {
        &mut self.object
    }
}
