use crate::domain::model::Entity;
use crate::domain::ports::{Form, FormFactory};
use crate::forms::element::{Element, Rule};
use crate::forms::form::EntityForm;
use crate::utils::error::{Result, UpdateError};
use crate::utils::validation::{validate_non_empty_string, validate_unique_names, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Elements of the form generated for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub entity_type: String,
    /// Form name, the entity type when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl FormSchema {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: None,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.push(element);
        self
    }

    pub fn form_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.entity_type)
    }
}

impl Validate for FormSchema {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("forms.entity_type", &self.entity_type)?;
        let field = format!("forms.{}.elements", self.entity_type);
        for element in &self.elements {
            validate_non_empty_string(&field, &element.name)?;
            for rule in &element.rules {
                if let Rule::Range { min, max } = rule {
                    if min > max {
                        return Err(UpdateError::InvalidConfigValueError {
                            field: format!("{}.{}", field, element.name),
                            value: format!("{}..{}", min, max),
                            reason: "Range minimum is greater than its maximum".to_string(),
                        });
                    }
                }
            }
        }
        validate_unique_names(&field, self.elements.iter().map(|e| e.name.as_str()))
    }
}

/// Builds [`EntityForm`]s from schemas registered per entity type.
#[derive(Debug, Clone, Default)]
pub struct SchemaFormFactory {
    schemas: HashMap<String, FormSchema>,
}

impl SchemaFormFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schemas(schemas: impl IntoIterator<Item = FormSchema>) -> Self {
        let mut factory = Self::new();
        for schema in schemas {
            factory.register(schema);
        }
        factory
    }

    pub fn with_schema(mut self, schema: FormSchema) -> Self {
        self.register(schema);
        self
    }

    /// Replaces any schema already registered for the same entity type.
    pub fn register(&mut self, schema: FormSchema) {
        self.schemas.insert(schema.entity_type.clone(), schema);
    }

    pub fn schema(&self, entity_type: &str) -> Option<&FormSchema> {
        self.schemas.get(entity_type)
    }
}

impl FormFactory for SchemaFormFactory {
    fn convert_entity(&self, entity: &Entity) -> Result<Box<dyn Form>> {
        let schema = self.schemas.get(&entity.entity_type).ok_or_else(|| {
            UpdateError::form(format!(
                "No form schema registered for entity type '{}'",
                entity.entity_type
            ))
        })?;
        Ok(Box::new(EntityForm::new(
            schema.form_name(),
            schema.elements.clone(),
            entity,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_entity_uses_registered_schema() {
        let factory = SchemaFormFactory::new().with_schema(
            FormSchema::new("address").with_element(Element::new("street").with_rule(Rule::Required)),
        );

        let form = factory
            .convert_entity(&Entity::placeholder("address"))
            .unwrap();
        assert_eq!(form.name(), "address");
        assert_eq!(form.element_names(), vec!["street"]);
        assert!(!form.object().is_placeholder());
    }

    #[test]
    fn test_unknown_entity_type_is_an_error() {
        let factory = SchemaFormFactory::new();
        let err = factory.convert_entity(&Entity::new("ghost")).unwrap_err();
        assert!(matches!(err, UpdateError::FormError { .. }));
    }

    #[test]
    fn test_schema_validation() {
        let duplicate = FormSchema::new("user")
            .with_element(Element::new("name"))
            .with_element(Element::new("name"));
        assert!(duplicate.validate().is_err());

        let bad_pattern: std::result::Result<FormSchema, _> = serde_json::from_value(json!({
            "entity_type": "user",
            "elements": [{"name": "code", "rules": [{"rule": "pattern", "pattern": "(["}]}]
        }));
        assert!(bad_pattern.is_err());

        let inverted = FormSchema::new("user")
            .with_element(Element::new("age").with_rule(Rule::Range { min: 10.0, max: 1.0 }));
        assert!(inverted.validate().is_err());

        let ok = FormSchema::new("user").with_element(Element::new("name").with_rule(Rule::Required));
        assert!(ok.validate().is_ok());
    }
}
