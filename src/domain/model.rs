use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Tag of the main entity inside a multi-entity update.
pub const MAIN_TAG: &str = "entity";

/// Request parameter carrying the main entity's identity.
pub const DEFAULT_ID_PARAM: &str = "id";

pub type Tag = String;

/// element => rule key => message, as produced by a form.
pub type FormMessages = IndexMap<String, IndexMap<String, String>>;

/// element => messages shown to the user (one per element after normalization).
pub type NormalizedMessages = IndexMap<String, Vec<String>>;

/// tag => normalized messages of the form registered under that tag.
pub type ErrorMessages = IndexMap<Tag, NormalizedMessages>;

/// Request parameters: a JSON object with convenience accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value; anything that is not an object yields empty params.
    pub fn create(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.0.get(key).cloned().unwrap_or(default)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// The object stored under `key` as its own params (empty when absent).
    pub fn nested(&self, key: &str) -> Params {
        self.0
            .get(key)
            .cloned()
            .map(Params::create)
            .unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What the update did (or will do) to the main entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[serde(rename = "created")]
    Create,
    #[serde(rename = "updated")]
    Update,
    #[serde(rename = "deleted")]
    Delete,
    #[default]
    None,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Update => "updated",
            Operation::Delete => "deleted",
            Operation::None => "none",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link from one entity to another entity of the same update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub tag: Tag,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A persistence-layer record.
///
/// `data` holds the field values bound to forms. Related entities are
/// referenced through `relations`; their ids are resolved when the update
/// persists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub entity_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, Relation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    form_tag: Option<Tag>,
    #[serde(skip)]
    placeholder: bool,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            data: Map::new(),
            relations: BTreeMap::new(),
            created_at: None,
            modified_at: None,
            form_tag: None,
            placeholder: false,
        }
    }

    /// Null object for a related entity that does not exist yet.
    pub fn placeholder(entity_type: impl Into<String>) -> Self {
        Self {
            placeholder: true,
            ..Self::new(entity_type)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.insert(field.into(), value.into());
        self
    }

    /// Points relation `name` at `target`, registered under `tag`.
    pub fn set_relation(&mut self, name: impl Into<String>, tag: impl Into<Tag>, target: &Entity) {
        self.relations.insert(
            name.into(),
            Relation {
                tag: tag.into(),
                entity_type: target.entity_type.clone(),
                id: target.id().map(str::to_string),
            },
        );
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn form_tag(&self) -> Option<&str> {
        self.form_tag.as_deref()
    }

    pub fn set_form_tag(&mut self, tag: impl Into<Tag>) {
        self.form_tag = Some(tag.into());
    }

    /// JSON view of the entity: id, type, field values and relation ids.
    pub fn flatten(&self) -> Value {
        let mut out = Map::new();
        out.insert(
            "id".to_string(),
            self.id().map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        out.insert(
            "entity_type".to_string(),
            Value::String(self.entity_type.clone()),
        );
        for (field, value) in &self.data {
            out.entry(field.clone()).or_insert_with(|| value.clone());
        }
        for (name, relation) in &self.relations {
            out.insert(
                name.clone(),
                relation
                    .id
                    .as_ref()
                    .map_or(Value::Null, |id| Value::String(id.clone())),
            );
        }
        if let Some(created_at) = self.created_at {
            out.insert("created_at".to_string(), Value::String(created_at.to_rfc3339()));
        }
        if let Some(modified_at) = self.modified_at {
            out.insert(
                "modified_at".to_string(),
                Value::String(modified_at.to_rfc3339()),
            );
        }
        Value::Object(out)
    }
}

/// Options accepted by `UpdateService::update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Stop validating at the first invalid form instead of checking them all.
    #[serde(default)]
    pub short_circuit: bool,
    /// Persist entities but leave flushing the entity manager to the caller.
    #[serde(default)]
    pub no_flush: bool,
}

impl UpdateOptions {
    pub fn short_circuit() -> Self {
        Self {
            short_circuit: true,
            ..Self::default()
        }
    }

    pub fn no_flush() -> Self {
        Self {
            no_flush: true,
            ..Self::default()
        }
    }
}

/// Query and fragment applied when assembling a route URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// Where the caller should send the user after a successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub route: String,
    pub params: Params,
    pub options: RouteOptions,
    pub url: String,
}

/// Serializable summary of an update, for controllers and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub valid: bool,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub errors: ErrorMessages,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectTarget>,
    pub use_session_message: bool,
}
