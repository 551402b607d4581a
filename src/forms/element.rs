use crate::utils::error::{Result, UpdateError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Regular expression compiled once, serialized as its source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(Self)
            .map_err(|e| UpdateError::form(format!("Invalid pattern '{}': {}", source, e)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl TryFrom<String> for Pattern {
    type Error = UpdateError;

    fn try_from(source: String) -> Result<Self> {
        Self::new(&source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.as_str().to_string()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validation rule attached to a form element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Required,
    MinLength { min: usize },
    MaxLength { max: usize },
    Pattern { pattern: Pattern },
    Email,
    Url,
    Numeric,
    Range { min: f64, max: f64 },
    OneOf { values: Vec<String> },
}

impl Rule {
    pub fn pattern(source: &str) -> Result<Self> {
        Ok(Rule::Pattern {
            pattern: Pattern::new(source)?,
        })
    }

    /// Key under which a failure of this rule is reported.
    pub fn key(&self) -> &'static str {
        match self {
            Rule::Required => "is_empty",
            Rule::MinLength { .. } => "string_length_too_short",
            Rule::MaxLength { .. } => "string_length_too_long",
            Rule::Pattern { .. } => "regex_not_match",
            Rule::Email => "email_address_invalid_format",
            Rule::Url => "not_uri",
            Rule::Numeric => "not_numeric",
            Rule::Range { .. } => "not_between",
            Rule::OneOf { .. } => "not_in_array",
        }
    }

    pub fn default_message(&self) -> String {
        match self {
            Rule::Required => "Value is required and can't be empty".to_string(),
            Rule::MinLength { min } => {
                format!("The input is less than {} characters long", min)
            }
            Rule::MaxLength { max } => {
                format!("The input is more than {} characters long", max)
            }
            Rule::Pattern { pattern } => {
                format!("The input does not match against pattern '{}'", pattern)
            }
            Rule::Email => "The input is not a valid email address".to_string(),
            Rule::Url => "The input does not appear to be a valid Uri".to_string(),
            Rule::Numeric => "The input is not a valid number".to_string(),
            Rule::Range { min, max } => {
                format!("The input is not between '{}' and '{}', inclusively", min, max)
            }
            Rule::OneOf { .. } => "The input was not found in the haystack".to_string(),
        }
    }

    /// Checks a non-empty value. `text` is its string rendering.
    pub fn check(&self, value: &Value, text: &str) -> bool {
        match self {
            Rule::Required => !is_empty_value(value),
            Rule::MinLength { min } => text.chars().count() >= *min,
            Rule::MaxLength { max } => text.chars().count() <= *max,
            Rule::Pattern { pattern } => pattern.is_match(text),
            Rule::Email => is_email(text),
            Rule::Url => Url::parse(text)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
                .unwrap_or(false),
            Rule::Numeric => as_number(value, text).is_some(),
            Rule::Range { min, max } => as_number(value, text)
                .map(|n| n >= *min && n <= *max)
                .unwrap_or(false),
            Rule::OneOf { values } => values.iter().any(|v| v == text),
        }
    }
}

/// One field of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_trim")]
    pub trim: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Message overrides keyed by rule key.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub messages: HashMap<String, String>,
}

fn default_trim() -> bool {
    true
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            trim: true,
            rules: Vec::new(),
            messages: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.messages.insert(key.into(), message.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.contains(&Rule::Required)
    }

    pub fn message_for(&self, rule: &Rule) -> String {
        self.messages
            .get(rule.key())
            .cloned()
            .unwrap_or_else(|| rule.default_message())
    }

    /// Applies the element's filters to a submitted value.
    pub fn filter(&self, value: &Value) -> Value {
        match value {
            Value::String(s) if self.trim => Value::String(s.trim().to_string()),
            other => other.clone(),
        }
    }

    /// Runs every rule and returns the failures as (rule key, message).
    ///
    /// Empty values only fail `required`; the other rules skip them.
    pub fn check(&self, value: Option<&Value>) -> Vec<(String, String)> {
        let value = value.map(|v| self.filter(v)).unwrap_or(Value::Null);
        let text = render(&value);

        if is_empty_value(&value) {
            return self
                .rules
                .iter()
                .filter(|rule| matches!(rule, Rule::Required))
                .map(|rule| (rule.key().to_string(), self.message_for(rule)))
                .collect();
        }

        self.rules
            .iter()
            .filter(|rule| !rule.check(&value, &text))
            .map(|rule| (rule.key().to_string(), self.message_for(rule)))
            .collect()
    }
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value, text: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(_) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !text.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}
