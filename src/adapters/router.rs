use crate::domain::model::{Params, RouteOptions};
use crate::domain::ports::Router;
use crate::utils::error::{Result, UpdateError};
use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

/// Named routes resolved against a base URL.
///
/// Patterns are slash separated; a `:name` segment is replaced by the
/// `name` param and `:name?` is dropped when the param is missing. Params
/// not used by the pattern are ignored.
#[derive(Debug, Clone)]
pub struct RouteTable {
    base_url: Url,
    routes: IndexMap<String, String>,
}

impl RouteTable {
    /// Route table with a single `home` route pointing at the base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(UpdateError::RouteError {
                route: String::new(),
                message: format!("'{}' cannot be used as a base URL", base_url),
            });
        }
        let mut routes = IndexMap::new();
        routes.insert("home".to_string(), "/".to_string());
        Ok(Self { base_url, routes })
    }

    pub fn with_route(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.add_route(name, pattern);
        self
    }

    pub fn add_route(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.routes.insert(name.into(), pattern.into());
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn routes(&self) -> &IndexMap<String, String> {
        &self.routes
    }

    fn resolve_segments(&self, route: &str, pattern: &str, params: &Params) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        for segment in pattern.split('/').filter(|s| !s.is_empty()) {
            let Some(name) = segment.strip_prefix(':') else {
                segments.push(segment.to_string());
                continue;
            };
            let (name, optional) = match name.strip_suffix('?') {
                Some(name) => (name, true),
                None => (name, false),
            };
            match params.get(name).and_then(segment_value) {
                Some(value) => segments.push(value),
                None if optional => {}
                None => {
                    return Err(UpdateError::RouteError {
                        route: route.to_string(),
                        message: format!("Missing parameter '{}'", name),
                    })
                }
            }
        }
        Ok(segments)
    }
}

fn segment_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Router for RouteTable {
    fn url_from_route(&self, route: &str, params: &Params, options: &RouteOptions) -> Result<String> {
        let pattern = self.routes.get(route).ok_or_else(|| UpdateError::RouteError {
            route: route.to_string(),
            message: "Route not found".to_string(),
        })?;
        let segments = self.resolve_segments(route, pattern, params)?;

        let mut url = self.base_url.clone();
        if !segments.is_empty() {
            let mut path = url.path_segments_mut().map_err(|_| UpdateError::RouteError {
                route: route.to_string(),
                message: "Base URL cannot carry a path".to_string(),
            })?;
            path.pop_if_empty();
            for segment in &segments {
                path.push(segment);
            }
        }
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(options.query.iter());
        }
        url.set_fragment(options.fragment.as_deref());
        Ok(url.to_string())
    }
}
