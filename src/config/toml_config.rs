use crate::adapters::{JsonFileEntityManager, MemoryEntityManager, RouteTable};
use crate::core::Services;
use crate::domain::model::{Params, UpdateOptions, DEFAULT_ID_PARAM, MAIN_TAG};
use crate::domain::ports::EntityManager;
use crate::forms::{FormSchema, SchemaFormFactory};
use crate::utils::error::{Result, UpdateError};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_required_field, validate_unique_names,
    validate_url, Validate,
};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Base URL used when no `[routes]` table is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub options: UpdateOptions,
    pub storage: Option<StorageConfig>,
    pub routes: Option<RoutesConfig>,
    #[serde(default)]
    pub forms: Vec<FormSchema>,
    #[serde(default)]
    pub entities: Vec<SideEntityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub entity_type: String,
    pub main_tag: Option<String>,
    pub id_param: Option<String>,
    pub display_name: Option<String>,
    pub success_route: Option<String>,
    #[serde(default)]
    pub success_route_params: Map<String, Value>,
    pub generic_success_message: Option<String>,
    pub use_session_message: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    pub base_url: String,
    #[serde(default)]
    pub paths: IndexMap<String, String>,
}

/// A side entity edited together with the main entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEntityConfig {
    pub tag: String,
    pub entity_type: String,
    /// Relation of the main entity pointing at this entity.
    pub relation: Option<String>,
    /// Key of the nested params object bound to this form, the tag when absent.
    pub data_param: Option<String>,
    /// Elements left out of validation.
    #[serde(default)]
    pub exclude_data: Vec<String>,
    /// Elements removed from the form once it is attached to the main entity.
    #[serde(default)]
    pub excluded_fields: Vec<String>,
}

impl SideEntityConfig {
    pub fn data_param(&self) -> &str {
        self.data_param.as_deref().unwrap_or(&self.tag)
    }
}

impl UpdateConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(UpdateError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| UpdateError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STORAGE_PATH})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| UpdateError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn main_tag(&self) -> &str {
        self.service.main_tag.as_deref().unwrap_or(MAIN_TAG)
    }

    pub fn id_param(&self) -> &str {
        self.service.id_param.as_deref().unwrap_or(DEFAULT_ID_PARAM)
    }

    pub fn success_route(&self) -> &str {
        self.service.success_route.as_deref().unwrap_or("home")
    }

    pub fn success_route_params(&self) -> Params {
        Params::from(self.service.success_route_params.clone())
    }

    pub fn use_session_message(&self) -> bool {
        self.service.use_session_message.unwrap_or(true)
    }

    /// JSON files under `[storage].path`, in memory otherwise.
    pub fn entity_manager(&self) -> Arc<dyn EntityManager> {
        match &self.storage {
            Some(storage) => Arc::new(JsonFileEntityManager::new(&storage.path)),
            None => Arc::new(MemoryEntityManager::new()),
        }
    }

    pub fn router(&self) -> Result<RouteTable> {
        let Some(routes) = &self.routes else {
            return RouteTable::new(DEFAULT_BASE_URL);
        };
        let mut table = RouteTable::new(&routes.base_url)?;
        for (name, pattern) in &routes.paths {
            table.add_route(name.as_str(), pattern.as_str());
        }
        Ok(table)
    }

    pub fn form_factory(&self) -> SchemaFormFactory {
        SchemaFormFactory::from_schemas(self.forms.iter().cloned())
    }

    pub fn build_services(&self) -> Result<Services> {
        Ok(Services::new(
            self.entity_manager(),
            Arc::new(self.form_factory()),
            Arc::new(self.router()?),
        ))
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("service.entity_type", &self.service.entity_type)?;
        validate_non_empty_string("service.main_tag", self.main_tag())?;
        validate_non_empty_string("service.id_param", self.id_param())?;

        if let Some(storage) = &self.storage {
            validate_path("storage.path", &storage.path)?;
        }
        if let Some(routes) = &self.routes {
            validate_url("routes.base_url", &routes.base_url)?;
        }

        let success_route = self.success_route();
        if success_route != "home" {
            let routes = validate_required_field("routes", &self.routes)?;
            if !routes.paths.contains_key(success_route) {
                return Err(UpdateError::InvalidConfigValueError {
                    field: "service.success_route".to_string(),
                    value: success_route.to_string(),
                    reason: "Route is not defined in [routes.paths]".to_string(),
                });
            }
        }

        for schema in &self.forms {
            schema.validate()?;
        }
        validate_unique_names(
            "forms.entity_type",
            self.forms.iter().map(|f| f.entity_type.as_str()),
        )?;

        // 標籤不可重複，且每個實體型別都要有表單
        let main_tag = self.main_tag();
        let tags = std::iter::once(main_tag).chain(self.entities.iter().map(|e| e.tag.as_str()));
        validate_unique_names("entities.tag", tags)?;

        let entity_types = std::iter::once(self.service.entity_type.as_str())
            .chain(self.entities.iter().map(|e| e.entity_type.as_str()));
        for entity_type in entity_types {
            if !self.forms.iter().any(|f| f.entity_type == entity_type) {
                return Err(UpdateError::ConfigValidationError {
                    field: "forms".to_string(),
                    message: format!("No form defined for entity type '{}'", entity_type),
                });
            }
        }

        for side in &self.entities {
            validate_non_empty_string("entities.tag", &side.tag)?;
            validate_non_empty_string("entities.entity_type", &side.entity_type)?;
        }

        Ok(())
    }
}

impl Validate for UpdateConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const USER_CONFIG: &str = r#"
[service]
entity_type = "user"
display_name = "User"
success_route = "user"

[options]
short_circuit = true

[routes]
base_url = "https://admin.example.com/"

[routes.paths]
user = "/users/:action?/:id?"

[[forms]]
entity_type = "user"

[[forms.elements]]
name = "name"
rules = [{ rule = "required" }, { rule = "max_length", max = 40 }]

[[forms]]
entity_type = "address"

[[forms.elements]]
name = "street"
rules = [{ rule = "required" }]

[[entities]]
tag = "address"
entity_type = "address"
relation = "address"
excluded_fields = ["country"]
"#;

    #[test]
    fn test_parse_user_config() {
        let config = UpdateConfig::from_toml_str(USER_CONFIG).unwrap();

        assert_eq!(config.service.entity_type, "user");
        assert_eq!(config.main_tag(), "entity");
        assert_eq!(config.id_param(), "id");
        assert_eq!(config.success_route(), "user");
        assert!(config.options.short_circuit);
        assert!(!config.options.no_flush);
        assert_eq!(config.forms[0].elements[0].rules.len(), 2);
        assert_eq!(config.entities[0].data_param(), "address");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ENTITY_UPDATE_TEST_STORAGE", "/tmp/entity-store");

        let toml_content = r#"
[service]
entity_type = "user"

[storage]
path = "${ENTITY_UPDATE_TEST_STORAGE}"

[[forms]]
entity_type = "user"
"#;

        let config = UpdateConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.storage.unwrap().path, "/tmp/entity-store");

        std::env::remove_var("ENTITY_UPDATE_TEST_STORAGE");
    }

    #[test]
    fn test_config_validation() {
        let missing_form = r#"
[service]
entity_type = "user"
"#;
        let config = UpdateConfig::from_toml_str(missing_form).unwrap();
        assert!(config.validate().is_err());

        let unknown_route = r#"
[service]
entity_type = "user"
success_route = "dashboard"

[[forms]]
entity_type = "user"
"#;
        let config = UpdateConfig::from_toml_str(unknown_route).unwrap();
        assert!(config.validate().is_err());

        let duplicate_tag = r#"
[service]
entity_type = "user"

[[forms]]
entity_type = "user"

[[entities]]
tag = "entity"
entity_type = "user"
"#;
        let config = UpdateConfig::from_toml_str(duplicate_tag).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(USER_CONFIG.as_bytes()).unwrap();

        let config = UpdateConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.service.display_name.as_deref(), Some("User"));
        assert!(config.build_services().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = UpdateConfig::from_toml_str("[service").unwrap_err();
        assert!(matches!(err, UpdateError::ConfigValidationError { .. }));
    }
}
