use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("No main entity has been set on the update service")]
    MissingEntity,

    #[error("No entry associated with tag {tag}")]
    UnknownTag { tag: String },

    #[error("Unable to swap entity that does not exist: {tag}")]
    SwapMissing { tag: String },

    #[error("Form error: {message}")]
    FormError { message: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Route '{route}' could not be assembled: {message}")]
    RouteError { route: String, message: String },

    #[error("Event listener for '{event}' failed: {message}")]
    ListenerError { event: String, message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lookup,
    Workflow,
    Validation,
    Persistence,
    Routing,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl UpdateError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn unknown_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTag { tag: tag.into() }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    pub fn form(message: impl Into<String>) -> Self {
        Self::FormError {
            message: message.into(),
        }
    }

    pub fn listener(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ListenerError {
            event: event.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Lookup,
            Self::MissingEntity
            | Self::UnknownTag { .. }
            | Self::SwapMissing { .. }
            | Self::ListenerError { .. } => ErrorCategory::Workflow,
            Self::FormError { .. } => ErrorCategory::Validation,
            Self::PersistenceError { .. } | Self::SerializationError(_) => {
                ErrorCategory::Persistence
            }
            Self::RouteError { .. } | Self::UrlError(_) => ErrorCategory::Routing,
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Lookup => ErrorSeverity::Low,
            ErrorCategory::Validation | ErrorCategory::Routing => ErrorSeverity::Medium,
            ErrorCategory::Workflow | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Persistence | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Lookup => "檢查請求中的 id 參數是否指向現有的資料",
            ErrorCategory::Workflow => {
                "Make sure the main entity is set before building entities or forms"
            }
            ErrorCategory::Validation => "檢查表單結構與欄位規則設定",
            ErrorCategory::Persistence => "Check that the storage path exists and is writable",
            ErrorCategory::Routing => "確認 [routes] 設定中包含此路由與所需參數",
            ErrorCategory::Configuration => "Review the TOML configuration file",
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::NotFound { entity_type, .. } => {
                format!("The requested {} could not be found", entity_type)
            }
            Self::ConfigValidationError { field, .. }
            | Self::InvalidConfigValueError { field, .. }
            | Self::MissingConfigError { field } => {
                format!("Configuration problem in '{}': {}", field, self)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
