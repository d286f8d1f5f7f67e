//! Error types for the audit system

use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// Conflicting or duplicate policy entries. Raised before any evaluation.
    #[error("Invalid policy configuration: {0}")]
    ConfigValidation(String),

    /// An LTS schedule table has no entry active for the evaluation date.
    #[error("The {group} LTS schedule has no active release line for {today}; the bundled schedule needs updating")]
    StaleSchedule { group: String, today: String },

    #[error("Failed to fetch {url}{}: {message}", code_suffix(.code))]
    MetadataFetch {
        url: String,
        code: Option<String>,
        message: String,
    },

    #[error("Malformed registry metadata: {0}")]
    MetadataParse(String),

    #[error("Invalid version: {0}")]
    VersionParse(String),

    #[error("Project setup failed: {0}")]
    ProjectSetup(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Audit task failed: {0}")]
    TaskFailed(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default()
}

impl AuditError {
    /// Create a configuration validation error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a metadata fetch error
    pub fn fetch(url: impl Into<String>, code: Option<String>, message: impl Into<String>) -> Self {
        Self::MetadataFetch {
            url: url.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a metadata parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::MetadataParse(msg.into())
    }

    /// Create a version parse error
    pub fn version(msg: impl Into<String>) -> Self {
        Self::VersionParse(msg.into())
    }

    /// Create a project setup error
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::ProjectSetup(msg.into())
    }

    /// Errors that stop the run outright rather than waiting on sibling work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigValidation(_) | Self::StaleSchedule { .. })
    }

    /// The registry error code carried by a fetch failure, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::MetadataFetch { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
