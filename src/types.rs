//! Core data types for dependency support reporting

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved version used when a project declares no runtime version at all.
pub const UNRESOLVED_VERSION: &str = "0.0.0";

/// A dependency as handed over by the project resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Package name
    pub name: String,
    /// Range declared in the manifest
    pub declared_range: String,
    /// Version the lockfile resolved the range to
    pub resolved_version: String,
    /// Where the dependency was declared
    pub kind: DependencyKind,
    /// Registry document URL; absent for the platform runtime
    pub registry_url: Option<String>,
}

/// Section of the manifest a dependency came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyKind {
    Dependency,
    DevDependency,
    /// The platform runtime (engines/volta), governed by an LTS schedule
    Runtime,
}

impl Dependency {
    /// Create a registry-backed dependency
    pub fn new(
        name: impl Into<String>,
        declared_range: impl Into<String>,
        resolved_version: impl Into<String>,
        kind: DependencyKind,
        registry_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_range: declared_range.into(),
            resolved_version: resolved_version.into(),
            kind,
            registry_url: Some(registry_url.into()),
        }
    }

    /// Create the platform runtime entry
    pub fn runtime(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            declared_range: version.clone(),
            resolved_version: version,
            kind: DependencyKind::Runtime,
            registry_url: None,
        }
    }
}

/// Registry metadata for one package, immutable once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Version carried by the `latest` dist-tag
    pub dist_tags_latest: String,
    /// Publish time of every version
    pub publish_time_by_version: BTreeMap<String, DateTime<Utc>>,
    /// Every published version
    pub version_list: Vec<String>,
}

/// Semver tier (or LTS line) responsible for a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationType {
    Major,
    Minor,
    Patch,
    Prerelease,
    /// Governed by an LTS schedule rather than semver distance
    Lts,
}

impl ViolationType {
    /// Position in the unsupported ordering; lower sorts first
    pub fn rank(self) -> u8 {
        match self {
            Self::Major => 0,
            Self::Minor => 1,
            Self::Patch => 2,
            Self::Prerelease => 3,
            Self::Lts => 4,
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Major => write!(f, "major"),
            Self::Minor => write!(f, "minor"),
            Self::Patch => write!(f, "patch"),
            Self::Prerelease => write!(f, "prerelease"),
            Self::Lts => write!(f, "lts"),
        }
    }
}

/// Details of a support window that is about to close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Time left until the deprecation date
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub deprecation_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of evaluating one dependency against its policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SupportCheck {
    Supported {
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<Warning>,
        /// Informational note that is not a warning
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Unsupported {
        #[serde(rename = "type")]
        violation_type: ViolationType,
        /// Time elapsed since the deprecation date
        #[serde(with = "duration_ms")]
        duration: Duration,
        #[serde(rename = "deprecationDate")]
        deprecation_date: DateTime<Utc>,
        message: String,
    },
}

impl SupportCheck {
    /// Supported, nothing to report
    pub fn supported() -> Self {
        Self::Supported {
            warning: None,
            message: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported { .. })
    }

    pub fn warning(&self) -> Option<&Warning> {
        match self {
            Self::Supported { warning, .. } => warning.as_ref(),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn has_warning(&self) -> bool {
        self.warning().is_some()
    }

    /// Duration relevant to ordering: time left for warnings, time overdue
    /// for violations
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Supported { warning, .. } => warning.as_ref().map(|w| w.duration),
            Self::Unsupported { duration, .. } => Some(*duration),
        }
    }

    pub fn violation_type(&self) -> Option<ViolationType> {
        match self {
            Self::Supported { warning, .. } => warning.as_ref().map(|w| w.violation_type),
            Self::Unsupported { violation_type, .. } => Some(*violation_type),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Supported { warning, message } => message
                .as_deref()
                .or_else(|| warning.as_ref().and_then(|w| w.message.as_deref())),
            Self::Unsupported { message, .. } => Some(message),
        }
    }
}

/// A support check together with the identity of the dependency it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportCheckResult {
    pub name: String,
    pub resolved_version: String,
    /// Latest version (or active LTS line) the dependency was compared to
    pub latest_version: String,
    #[serde(flatten)]
    pub check: SupportCheck,
}

impl SupportCheckResult {
    pub fn is_supported(&self) -> bool {
        self.check.is_supported()
    }
}

/// Audit outcome for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAuditResult {
    pub project_name: String,
    pub project_path: String,
    pub is_in_support_window: bool,
    pub is_expiring_soon: bool,
    /// Ordered by the result classifier
    pub support_checks: Vec<SupportCheckResult>,
}

/// Audit outcome across every requested project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiProjectAuditResult {
    pub is_in_support_window: bool,
    /// Projects fully supported but with something expiring soon
    pub expiring_soon_count: usize,
    pub projects: Vec<ProjectAuditResult>,
}

/// Serialize `chrono::Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(millis))
    }
}
