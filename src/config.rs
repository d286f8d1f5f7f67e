//! Configuration for support policies and registry access

use crate::error::{AuditError, Result};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::debug;

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Policy configuration as written in a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupportConfig {
    /// Compare against the newest stable release when `latest` is a prerelease
    pub ignore_prereleases: bool,
    /// Policy applied to every dependency without a custom entry
    pub primary: Option<PrimaryConfig>,
    /// Per-dependency overrides
    pub custom: Vec<CustomConfig>,
}

/// The `primary` section of a configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimaryConfig {
    pub upgrade_budget: Option<UpgradeBudget>,
    pub ignored_dependencies: Vec<String>,
}

/// One entry of the `custom` list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomConfig {
    /// Dependencies this override applies to
    pub dependencies: Vec<String>,
    pub upgrade_budget: Option<UpgradeBudget>,
    /// `YYYY-MM-DD` or RFC 3339
    pub effective_release_date: Option<String>,
}

/// Quarters a dependency may lag behind latest, per semver tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeBudget {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Default for UpgradeBudget {
    fn default() -> Self {
        Self {
            major: 4,
            minor: 2,
            patch: 1,
        }
    }
}

/// Policy applied to every dependency without a custom override
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryPolicy {
    pub upgrade_budget: UpgradeBudget,
    pub ignore_prereleases: bool,
    pub ignored_dependencies: BTreeSet<String>,
}

/// Override for one dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPolicy {
    pub upgrade_budget: Option<UpgradeBudget>,
    pub effective_release_date: Option<DateTime<Utc>>,
}

/// Validated policy rules, built once per run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRules {
    pub primary: PrimaryPolicy,
    pub custom: BTreeMap<String, CustomPolicy>,
}

impl PolicyRules {
    /// Validate a configuration and fill in defaults.
    ///
    /// A dependency may appear in at most one custom entry, and never in both
    /// the ignore list and a custom entry.
    pub fn from_config(config: Option<&SupportConfig>) -> Result<Self> {
        let Some(config) = config else {
            return Ok(Self::default());
        };

        let primary_config = config.primary.clone().unwrap_or_default();
        let primary = PrimaryPolicy {
            upgrade_budget: primary_config.upgrade_budget.unwrap_or_default(),
            ignore_prereleases: config.ignore_prereleases,
            ignored_dependencies: primary_config.ignored_dependencies.into_iter().collect(),
        };

        let mut custom = BTreeMap::new();
        for entry in &config.custom {
            let effective_release_date = entry
                .effective_release_date
                .as_deref()
                .map(parse_date)
                .transpose()?;

            for name in &entry.dependencies {
                if custom.contains_key(name) {
                    return Err(AuditError::config(format!(
                        "The dependency {} was found multiple times in the custom policies",
                        name
                    )));
                }
                if primary.ignored_dependencies.contains(name) {
                    return Err(AuditError::config(format!(
                        "The dependency {} was found in both ignoredDependencies and a custom policy",
                        name
                    )));
                }
                debug!(
                    "custom policy for {}: budget {:?}, effective release {:?}",
                    name, entry.upgrade_budget, effective_release_date
                );
                custom.insert(
                    name.clone(),
                    CustomPolicy {
                        upgrade_budget: entry.upgrade_budget,
                        effective_release_date,
                    },
                );
            }
        }

        Ok(Self { primary, custom })
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.primary.ignored_dependencies.contains(name)
    }

    /// Budget in force for a dependency
    pub fn upgrade_budget_for(&self, name: &str) -> UpgradeBudget {
        self.custom
            .get(name)
            .and_then(|c| c.upgrade_budget)
            .unwrap_or(self.primary.upgrade_budget)
    }

    /// Configured trigger date override for a dependency
    pub fn effective_release_date_for(&self, name: &str) -> Option<DateTime<Utc>> {
        self.custom.get(name).and_then(|c| c.effective_release_date)
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AuditError::config(format!("could not parse date '{}'", input)))
}

/// Parse the reference instant for a run: an absolute date as accepted by
/// [`parse_date`], or an offset from `now` such as `-30d`, `+2w`, `6m`, `-1y`
pub fn parse_reference_date(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = parse_date(input) {
        return Ok(date);
    }

    let invalid = || AuditError::config(format!("could not parse date or offset '{}'", input));
    let (negative, rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    let unit = rest.chars().last().ok_or_else(invalid)?;
    let amount: u32 = rest[..rest.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;

    let shifted = match unit {
        'd' | 'w' => {
            let days = chrono::Duration::days(i64::from(amount) * if unit == 'w' { 7 } else { 1 });
            if negative {
                now.checked_sub_signed(days)
            } else {
                now.checked_add_signed(days)
            }
        }
        'm' | 'y' => {
            let months = Months::new(amount * if unit == 'y' { 12 } else { 1 });
            if negative {
                now.checked_sub_months(months)
            } else {
                now.checked_add_months(months)
            }
        }
        _ => None,
    };
    shifted.ok_or_else(invalid)
}

/// Network configuration for registry calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries on transport failure or rate limiting
    pub max_retries: u32,
    /// Initial backoff between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Default registry base URL
    pub registry: String,
    /// Registry overrides per npm scope (`@scope` -> URL)
    pub scoped_registries: BTreeMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            registry: std::env::var("NPM_CONFIG_REGISTRY")
                .unwrap_or_else(|_| DEFAULT_REGISTRY.to_string()),
            scoped_registries: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get initial retry backoff as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Registry document URL for a package name
    pub fn package_url(&self, name: &str) -> String {
        let registry = name
            .strip_prefix('@')
            .and_then(|scoped| scoped.split_once('/'))
            .and_then(|(scope, _)| self.scoped_registries.get(&format!("@{}", scope)))
            .unwrap_or(&self.registry);
        let base = registry.trim_end_matches('/');
        format!("{}/{}", base, urlencoding::encode(name).replace("%40", "@"))
    }
}

impl SupportConfig {
    /// Create a new builder for SupportConfig
    pub fn builder() -> SupportConfigBuilder {
        SupportConfigBuilder::default()
    }
}

/// Builder for SupportConfig
#[derive(Default)]
pub struct SupportConfigBuilder {
    ignore_prereleases: bool,
    upgrade_budget: Option<UpgradeBudget>,
    ignored_dependencies: Vec<String>,
    custom: Vec<CustomConfig>,
}

impl SupportConfigBuilder {
    pub fn ignore_prereleases(mut self, ignore: bool) -> Self {
        self.ignore_prereleases = ignore;
        self
    }

    pub fn upgrade_budget(mut self, budget: UpgradeBudget) -> Self {
        self.upgrade_budget = Some(budget);
        self
    }

    pub fn ignore_dependency(mut self, name: impl Into<String>) -> Self {
        self.ignored_dependencies.push(name.into());
        self
    }

    pub fn custom(mut self, entry: CustomConfig) -> Self {
        self.custom.push(entry);
        self
    }

    pub fn build(self) -> SupportConfig {
        SupportConfig {
            ignore_prereleases: self.ignore_prereleases,
            primary: Some(PrimaryConfig {
                upgrade_budget: self.upgrade_budget,
                ignored_dependencies: self.ignored_dependencies,
            }),
            custom: self.custom,
        }
    }
}
