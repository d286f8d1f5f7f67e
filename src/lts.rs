//! LTS schedule based support evaluation
//!
//! The platform runtime and the framework tooling packages are not judged by
//! semver distance. They follow published long-term-support calendars,
//! bundled here as static tables.

use crate::error::{AuditError, Result};
use crate::types::{SupportCheck, SupportCheckResult, ViolationType, Warning, UNRESOLVED_VERSION};
use crate::version::{parse_version, VersionRange};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAINTENANCE_MESSAGE: &str = "Using maintenance LTS. Update to latest LTS";

/// Family of packages sharing one LTS calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LtsGroup {
    /// The platform runtime (`node`)
    Runtime,
    /// Framework CLI and core packages (`ember-cli`, `ember-source`)
    Framework,
}

impl LtsGroup {
    /// Group governing a package, if any
    pub fn for_package(name: &str) -> Option<Self> {
        if Self::Runtime.packages().contains(&name) {
            Some(Self::Runtime)
        } else if Self::Framework.packages().contains(&name) {
            Some(Self::Framework)
        } else {
            None
        }
    }

    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Self::Runtime => &["node"],
            Self::Framework => &["ember-cli", "ember-source"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Runtime => "node",
            Self::Framework => "ember",
        }
    }

    pub fn doc_url(self) -> &'static str {
        match self {
            Self::Runtime => "https://nodejs.org/en/about/releases/",
            Self::Framework => "https://emberjs.com/releases/lts/",
        }
    }
}

/// One release line of an LTS calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LtsEntry {
    /// Human label of the line, e.g. `22.*`
    pub line: String,
    /// Versions accepted as being on this line
    pub version_range: VersionRange,
    pub start_date: DateTime<Utc>,
    pub maintenance_start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl LtsEntry {
    pub fn new(
        line: &str,
        version_range: &str,
        start_date: DateTime<Utc>,
        maintenance_start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            line: line.to_string(),
            version_range: VersionRange::parse(version_range)?,
            start_date,
            maintenance_start_date,
            end_date,
        })
    }

    fn in_window(&self, today: DateTime<Utc>) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    /// The line currently recommended: in window and not yet in maintenance
    fn is_active(&self, today: DateTime<Utc>) -> bool {
        self.in_window(today) && today <= self.maintenance_start_date
    }
}

/// An ordered LTS calendar for one group
#[derive(Debug, Clone)]
pub struct LtsSchedule {
    pub group: LtsGroup,
    pub entries: Vec<LtsEntry>,
}

// (line, range, start, maintenance start, end)
type Row = (&'static str, &'static str, (i32, u32, u32), (i32, u32, u32), (i32, u32, u32));

// A line enters maintenance on the day its successor becomes active LTS.
const NODE_LTS: &[Row] = &[
    ("12.*", "12.*", (2019, 10, 21), (2020, 10, 27), (2022, 4, 30)),
    ("14.*", "14.*", (2020, 10, 27), (2021, 10, 26), (2023, 4, 30)),
    ("16.*", "16.*", (2021, 10, 26), (2022, 10, 25), (2023, 9, 11)),
    ("18.*", "18.*", (2022, 10, 25), (2023, 10, 24), (2025, 4, 30)),
    ("20.*", "20.*", (2023, 10, 24), (2024, 10, 29), (2026, 4, 30)),
    ("22.*", "22.*", (2024, 10, 29), (2025, 10, 28), (2027, 4, 30)),
    ("24.*", ">=24.*", (2025, 10, 28), (2026, 10, 28), (2028, 4, 30)),
    ("26.*", ">=26.*", (2026, 10, 28), (2027, 10, 26), (2029, 4, 30)),
];

// Each framework LTS is supported for 54 weeks from promotion.
const EMBER_LTS: &[Row] = &[
    ("4.8", "4.8.*", (2022, 11, 28), (2023, 5, 22), (2023, 12, 11)),
    ("4.12", "4.12.*", (2023, 5, 22), (2023, 11, 20), (2024, 6, 3)),
    ("5.4", "5.4.*", (2023, 11, 20), (2024, 5, 13), (2024, 12, 2)),
    ("5.8", "5.8.*", (2024, 5, 13), (2024, 11, 4), (2025, 5, 26)),
    ("5.12", "5.12.*", (2024, 11, 4), (2025, 5, 5), (2025, 11, 17)),
    ("6.4", "6.4.*", (2025, 5, 5), (2025, 11, 3), (2026, 5, 18)),
    ("6.8", "6.8.*", (2025, 11, 3), (2026, 5, 4), (2026, 11, 16)),
    ("6.12", ">=6.12.*", (2026, 5, 4), (2026, 11, 2), (2027, 5, 17)),
    ("6.16", ">=6.16.*", (2026, 11, 2), (2027, 4, 19), (2027, 11, 15)),
];

fn ymd((y, m, d): (i32, u32, u32)) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AuditError::parse(format!("invalid LTS schedule date {}-{}-{}", y, m, d)))
}

impl LtsSchedule {
    /// The bundled calendar for a group
    pub fn bundled(group: LtsGroup) -> Result<Self> {
        let rows = match group {
            LtsGroup::Runtime => NODE_LTS,
            LtsGroup::Framework => EMBER_LTS,
        };
        let entries = rows
            .iter()
            .map(|&(line, range, start, maintenance, end)| {
                LtsEntry::new(line, range, ymd(start)?, ymd(maintenance)?, ymd(end)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { group, entries })
    }

    pub fn new(group: LtsGroup, entries: Vec<LtsEntry>) -> Self {
        Self { group, entries }
    }

    /// The currently recommended line; a missing one means the table is stale
    pub fn current(&self, today: DateTime<Utc>) -> Result<&LtsEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.is_active(today))
            .ok_or_else(|| AuditError::StaleSchedule {
                group: self.group.label().to_string(),
                today: today.format("%Y-%m-%d").to_string(),
            })
    }

    /// Evaluate one governed package against the calendar
    pub fn evaluate(
        &self,
        name: &str,
        resolved_version: &str,
        today: DateTime<Utc>,
    ) -> Result<SupportCheckResult> {
        // A stale table is an error even when the version itself looks fine
        let current = self.current(today)?;
        let latest_version = current.version_range.to_string();

        let result = |check: SupportCheck| SupportCheckResult {
            name: name.to_string(),
            resolved_version: resolved_version.to_string(),
            latest_version: latest_version.clone(),
            check,
        };

        if resolved_version.trim() == UNRESOLVED_VERSION {
            let message = match self.group {
                LtsGroup::Runtime => format!(
                    "No {} version mentioned in the package.json. Please add engines/volta",
                    name
                ),
                LtsGroup::Framework => format!("No {} version could be resolved", name),
            };
            return Ok(result(SupportCheck::Supported {
                warning: None,
                message: Some(message),
            }));
        }

        // An exact version is tested for membership, anything else for overlap
        let on_line: Box<dyn Fn(&LtsEntry) -> bool> = match parse_version(resolved_version) {
            Ok(exact) => Box::new(move |e: &LtsEntry| e.version_range.satisfies(&exact)),
            Err(_) => {
                let resolved = VersionRange::parse(resolved_version)?;
                Box::new(move |e: &LtsEntry| e.version_range.intersects(&resolved))
            }
        };
        let matched = self
            .entries
            .iter()
            .rev()
            .find(|e| e.in_window(today) && on_line(*e));

        let check = match matched {
            Some(entry) if entry.maintenance_start_date <= today => {
                debug!("{}@{} is on maintenance LTS {}", name, resolved_version, entry.line);
                SupportCheck::Supported {
                    warning: Some(Warning {
                        duration: entry.end_date - today,
                        violation_type: ViolationType::Lts,
                        deprecation_date: entry.end_date,
                        message: Some(MAINTENANCE_MESSAGE.to_string()),
                    }),
                    message: None,
                }
            }
            Some(_) => SupportCheck::supported(),
            None => SupportCheck::Unsupported {
                violation_type: ViolationType::Lts,
                duration: today - current.start_date,
                deprecation_date: current.start_date,
                message: format!(
                    "{} needs to be on v{} or above LTS version. See {}",
                    name,
                    current.line,
                    self.group.doc_url()
                ),
            },
        };

        Ok(result(check))
    }
}

/// Evaluate a governed package against its bundled calendar
pub fn evaluate_lts_support(
    name: &str,
    resolved_version: &str,
    today: DateTime<Utc>,
) -> Result<SupportCheckResult> {
    let group = LtsGroup::for_package(name)
        .ok_or_else(|| AuditError::version(format!("{} is not governed by an LTS schedule", name)))?;
    LtsSchedule::bundled(group)?.evaluate(name, resolved_version, today)
}
