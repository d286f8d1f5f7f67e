//! # supported
//!
//! Audit a project's dependencies against a time-based support policy:
//! - **Upgrade budgets**: each semver tier (major/minor/patch) may lag behind
//!   latest for a configured number of quarters after the release that opened
//!   the gap
//! - **LTS schedules**: the runtime and framework packages are checked against
//!   their published long-term-support calendars
//! - **Expiring soon**: deadlines less than five quarters away are flagged
//!   before they become violations
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use supported::{
//!     audit_projects, AuditContext, NetworkConfig, NoopProgress, NpmProjectResolver,
//!     NpmRegistryClient, PolicyRules,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let network = NetworkConfig::default();
//! let client = Arc::new(NpmRegistryClient::new(&network)?);
//! let ctx = AuditContext::new(PolicyRules::from_config(None)?, client, chrono::Utc::now())?;
//! let resolver = Arc::new(NpmProjectResolver::new(network));
//!
//! let result = audit_projects(&ctx, resolver, vec![".".into()], Arc::new(NoopProgress)).await?;
//! for project in result.projects {
//!     for check in project.support_checks {
//!         println!("{}@{}: supported={}", check.name, check.resolved_version, check.is_supported());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod audit;
mod calendar;
mod classify;
mod config;
mod error;
mod lts;
mod metadata;
mod parser;
mod pool;
mod progress;
mod support;
mod types;
mod version;

// Re-export public API
pub use audit::{audit_dependencies, audit_projects, AuditContext};
pub use calendar::{deprecation_date, end_of_quarter, is_expiring_soon, quarters_ceil};
pub use classify::{categorize, compare_results, sort_results, violation_summary, Categorized, ViolationSummary};
pub use config::{
    parse_date, parse_reference_date, CustomConfig, CustomPolicy, NetworkConfig, PolicyRules, PrimaryConfig, PrimaryPolicy,
    SupportConfig, SupportConfigBuilder, UpgradeBudget,
};
pub use error::{AuditError, Result};
pub use lts::{evaluate_lts_support, LtsEntry, LtsGroup, LtsSchedule};
pub use metadata::{MetadataCache, NpmRegistryClient, RegistryClient};
pub use parser::{NpmProjectResolver, ProjectResolver, ResolvedProject};
pub use pool::{default_workers, run_all};
pub use progress::{NoopProgress, ProgressCounts, ProgressSink};
pub use support::{evaluate_version_support, latest_version};
pub use types::{
    Dependency, DependencyKind, MultiProjectAuditResult, PackageMetadata, ProjectAuditResult, SupportCheck,
    SupportCheckResult, ViolationType, Warning, UNRESOLVED_VERSION,
};
pub use version::{coerce, VersionRange};
