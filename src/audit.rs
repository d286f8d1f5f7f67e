//! Main audit orchestration logic

use crate::classify::{categorize, sort_results};
use crate::config::PolicyRules;
use crate::error::{AuditError, Result};
use crate::lts::{LtsGroup, LtsSchedule};
use crate::metadata::{MetadataCache, RegistryClient};
use crate::parser::ProjectResolver;
use crate::pool::{default_workers, run_all};
use crate::progress::ProgressSink;
use crate::support::evaluate_version_support;
use crate::types::{Dependency, MultiProjectAuditResult, ProjectAuditResult, SupportCheckResult};
use crate::version::coerce;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything one run shares: policy, registry access, the metadata cache,
/// LTS calendars and the reference instant
#[derive(Clone)]
pub struct AuditContext {
    pub rules: Arc<PolicyRules>,
    pub client: Arc<dyn RegistryClient>,
    pub cache: Arc<MetadataCache>,
    pub lts_schedules: Arc<Vec<LtsSchedule>>,
    pub today: DateTime<Utc>,
    pub workers: usize,
}

impl AuditContext {
    /// Context with the bundled LTS calendars, an empty cache and one worker
    /// per available core
    pub fn new(
        rules: PolicyRules,
        client: Arc<dyn RegistryClient>,
        today: DateTime<Utc>,
    ) -> Result<Self> {
        let lts_schedules = vec![
            LtsSchedule::bundled(LtsGroup::Runtime)?,
            LtsSchedule::bundled(LtsGroup::Framework)?,
        ];
        Ok(Self {
            rules: Arc::new(rules),
            client,
            cache: Arc::new(MetadataCache::new()),
            lts_schedules: Arc::new(lts_schedules),
            today,
            workers: default_workers(),
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_lts_schedules(mut self, schedules: Vec<LtsSchedule>) -> Self {
        self.lts_schedules = Arc::new(schedules);
        self
    }

    fn lts_schedule(&self, name: &str) -> Option<&LtsSchedule> {
        let group = LtsGroup::for_package(name)?;
        self.lts_schedules.iter().find(|s| s.group == group)
    }

    /// Evaluate a single dependency with whichever evaluator governs it
    async fn evaluate(&self, dep: &Dependency) -> Result<SupportCheckResult> {
        if let Some(schedule) = self.lts_schedule(&dep.name) {
            return schedule.evaluate(&dep.name, &dep.resolved_version, self.today);
        }

        let url = dep.registry_url.as_deref().ok_or_else(|| {
            AuditError::fetch(dep.name.clone(), None, "no registry URL for dependency")
        })?;
        let metadata = self.cache.get_or_fetch(url, self.client.as_ref()).await?;
        evaluate_version_support(
            &metadata,
            &dep.name,
            &dep.resolved_version,
            &self.rules,
            self.today,
        )
    }

    /// Whether a dependency takes part in the audit at all
    fn is_auditable(&self, dep: &Dependency) -> bool {
        if self.rules.is_ignored(&dep.name) {
            debug!("Skipping ignored dependency: {}", dep.name);
            return false;
        }
        if self.lts_schedule(&dep.name).is_none() && coerce(&dep.declared_range).is_none() {
            debug!(
                "Skipping {} with non-version range '{}'",
                dep.name, dep.declared_range
            );
            return false;
        }
        true
    }
}

/// Audit one project's dependencies.
///
/// Every unit runs to completion before the first error is raised; no
/// partial result is ever returned.
pub async fn audit_dependencies(
    ctx: &AuditContext,
    project_name: &str,
    project_path: &str,
    dependencies: Vec<Dependency>,
    progress: Arc<dyn ProgressSink>,
) -> Result<ProjectAuditResult> {
    let declared = dependencies.len();
    let units: Vec<Dependency> = dependencies
        .into_iter()
        .filter(|dep| ctx.is_auditable(dep))
        .collect();

    progress.set_total(units.len());
    progress.set_ignored(declared - units.len());
    info!(
        "Auditing {} dependencies for project '{}' ({} skipped)",
        units.len(),
        project_name,
        declared - units.len()
    );

    let unit_ctx = ctx.clone();
    let unit_progress = progress.clone();
    let mut results = run_all(ctx.workers, units, move |dep| {
        let ctx = unit_ctx.clone();
        let progress = unit_progress.clone();
        async move {
            let result = ctx.evaluate(&dep).await?;
            progress.record_dependency(&result.name, result.is_supported(), result.check.has_warning());
            Ok(result)
        }
    })
    .await?;

    let is_in_support_window = results.iter().all(SupportCheckResult::is_supported);
    sort_results(&mut results);
    let is_expiring_soon = is_in_support_window && categorize(&results).has_expiring_soon();
    progress.record_semver_policy(is_in_support_window, is_expiring_soon);

    info!(
        "Audit of '{}' complete: {}",
        project_name,
        if is_in_support_window {
            "in support window"
        } else {
            "out of support window"
        }
    );

    Ok(ProjectAuditResult {
        project_name: project_name.to_string(),
        project_path: project_path.to_string(),
        is_in_support_window,
        is_expiring_soon,
        support_checks: results,
    })
}

/// Resolve and audit every project path, sharing one metadata cache.
///
/// Projects appear in the result in input order.
pub async fn audit_projects(
    ctx: &AuditContext,
    resolver: Arc<dyn ProjectResolver>,
    paths: Vec<PathBuf>,
    progress: Arc<dyn ProgressSink>,
) -> Result<MultiProjectAuditResult> {
    info!("Starting audit of {} projects", paths.len());

    let unit_ctx = ctx.clone();
    let projects = run_all(ctx.workers, paths, move |path| {
        let ctx = unit_ctx.clone();
        let resolver = resolver.clone();
        let progress = progress.clone();
        async move {
            let display_path = path.display().to_string();
            let project = resolver.resolve(&path).await?;
            let channel = progress.project(&display_path);
            let result = audit_dependencies(
                &ctx,
                &project.name,
                &display_path,
                project.dependencies,
                channel,
            )
            .await?;
            progress.record_project(
                &result.project_name,
                result.is_in_support_window,
                result.is_expiring_soon,
            );
            Ok(result)
        }
    })
    .await?;

    let is_in_support_window = projects.iter().all(|p| p.is_in_support_window);
    let expiring_soon_count = projects
        .iter()
        .filter(|p| p.is_in_support_window && p.is_expiring_soon)
        .count();

    Ok(MultiProjectAuditResult {
        is_in_support_window,
        expiring_soon_count,
        projects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupportConfig;
    use crate::lts::LtsEntry;
    use crate::parser::ResolvedProject;
    use crate::progress::{NoopProgress, ProgressCounts};
    use crate::types::{DependencyKind, PackageMetadata};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const REGISTRY: &str = "https://registry.example";

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn today() -> DateTime<Utc> {
        at(2024, 6, 1)
    }

    fn url(name: &str) -> String {
        format!("{}/{}", REGISTRY, name)
    }

    fn metadata(latest: &str, published: &[(&str, DateTime<Utc>)]) -> PackageMetadata {
        PackageMetadata {
            dist_tags_latest: latest.to_string(),
            publish_time_by_version: published.iter().map(|(v, t)| (v.to_string(), *t)).collect(),
            version_list: published.iter().map(|(v, _)| v.to_string()).collect(),
        }
    }

    /// In-memory registry recording every fetch
    #[derive(Default)]
    struct FakeRegistry {
        packages: HashMap<String, PackageMetadata>,
        slow: HashSet<String>,
        fetches: Mutex<Vec<String>>,
        slow_finished: AtomicBool,
    }

    impl FakeRegistry {
        fn standard() -> Self {
            let mut packages = HashMap::new();
            packages.insert(
                url("lodash"),
                metadata("4.17.21", &[("4.17.21", at(2021, 2, 20))]),
            );
            packages.insert(
                url("moment"),
                metadata("2.0.0", &[("1.0.0", at(2015, 1, 1)), ("2.0.0", at(2016, 1, 1))]),
            );
            packages.insert(
                url("rsvp"),
                metadata("4.8.5", &[("4.8.4", at(2018, 10, 1)), ("4.8.5", at(2024, 3, 1))]),
            );
            Self {
                packages,
                ..Default::default()
            }
        }

        fn fetch_count(&self, url: &str) -> usize {
            self.fetches.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn fetch(&self, url: &str) -> Result<PackageMetadata> {
            self.fetches.lock().unwrap().push(url.to_string());
            if self.slow.contains(url) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.slow_finished.store(true, Ordering::SeqCst);
            }
            self.packages
                .get(url)
                .cloned()
                .ok_or_else(|| AuditError::fetch(url, Some("E404".into()), "Not found"))
        }
    }

    fn dep(name: &str, version: &str) -> Dependency {
        Dependency::new(name, version, version, DependencyKind::Dependency, url(name))
    }

    fn context(registry: Arc<FakeRegistry>) -> AuditContext {
        AuditContext::new(PolicyRules::default(), registry, today())
            .unwrap()
            .with_workers(4)
    }

    #[tokio::test]
    async fn test_project_results_are_sorted_and_aggregated() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry.clone());
        let deps = vec![
            dep("lodash", "4.17.21"),
            dep("rsvp", "4.8.4"),
            Dependency::runtime("node", "20.11.0"),
            dep("moment", "1.0.0"),
        ];

        let result = audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap();

        let names: Vec<&str> = result.support_checks.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["moment", "rsvp", "lodash", "node"]);
        assert!(!result.is_in_support_window);
        assert!(!result.is_expiring_soon);
        assert_eq!(result.project_name, "app");
        assert_eq!(registry.fetch_count(&url("node")), 0);
    }

    #[tokio::test]
    async fn test_supported_project_with_warning_is_expiring() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry);
        let deps = vec![dep("lodash", "4.17.21"), dep("rsvp", "4.8.4")];

        let result = audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap();
        assert!(result.is_in_support_window);
        assert!(result.is_expiring_soon);
    }

    #[tokio::test]
    async fn test_lts_maintenance_counts_as_expiring() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry);
        let deps = vec![dep("lodash", "4.17.21"), Dependency::runtime("node", "18.19.0")];

        let result = audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap();
        assert!(result.is_in_support_window);
        assert!(result.is_expiring_soon);
    }

    #[tokio::test]
    async fn test_shared_url_fetched_once() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry.clone());
        let deps = vec![
            dep("lodash", "4.17.21"),
            Dependency::new("lodash", "^4.17.0", "4.17.21", DependencyKind::DevDependency, url("lodash")),
            dep("lodash", "4.17.21"),
        ];

        audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap();
        assert_eq!(registry.fetch_count(&url("lodash")), 1);
    }

    #[tokio::test]
    async fn test_ignored_and_local_dependencies_are_excluded() {
        let registry = Arc::new(FakeRegistry::standard());
        let config = SupportConfig::builder().ignore_dependency("moment").build();
        let rules = PolicyRules::from_config(Some(&config)).unwrap();
        let ctx = AuditContext::new(rules, registry.clone(), today()).unwrap();
        let counts = Arc::new(ProgressCounts::default());
        let deps = vec![
            dep("moment", "1.0.0"),
            Dependency::new("shared", "file:../shared", "file:../shared", DependencyKind::Dependency, url("shared")),
            dep("lodash", "4.17.21"),
        ];

        let result = audit_dependencies(&ctx, "app", "/work/app", deps, counts.clone())
            .await
            .unwrap();

        assert_eq!(result.support_checks.len(), 1);
        assert!(result.is_in_support_window);
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.ignored(), 2);
        assert_eq!(counts.done(), 1);
        assert_eq!(registry.fetch_count(&url("moment")), 0);
        assert_eq!(registry.fetch_count(&url("shared")), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_waits_for_siblings() {
        let mut registry = FakeRegistry::standard();
        registry.slow.insert(url("lodash"));
        let registry = Arc::new(registry);
        let ctx = context(registry.clone()).with_workers(2);
        let deps = vec![dep("left-pad", "1.3.0"), dep("lodash", "4.17.21")];

        let err = audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("E404"));
        assert!(registry.slow_finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stale_lts_schedule_is_fatal() {
        let registry = Arc::new(FakeRegistry::standard());
        let stale = LtsSchedule::new(
            LtsGroup::Runtime,
            vec![LtsEntry::new("14.*", ">=14.*", at(2020, 10, 27), at(2021, 10, 19), at(2023, 4, 30)).unwrap()],
        );
        let ctx = context(registry).with_lts_schedules(vec![stale]);
        let deps = vec![dep("lodash", "4.17.21"), Dependency::runtime("node", "22.0.0")];

        let err = audit_dependencies(&ctx, "app", "/work/app", deps, Arc::new(NoopProgress))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_registry_url_is_fetch_error() {
        let ctx = context(Arc::new(FakeRegistry::standard()));
        let mut orphan = dep("lodash", "4.17.21");
        orphan.registry_url = None;

        let err = audit_dependencies(&ctx, "app", "/work/app", vec![orphan], Arc::new(NoopProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::MetadataFetch { .. }));
    }

    /// Resolver serving canned dependency lists by path
    struct FakeResolver {
        projects: BTreeMap<PathBuf, Vec<Dependency>>,
    }

    #[async_trait]
    impl ProjectResolver for FakeResolver {
        async fn resolve(&self, project_path: &Path) -> Result<ResolvedProject> {
            let dependencies = self
                .projects
                .get(project_path)
                .cloned()
                .ok_or_else(|| AuditError::setup(format!("{} does not exist", project_path.display())))?;
            Ok(ResolvedProject {
                name: project_path.display().to_string(),
                path: project_path.to_path_buf(),
                dependencies,
            })
        }
    }

    #[tokio::test]
    async fn test_multi_project_aggregation() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry.clone());
        let mut projects = BTreeMap::new();
        projects.insert(PathBuf::from("a"), vec![dep("lodash", "4.17.21")]);
        projects.insert(PathBuf::from("b"), vec![dep("lodash", "4.17.21"), dep("rsvp", "4.8.4")]);
        projects.insert(PathBuf::from("c"), vec![dep("lodash", "4.17.21"), dep("moment", "1.0.0")]);
        let resolver = Arc::new(FakeResolver { projects });

        let result = audit_projects(
            &ctx,
            resolver,
            vec![PathBuf::from("c"), PathBuf::from("a"), PathBuf::from("b")],
            Arc::new(NoopProgress),
        )
        .await
        .unwrap();

        let order: Vec<&str> = result.projects.iter().map(|p| p.project_name.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert!(!result.is_in_support_window);
        assert_eq!(result.expiring_soon_count, 1);
        assert_eq!(registry.fetch_count(&url("lodash")), 1);
    }

    #[tokio::test]
    async fn test_multi_project_failure_returns_no_result() {
        let registry = Arc::new(FakeRegistry::standard());
        let ctx = context(registry);
        let mut projects = BTreeMap::new();
        projects.insert(PathBuf::from("ok"), vec![dep("lodash", "4.17.21")]);
        let resolver = Arc::new(FakeResolver { projects });

        let err = audit_projects(
            &ctx,
            resolver,
            vec![PathBuf::from("ok"), PathBuf::from("missing")],
            Arc::new(NoopProgress),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuditError::ProjectSetup(_)));
    }
}
