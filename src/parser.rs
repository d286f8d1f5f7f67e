//! Resolve a JavaScript project's dependencies from package.json and package-lock.json

use crate::config::NetworkConfig;
use crate::error::{AuditError, Result};
use crate::types::{Dependency, DependencyKind, UNRESOLVED_VERSION};
use crate::version::coerce;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

const MANIFEST: &str = "package.json";
const LOCKFILE: &str = "package-lock.json";
const RUNTIME: &str = "node";

/// A project and the dependencies it declares
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub name: String,
    pub path: PathBuf,
    pub dependencies: Vec<Dependency>,
}

/// Turns a project directory into a dependency list
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    async fn resolve(&self, project_path: &Path) -> Result<ResolvedProject>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PackageJson {
    name: Option<String>,
    dependencies: BTreeMap<String, String>,
    dev_dependencies: BTreeMap<String, String>,
    engines: Option<Engines>,
    volta: Option<Volta>,
}

#[derive(Debug, Default, Deserialize)]
struct Engines {
    node: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Volta {
    node: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PackageLock {
    lockfile_version: u32,
    /// lockfile v2/v3, keyed by install path
    packages: HashMap<String, LockEntry>,
    /// lockfile v1, keyed by name
    dependencies: HashMap<String, LockEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct LockEntry {
    version: Option<String>,
}

impl PackageLock {
    fn resolved_version(&self, name: &str) -> Option<&str> {
        self.packages
            .get(&format!("node_modules/{}", name))
            .or_else(|| self.dependencies.get(name))
            .and_then(|entry| entry.version.as_deref())
    }
}

/// Resolver for npm projects
#[derive(Debug, Clone, Default)]
pub struct NpmProjectResolver {
    network: NetworkConfig,
}

impl NpmProjectResolver {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network }
    }
}

#[async_trait]
impl ProjectResolver for NpmProjectResolver {
    async fn resolve(&self, project_path: &Path) -> Result<ResolvedProject> {
        let manifest_path = project_path.join(MANIFEST);
        let pkg = read_manifest(&manifest_path).await?;

        let lock_path = project_path.join(LOCKFILE);
        let lock = read_lockfile(&lock_path).await?;
        debug!(
            "{} uses lockfile version {}",
            project_path.display(),
            lock.lockfile_version
        );

        let mut dependencies = Vec::new();
        let sections = [
            (&pkg.dependencies, DependencyKind::Dependency),
            (&pkg.dev_dependencies, DependencyKind::DevDependency),
        ];
        for (section, kind) in sections {
            for (name, range) in section {
                let resolved = match lock.resolved_version(name) {
                    Some(version) => version.to_string(),
                    // local links and git urls never coerce and are dropped later
                    None if coerce(range).is_none() => range.clone(),
                    None => {
                        return Err(AuditError::setup(format!(
                            "could not find '{}' in '{}'",
                            name,
                            lock_path.display()
                        )))
                    }
                };
                dependencies.push(Dependency::new(
                    name,
                    range,
                    resolved,
                    kind,
                    self.network.package_url(name),
                ));
            }
        }

        dependencies.push(runtime_dependency(&pkg));

        Ok(ResolvedProject {
            name: project_name(&pkg, project_path),
            path: project_path.to_path_buf(),
            dependencies,
        })
    }
}

async fn read_manifest(path: &Path) -> Result<PackageJson> {
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        AuditError::setup(format!(
            "{} does not exist, are you sure this is a valid package?",
            path.display()
        ))
    })?;
    if !metadata.is_file() {
        return Err(AuditError::setup(format!(
            "{} is not a file, are you sure this is a valid package?",
            path.display()
        )));
    }
    let contents = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&contents).map_err(|_| {
        AuditError::setup(format!(
            "{} is not a valid JSON file, are you sure this is a valid package?",
            path.display()
        ))
    })
}

async fn read_lockfile(path: &Path) -> Result<PackageLock> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        AuditError::setup(format!("could not read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| AuditError::setup(format!("{} is not a valid lockfile: {}", path.display(), e)))
}

/// The runtime entry, taken from `volta.node`, then `engines.node`
fn runtime_dependency(pkg: &PackageJson) -> Dependency {
    let version = pkg
        .volta
        .as_ref()
        .and_then(|v| v.node.clone())
        .or_else(|| pkg.engines.as_ref().and_then(|e| e.node.clone()))
        .unwrap_or_else(|| UNRESOLVED_VERSION.to_string());
    Dependency::runtime(RUNTIME, version)
}

fn project_name(pkg: &PackageJson, project_path: &Path) -> String {
    pkg.name.clone().unwrap_or_else(|| {
        project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| project_path.display().to_string())
    })
}
