//! CLI tool for checking projects against their dependency support policy

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use supported::{
    audit_projects, categorize, parse_reference_date, quarters_ceil, violation_summary, AuditContext,
    MultiProjectAuditResult, NetworkConfig, NpmProjectResolver, NpmRegistryClient, PolicyRules,
    ProgressCounts, ProgressSink, ProjectAuditResult, SupportCheck, SupportCheckResult, SupportConfig,
    ViolationType,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "supported")]
#[command(about = "Check whether a project's dependencies are inside their support window", long_about = None)]
#[command(version)]
struct Cli {
    /// Project directories to audit (default: current directory)
    paths: Vec<PathBuf>,

    /// Policy configuration file (TOML, or JSON by extension)
    #[arg(short = 'c', long = "config-file")]
    config_file: Option<PathBuf>,

    /// Evaluate as of this date: YYYY-MM-DD, RFC 3339, or an offset like -30d, +2w, 6m, -1y
    #[arg(short = 'd', long = "current-date", allow_hyphen_values = true)]
    current_date: Option<String>,

    /// Registry base URL (default: $NPM_CONFIG_REGISTRY or the public npm registry)
    #[arg(long)]
    registry: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// List unsupported dependencies
    #[arg(long)]
    unsupported: bool,

    /// List supported dependencies
    #[arg(long)]
    supported: bool,

    /// List dependencies whose support ends soon
    #[arg(long)]
    expiring: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let Some(paths) = project_paths(&cli.paths) else {
        // Nothing to audit here; show how to point at a project
        let _ = Cli::command().print_help();
        process::exit(1);
    };

    match run(&cli, paths).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Returns whether every project is inside its support window
async fn run(cli: &Cli, paths: Vec<PathBuf>) -> Result<bool> {
    let config = match &cli.config_file {
        Some(path) => Some(load_config(path)?),
        None => None,
    };
    let rules = PolicyRules::from_config(config.as_ref())?;

    let today = match &cli.current_date {
        Some(input) => parse_reference_date(input, Utc::now())?,
        None => Utc::now(),
    };

    let mut network = NetworkConfig::default();
    if let Some(registry) = &cli.registry {
        network.registry = registry.clone();
    }

    info!("Evaluating {} project(s) as of {}", paths.len(), today);

    let client = Arc::new(NpmRegistryClient::new(&network)?);
    let ctx = AuditContext::new(rules, client, today)?;
    let resolver = Arc::new(NpmProjectResolver::new(network));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message("Auditing dependencies...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let progress = Arc::new(SpinnerProgress {
        bar: spinner.clone(),
    });
    let result = audit_projects(&ctx, resolver, paths, progress).await;

    spinner.finish_and_clear();
    let result = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_results(&result, cli, today);
    }

    Ok(result.is_in_support_window)
}

/// Explicit paths, else the current directory when it holds a readable
/// `package.json`
fn project_paths(explicit: &[PathBuf]) -> Option<Vec<PathBuf>> {
    if !explicit.is_empty() {
        return Some(explicit.to_vec());
    }
    std::fs::read_to_string("package.json")
        .ok()
        .map(|_| vec![PathBuf::from(".")])
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: &Path) -> Result<SupportConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?
    };
    Ok(config)
}

/// Progress sink driving the terminal spinner
struct SpinnerProgress {
    bar: ProgressBar,
}

impl ProgressSink for SpinnerProgress {
    fn record_project(&self, name: &str, is_supported: bool, _is_expiring: bool) {
        let mark = if is_supported { "✓" } else { "✗" };
        self.bar.set_message(format!("{} {} audited", mark, name));
    }

    fn project(&self, path: &str) -> Arc<dyn ProgressSink> {
        Arc::new(ProjectSpinner {
            bar: self.bar.clone(),
            label: path.to_string(),
            counts: ProgressCounts::default(),
        })
    }
}

struct ProjectSpinner {
    bar: ProgressBar,
    label: String,
    counts: ProgressCounts,
}

impl ProjectSpinner {
    fn refresh(&self) {
        self.bar.set_message(format!(
            "{}: checked {}/{} dependencies ({} unsupported, {} expiring soon)",
            self.label,
            self.counts.done(),
            self.counts.total(),
            self.counts.unsupported(),
            self.counts.expiring()
        ));
    }
}

impl ProgressSink for ProjectSpinner {
    fn set_total(&self, total: usize) {
        self.counts.set_total(total);
        self.refresh();
    }

    fn set_ignored(&self, ignored: usize) {
        self.counts.set_ignored(ignored);
    }

    fn record_dependency(&self, name: &str, is_supported: bool, has_warning: bool) {
        self.counts.record_dependency(name, is_supported, has_warning);
        self.refresh();
    }
}

fn display_results(result: &MultiProjectAuditResult, cli: &Cli, today: DateTime<Utc>) {
    for project in &result.projects {
        display_project(project, cli, today);
    }

    if result.projects.len() > 1 {
        println!();
        let supported = result.projects.iter().filter(|p| p.is_in_support_window).count();
        println!(
            "{} of {} projects are in the support window, {} expiring soon",
            supported,
            result.projects.len(),
            result.expiring_soon_count
        );
    }
}

fn display_project(project: &ProjectAuditResult, cli: &Cli, today: DateTime<Utc>) {
    println!("\n{}", format!("=== {} ===", project.project_name).bold());
    println!("Path: {}", project.project_path.cyan());
    println!("Evaluated as of: {}", today.format("%Y-%m-%d"));
    println!();

    let categorized = categorize(&project.support_checks);
    if !project.is_in_support_window {
        println!("{} Your project is out of the support window", "✗".red().bold());
    } else if project.is_expiring_soon {
        println!(
            "{} Your project is in the support window, but support for some dependencies ends soon",
            "⚠".yellow().bold()
        );
    } else {
        println!("{} Congrats! Your project is in the support window", "✓".green().bold());
    }

    let summary = violation_summary(&project.support_checks);
    for tier in [
        ViolationType::Major,
        ViolationType::Minor,
        ViolationType::Patch,
        ViolationType::Prerelease,
        ViolationType::Lts,
    ] {
        let count = summary.count(tier);
        if count > 0 {
            println!(
                "  {} of {} dependencies violate the {} policy",
                count.to_string().red(),
                summary.total,
                tier
            );
        }
    }
    if !categorized.expiring_soon.is_empty() {
        println!(
            "  {} of {} dependencies lose support soon",
            categorized.expiring_soon.len().to_string().yellow(),
            summary.total
        );
    }

    // Without a filter, show everything that needs attention
    let any_filter = cli.unsupported || cli.supported || cli.expiring;
    let show_unsupported = cli.unsupported || !any_filter;
    let show_expiring = cli.expiring || !any_filter;
    let show_supported = cli.supported;

    let rows: Vec<&SupportCheckResult> = project
        .support_checks
        .iter()
        .filter(|r| match &r.check {
            SupportCheck::Unsupported { .. } => show_unsupported,
            SupportCheck::Supported { warning: Some(_), .. } => show_expiring,
            SupportCheck::Supported { warning: None, .. } => show_supported,
        })
        .collect();

    if rows.is_empty() {
        return;
    }

    println!();
    for row in rows {
        display_row(row);
    }
}

fn display_row(row: &SupportCheckResult) {
    let (status, detail) = match &row.check {
        SupportCheck::Unsupported {
            duration,
            deprecation_date,
            message,
            ..
        } => (
            "unsupported".red(),
            format!(
                "{} (ended {}, {} quarter(s) ago)",
                message,
                deprecation_date.format("%Y-%m-%d"),
                quarters_ceil(*duration)
            ),
        ),
        SupportCheck::Supported {
            warning: Some(warning),
            ..
        } => (
            "expiring".yellow(),
            format!(
                "{}ends {} (in {} quarter(s))",
                warning
                    .message
                    .as_deref()
                    .map(|m| format!("{}; ", m))
                    .unwrap_or_default(),
                warning.deprecation_date.format("%Y-%m-%d"),
                quarters_ceil(warning.duration)
            ),
        ),
        SupportCheck::Supported { warning: None, message } => (
            "supported".green(),
            message.clone().unwrap_or_default(),
        ),
    };

    println!(
        "  {} {} {} {} [{}] {}",
        row.name.bold(),
        row.resolved_version,
        "→".dimmed(),
        row.latest_version,
        status,
        detail
    );
}
