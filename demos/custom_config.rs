//! Example showing custom configuration

use std::sync::Arc;
use supported::{
    audit_projects, parse_reference_date, violation_summary, AuditContext, CustomConfig,
    NetworkConfig, NoopProgress, NpmProjectResolver, NpmRegistryClient, PolicyRules, SupportConfig,
    UpgradeBudget, ViolationType,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create custom configuration
    let config = SupportConfig::builder()
        .ignore_prereleases(true)
        .upgrade_budget(UpgradeBudget {
            major: 6, // Allow a year and a half behind a major
            minor: 2,
            patch: 1,
        })
        .custom(CustomConfig {
            dependencies: vec!["typescript".to_string()],
            upgrade_budget: Some(UpgradeBudget { major: 2, minor: 1, patch: 1 }),
            effective_release_date: None,
        })
        .ignore_dependency("some-dev-tool")
        .build();
    let rules = PolicyRules::from_config(Some(&config))?;

    // Evaluate as of three months ago
    let today = parse_reference_date("-3m", chrono::Utc::now())?;

    let network = NetworkConfig {
        max_retries: 5,
        ..NetworkConfig::default()
    };
    let client = Arc::new(NpmRegistryClient::new(&network)?);
    let ctx = AuditContext::new(rules, client, today)?.with_workers(4);
    let resolver = Arc::new(NpmProjectResolver::new(network));

    println!("Auditing with custom configuration as of {}...\n", today.format("%Y-%m-%d"));
    let result = audit_projects(&ctx, resolver, vec![".".into()], Arc::new(NoopProgress)).await?;

    for project in &result.projects {
        let summary = violation_summary(&project.support_checks);
        println!("=== {} ===", project.project_name);
        for tier in [ViolationType::Major, ViolationType::Minor, ViolationType::Patch] {
            println!("  {} violations: {} of {}", tier, summary.count(tier), summary.total);
        }
        println!("  In support window: {}", project.is_in_support_window);
    }

    Ok(())
}
