//! Basic example of using the audit API

use std::sync::Arc;
use supported::{
    audit_projects, categorize, AuditContext, NetworkConfig, NoopProgress, NpmProjectResolver,
    NpmRegistryClient, PolicyRules, SupportCheck,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the default policy: 4/2/1 quarters for major/minor/patch
    let rules = PolicyRules::from_config(None)?;
    let network = NetworkConfig::default();

    let client = Arc::new(NpmRegistryClient::new(&network)?);
    let ctx = AuditContext::new(rules, client, chrono::Utc::now())?;
    let resolver = Arc::new(NpmProjectResolver::new(network));

    // Audit the current project
    println!("Auditing project at: .");
    let result = audit_projects(&ctx, resolver, vec![".".into()], Arc::new(NoopProgress)).await?;

    for project in &result.projects {
        println!("\n=== {} ===", project.project_name);
        println!("Total dependencies: {}", project.support_checks.len());

        let categorized = categorize(&project.support_checks);
        println!("  Unsupported: {}", categorized.unsupported.len());
        println!("  Expiring soon: {}", categorized.expiring_soon.len());
        println!("  Supported: {}", categorized.supported.len());

        for check in &categorized.unsupported {
            if let SupportCheck::Unsupported { message, deprecation_date, .. } = &check.check {
                println!(
                    "  - {} {} (latest {}): {}, since {}",
                    check.name,
                    check.resolved_version,
                    check.latest_version,
                    message,
                    deprecation_date.format("%Y-%m-%d")
                );
            }
        }
    }

    if result.is_in_support_window {
        println!("\n✓ Every project is in the support window");
    }

    Ok(())
}
