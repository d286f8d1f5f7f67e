//! Semver-distance support evaluation
//!
//! A dependency behind latest gets a deprecation clock. The clock starts when
//! the first release that opened the observed semver gap was published (or at
//! a configured effective release date), runs for the tier's upgrade budget in
//! calendar quarters, and ends on the last day of the quarter it lands in.

use crate::calendar::{self, MONTHS_IN_QUARTER};
use crate::config::{PolicyRules, UpgradeBudget};
use crate::error::{AuditError, Result};
use crate::types::{PackageMetadata, SupportCheck, SupportCheckResult, ViolationType, Warning};
use crate::version::{coerce, diff, is_prerelease, parse_version};
use chrono::{DateTime, Utc};
use semver::Version;
use tracing::debug;

/// Version a dependency is compared against.
///
/// The `latest` dist-tag, unless prereleases are ignored and it points at
/// one: then the newest stable release, or the tag itself when every
/// published version is a prerelease.
pub fn latest_version(metadata: &PackageMetadata, ignore_prereleases: bool) -> String {
    let tagged = &metadata.dist_tags_latest;
    if !ignore_prereleases || !is_prerelease(tagged) {
        return tagged.clone();
    }

    metadata
        .version_list
        .iter()
        .filter_map(|raw| parse_version(raw).ok().map(|v| (v, raw)))
        .filter(|(v, _)| v.pre.is_empty())
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.clone())
        .unwrap_or_else(|| tagged.clone())
}

fn budget_quarters(budget: &UpgradeBudget, tier: ViolationType) -> u32 {
    match tier {
        ViolationType::Major | ViolationType::Prerelease | ViolationType::Lts => budget.major,
        ViolationType::Minor => budget.minor,
        ViolationType::Patch => budget.patch,
    }
}

/// Publish time of the first release past `current` that differs from it by
/// exactly `tier`. Prerelease candidates only count for the prerelease tier
/// or when the version compared against is itself a prerelease.
fn find_trigger_date(
    metadata: &PackageMetadata,
    current: &Version,
    latest: &Version,
    resolved_version: &str,
    tier: ViolationType,
) -> Result<DateTime<Utc>> {
    let admit_prereleases = tier == ViolationType::Prerelease || !latest.pre.is_empty();
    let mut published: Vec<(Version, DateTime<Utc>)> = metadata
        .publish_time_by_version
        .iter()
        .filter_map(|(raw, time)| parse_version(raw).ok().map(|v| (v, *time)))
        .filter(|(v, _)| v > current)
        .filter(|(v, _)| admit_prereleases || v.pre.is_empty())
        .collect();
    published.sort_by(|(a, _), (b, _)| a.cmp(b));

    if let Some((version, time)) = published.iter().find(|(v, _)| diff(current, v) == Some(tier)) {
        debug!("{} gap to {} opened at {}", tier, version, time);
        return Ok(*time);
    }

    metadata
        .publish_time_by_version
        .get(resolved_version)
        .or_else(|| metadata.publish_time_by_version.get(&current.to_string()))
        .copied()
        .ok_or_else(|| {
            AuditError::parse(format!(
                "no publish time recorded for {} or any later {} release",
                resolved_version, tier
            ))
        })
}

/// Evaluate one dependency against the semver upgrade budget in force for it
pub fn evaluate_version_support(
    metadata: &PackageMetadata,
    name: &str,
    resolved_version: &str,
    rules: &PolicyRules,
    today: DateTime<Utc>,
) -> Result<SupportCheckResult> {
    let latest_raw = latest_version(metadata, rules.primary.ignore_prereleases);
    let latest = parse_version(&latest_raw)?;
    let current = coerce(resolved_version).ok_or_else(|| {
        AuditError::version(format!("{}@{} cannot be coerced to a version", name, resolved_version))
    })?;

    let result = |check: SupportCheck| SupportCheckResult {
        name: name.to_string(),
        resolved_version: resolved_version.to_string(),
        latest_version: latest_raw.clone(),
        check,
    };

    let tier = match diff(&current, &latest) {
        Some(tier) if current < latest => tier,
        _ => return Ok(result(SupportCheck::supported())),
    };

    let budget = rules.upgrade_budget_for(name);
    let quarters = budget_quarters(&budget, tier);
    let trigger = match rules.effective_release_date_for(name) {
        Some(date) => date,
        None => find_trigger_date(metadata, &current, &latest, resolved_version, tier)?,
    };
    let deprecation_date = calendar::deprecation_date(trigger, quarters);

    debug!(
        "{}@{} vs {}: {} gap, trigger {}, deprecation {}",
        name, resolved_version, latest_raw, tier, trigger, deprecation_date
    );

    if deprecation_date <= today {
        return Ok(result(SupportCheck::Unsupported {
            violation_type: tier,
            duration: today - deprecation_date,
            deprecation_date,
            message: format!(
                "violated: {} version must be within {} months of latest",
                tier,
                u64::from(quarters) * u64::from(MONTHS_IN_QUARTER)
            ),
        }));
    }

    let remaining = deprecation_date - today;
    if calendar::is_expiring_soon(remaining) {
        return Ok(result(SupportCheck::Supported {
            warning: Some(Warning {
                duration: remaining,
                violation_type: tier,
                deprecation_date,
                message: None,
            }),
            message: None,
        }));
    }

    Ok(result(SupportCheck::supported()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomConfig, SupportConfig};
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn metadata(latest: &str, published: &[(&str, DateTime<Utc>)]) -> PackageMetadata {
        PackageMetadata {
            dist_tags_latest: latest.to_string(),
            publish_time_by_version: published
                .iter()
                .map(|(v, t)| (v.to_string(), *t))
                .collect(),
            version_list: published.iter().map(|(v, _)| v.to_string()).collect(),
        }
    }

    fn default_rules() -> PolicyRules {
        PolicyRules::from_config(None).unwrap()
    }

    #[test]
    fn test_latest_is_supported() {
        let meta = metadata("1.0.0", &[("1.0.0", at(2020, 1, 1))]);
        let result =
            evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), at(2030, 1, 1))
                .unwrap();
        assert_eq!(result.check, SupportCheck::supported());
        assert_eq!(result.latest_version, "1.0.0");
    }

    #[test]
    fn test_ahead_of_latest_is_supported() {
        let meta = metadata("1.0.0", &[("1.0.0", at(2020, 1, 1)), ("1.1.0-rc.1", at(2020, 2, 1))]);
        let result =
            evaluate_version_support(&meta, "example", "1.1.0", &default_rules(), at(2030, 1, 1))
                .unwrap();
        assert_eq!(result.check, SupportCheck::supported());
    }

    #[test]
    fn test_major_violation() {
        let meta = metadata(
            "2.0.0",
            &[
                ("1.0.0", at(1985, 9, 15)),
                ("2.0.0", at(1986, 9, 16)),
            ],
        );
        let today = Utc.with_ymd_and_hms(2021, 2, 24, 22, 56, 0).unwrap();
        let result =
            evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();

        let deprecation = at(1987, 10, 1) - Duration::milliseconds(1);
        assert_eq!(
            result.check,
            SupportCheck::Unsupported {
                violation_type: ViolationType::Major,
                duration: today - deprecation,
                deprecation_date: deprecation,
                message: "violated: major version must be within 12 months of latest".into(),
            }
        );
    }

    #[test]
    fn test_expiring_soon_warning_has_exact_duration() {
        let meta = metadata("1.1.0", &[("1.0.0", at(2020, 6, 1)), ("1.1.0", at(2021, 1, 10))]);
        let today = at(2021, 2, 24);
        let result =
            evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();

        let deprecation = at(2021, 10, 1) - Duration::milliseconds(1);
        let warning = result.check.warning().expect("expected a warning");
        assert!(result.is_supported());
        assert_eq!(warning.violation_type, ViolationType::Minor);
        assert_eq!(warning.deprecation_date, deprecation);
        assert_eq!(warning.duration, deprecation - today);
    }

    #[test]
    fn test_far_deprecation_has_no_warning() {
        let meta = metadata("2.0.0", &[("1.0.0", at(2020, 6, 1)), ("2.0.0", at(2021, 1, 10))]);
        let config = SupportConfig::builder()
            .upgrade_budget(UpgradeBudget { major: 8, minor: 2, patch: 1 })
            .build();
        let rules = PolicyRules::from_config(Some(&config)).unwrap();
        let result = evaluate_version_support(&meta, "example", "1.0.0", &rules, at(2021, 1, 11)).unwrap();
        assert_eq!(result.check, SupportCheck::supported());
    }

    #[test]
    fn test_deprecation_on_today_is_unsupported() {
        let meta = metadata("1.0.1", &[("1.0.0", at(2020, 6, 1)), ("1.0.1", at(2021, 1, 10))]);
        // patch budget 1 quarter: 2021-04-10 -> end of Q2
        let deprecation = at(2021, 7, 1) - Duration::milliseconds(1);
        let result =
            evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), deprecation)
                .unwrap();
        match result.check {
            SupportCheck::Unsupported {
                violation_type,
                duration,
                ..
            } => {
                assert_eq!(violation_type, ViolationType::Patch);
                assert_eq!(duration, Duration::zero());
            }
            other => panic!("expected unsupported, got {:?}", other),
        }
    }

    #[test]
    fn test_exactly_five_quarters_out_is_not_a_warning() {
        let meta = metadata("2.0.0", &[("1.0.0", at(2019, 6, 1)), ("2.0.0", at(2021, 1, 10))]);
        let deprecation = at(2022, 4, 1) - Duration::milliseconds(1);
        let today = deprecation - Duration::days(5 * 91);
        let result = evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();
        assert_eq!(result.check, SupportCheck::supported());

        let a_moment_later = today + Duration::milliseconds(1);
        let result =
            evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), a_moment_later)
                .unwrap();
        assert!(result.check.has_warning());
    }

    #[test]
    fn test_prerelease_latest_opens_the_gap() {
        let meta = metadata(
            "2.0.0-rc.1",
            &[("1.0.0", at(2019, 1, 1)), ("2.0.0-rc.1", at(2021, 1, 10))],
        );
        let today = at(2021, 6, 1);
        let result = evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();

        // 2021-01-10 + 4 quarters = 2022-01-10, end of Q1 2022
        let deprecation = at(2022, 4, 1) - Duration::milliseconds(1);
        let warning = result.check.warning().expect("expected a warning");
        assert!(result.is_supported());
        assert_eq!(warning.violation_type, ViolationType::Major);
        assert_eq!(warning.deprecation_date, deprecation);
    }

    #[test]
    fn test_oversized_budget_stays_supported() {
        let meta = metadata("2.0.0", &[("1.0.0", at(2019, 1, 1)), ("2.0.0", at(2021, 1, 10))]);
        let config = SupportConfig::builder()
            .upgrade_budget(UpgradeBudget { major: 2_000_000_000, minor: 2, patch: 1 })
            .build();
        let rules = PolicyRules::from_config(Some(&config)).unwrap();
        let result = evaluate_version_support(&meta, "example", "1.0.0", &rules, at(2021, 6, 1)).unwrap();
        assert_eq!(result.check, SupportCheck::supported());
    }

    #[test]
    fn test_trigger_is_first_release_opening_the_gap() {
        let meta = metadata(
            "3.0.0",
            &[
                ("1.0.0", at(2019, 1, 1)),
                ("1.1.0", at(2019, 6, 1)),
                ("2.0.0-beta.1", at(2020, 11, 1)),
                ("2.0.0", at(2021, 1, 1)),
                ("2.1.0", at(2021, 3, 1)),
                ("3.0.0", at(2021, 6, 1)),
            ],
        );
        let today = at(2023, 1, 1);
        let result = evaluate_version_support(&meta, "example", "1.1.0", &default_rules(), today).unwrap();
        // 2021-01-01 + 4 quarters = 2022-01-01, end of Q1 2022
        let deprecation = at(2022, 4, 1) - Duration::milliseconds(1);
        assert_eq!(result.check.violation_type(), Some(ViolationType::Major));
        assert_eq!(result.check.duration(), Some(today - deprecation));
    }

    #[test]
    fn test_effective_release_date_overrides_trigger() {
        let meta = metadata("2.0.0", &[("1.0.0", at(2015, 1, 1)), ("2.0.0", at(2016, 1, 1))]);
        let config = SupportConfig::builder()
            .custom(CustomConfig {
                dependencies: vec!["example".into()],
                upgrade_budget: None,
                effective_release_date: Some("2021-01-15".into()),
            })
            .build();
        let rules = PolicyRules::from_config(Some(&config)).unwrap();
        let result = evaluate_version_support(&meta, "example", "1.0.0", &rules, at(2021, 6, 1)).unwrap();
        assert!(result.is_supported());
        assert_eq!(
            result.check.warning().unwrap().deprecation_date,
            at(2022, 4, 1) - Duration::milliseconds(1)
        );
    }

    #[test]
    fn test_ignores_prerelease_latest_when_configured() {
        let meta = metadata(
            "2.0.0-beta.16",
            &[
                ("0.5.0", at(2019, 1, 1)),
                ("1.0.0", at(2020, 1, 1)),
                ("2.0.0-beta.16", at(2020, 2, 1)),
            ],
        );
        let config = SupportConfig::builder().ignore_prereleases(true).build();
        let rules = PolicyRules::from_config(Some(&config)).unwrap();
        let result = evaluate_version_support(&meta, "example", "1.0.0", &rules, at(2030, 1, 1)).unwrap();
        assert_eq!(result.latest_version, "1.0.0");
        assert_eq!(result.check, SupportCheck::supported());
    }

    #[test]
    fn test_all_prereleases_fall_back_to_tagged_latest() {
        let meta = metadata(
            "2.0.0-beta.2",
            &[("2.0.0-beta.1", at(2020, 1, 1)), ("2.0.0-beta.2", at(2020, 2, 1))],
        );
        assert_eq!(latest_version(&meta, true), "2.0.0-beta.2");
    }

    #[test]
    fn test_range_resolved_version_is_coerced() {
        let meta = metadata("1.2.0", &[("1.2.0", at(2020, 1, 1))]);
        let result =
            evaluate_version_support(&meta, "example", "^1.2", &default_rules(), at(2030, 1, 1))
                .unwrap();
        assert!(result.is_supported());
        assert_eq!(result.resolved_version, "^1.2");
    }

    #[test]
    fn test_uncoercible_version_is_an_error() {
        let meta = metadata("1.0.0", &[("1.0.0", at(2020, 1, 1))]);
        let err = evaluate_version_support(&meta, "example", "workspace:*", &default_rules(), at(2030, 1, 1))
            .unwrap_err();
        assert!(matches!(err, AuditError::VersionParse(_)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let meta = metadata("1.1.0", &[("1.0.0", at(2020, 6, 1)), ("1.1.0", at(2021, 1, 10))]);
        let today = at(2021, 2, 24);
        let first = evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();
        let second = evaluate_version_support(&meta, "example", "1.0.0", &default_rules(), today).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
