//! Ordering and bucketing of support check results

use crate::lts::LtsGroup;
use crate::types::{SupportCheck, SupportCheckResult, ViolationType};
use std::cmp::Ordering;

/// Total order used for every reported list.
///
/// Unsupported first (by tier, then most overdue, then name), then warned
/// entries (soonest deadline first, then name), then the rest by name.
pub fn compare_results(a: &SupportCheckResult, b: &SupportCheckResult) -> Ordering {
    match (&a.check, &b.check) {
        (
            SupportCheck::Unsupported {
                violation_type: ta,
                duration: da,
                ..
            },
            SupportCheck::Unsupported {
                violation_type: tb,
                duration: db,
                ..
            },
        ) => ta
            .rank()
            .cmp(&tb.rank())
            .then_with(|| db.cmp(da))
            .then_with(|| a.name.cmp(&b.name)),
        (SupportCheck::Unsupported { .. }, SupportCheck::Supported { .. }) => Ordering::Less,
        (SupportCheck::Supported { .. }, SupportCheck::Unsupported { .. }) => Ordering::Greater,
        (SupportCheck::Supported { warning: wa, .. }, SupportCheck::Supported { warning: wb, .. }) => {
            match (wa, wb) {
                (Some(wa), Some(wb)) => wa
                    .duration
                    .cmp(&wb.duration)
                    .then_with(|| a.name.cmp(&b.name)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.name.cmp(&b.name),
            }
        }
    }
}

/// Sort results in place into report order
pub fn sort_results(results: &mut [SupportCheckResult]) {
    results.sort_by(compare_results);
}

/// Results split the way reports present them
#[derive(Debug, Clone, Default)]
pub struct Categorized {
    pub lts_runtime: Vec<SupportCheckResult>,
    pub lts_framework: Vec<SupportCheckResult>,
    pub expiring_soon: Vec<SupportCheckResult>,
    pub unsupported: Vec<SupportCheckResult>,
    pub supported: Vec<SupportCheckResult>,
}

impl Categorized {
    /// Any deadline inside the expiring-soon window, LTS lines included
    pub fn has_expiring_soon(&self) -> bool {
        !self.expiring_soon.is_empty()
            || self
                .lts_runtime
                .iter()
                .chain(&self.lts_framework)
                .any(|r| r.check.has_warning())
    }

    pub fn len(&self) -> usize {
        self.lts_runtime.len()
            + self.lts_framework.len()
            + self.expiring_soon.len()
            + self.unsupported.len()
            + self.supported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bucket already-sorted results; order within each bucket is preserved
pub fn categorize(results: &[SupportCheckResult]) -> Categorized {
    let mut categorized = Categorized::default();
    for result in results {
        let bucket = match LtsGroup::for_package(&result.name) {
            Some(LtsGroup::Runtime) => &mut categorized.lts_runtime,
            Some(LtsGroup::Framework) => &mut categorized.lts_framework,
            None if !result.is_supported() => &mut categorized.unsupported,
            None if result.check.has_warning() => &mut categorized.expiring_soon,
            None => &mut categorized.supported,
        };
        bucket.push(result.clone());
    }
    categorized
}

/// Unsupported counts per tier, for the "N of M" policy summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationSummary {
    pub major: usize,
    pub minor: usize,
    pub patch: usize,
    pub prerelease: usize,
    pub lts: usize,
    /// Results examined
    pub total: usize,
}

impl ViolationSummary {
    pub fn violated(&self) -> usize {
        self.major + self.minor + self.patch + self.prerelease + self.lts
    }

    pub fn count(&self, tier: ViolationType) -> usize {
        match tier {
            ViolationType::Major => self.major,
            ViolationType::Minor => self.minor,
            ViolationType::Patch => self.patch,
            ViolationType::Prerelease => self.prerelease,
            ViolationType::Lts => self.lts,
        }
    }
}

pub fn violation_summary(results: &[SupportCheckResult]) -> ViolationSummary {
    let mut summary = ViolationSummary {
        total: results.len(),
        ..Default::default()
    };
    for result in results {
        if let SupportCheck::Unsupported { violation_type, .. } = result.check {
            let slot = match violation_type {
                ViolationType::Major => &mut summary.major,
                ViolationType::Minor => &mut summary.minor,
                ViolationType::Patch => &mut summary.patch,
                ViolationType::Prerelease => &mut summary.prerelease,
                ViolationType::Lts => &mut summary.lts,
            };
            *slot += 1;
        }
    }
    summary
}
