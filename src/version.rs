//! npm-style version ranges on top of `semver::Version`
//!
//! Registry ranges (`^1.2.3`, `~1.2`, `14.*`, `>= 15`, `1.x || 2.x`,
//! `1.2 - 2.3.4`) are normalised to a union of half-open intervals so they
//! can be tested for membership and for overlap with other ranges.

use crate::error::{AuditError, Result};
use crate::types::ViolationType;
use semver::{BuildMetadata, Prerelease, Version};
use std::cmp::Ordering;

/// A union of version intervals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    intervals: Vec<Interval>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A possibly incomplete version such as `14`, `3.20` or `1.x`
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl VersionRange {
    /// Parse a range expression
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim().to_string();
        let mut intervals = Vec::new();

        for alternative in raw.split("||") {
            if let Some(interval) = parse_alternative(alternative.trim())
                .map_err(|e| AuditError::version(format!("'{}': {}", raw, e)))?
            {
                intervals.push(interval);
            }
        }

        if intervals.is_empty() {
            return Err(AuditError::version(format!("'{}' matches no versions", raw)));
        }

        Ok(Self { raw, intervals })
    }

    /// Check if a version falls inside the range
    pub fn satisfies(&self, version: &Version) -> bool {
        self.intervals.iter().any(|i| i.contains(version))
    }

    /// Check if any version could satisfy both ranges
    pub fn intersects(&self, other: &VersionRange) -> bool {
        self.intervals
            .iter()
            .any(|a| other.intervals.iter().any(|b| a.intersect(b).is_some()))
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Interval {
    fn any() -> Self {
        Self {
            lower: None,
            upper: None,
        }
    }

    fn contains(&self, version: &Version) -> bool {
        let lower_ok = match &self.lower {
            None => true,
            Some(b) if b.inclusive => version >= &b.version,
            Some(b) => version > &b.version,
        };
        let upper_ok = match &self.upper {
            None => true,
            Some(b) if b.inclusive => version <= &b.version,
            Some(b) => version < &b.version,
        };
        lower_ok && upper_ok
    }

    fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lower = match (&self.lower, &other.lower) {
            (None, None) => None,
            (Some(b), None) | (None, Some(b)) => Some(b.clone()),
            (Some(l), Some(r)) => Some(max_lower_bound(l, r)),
        };
        let upper = match (&self.upper, &other.upper) {
            (None, None) => None,
            (Some(b), None) | (None, Some(b)) => Some(b.clone()),
            (Some(l), Some(r)) => Some(min_upper_bound(l, r)),
        };

        if let (Some(low), Some(high)) = (&lower, &upper) {
            match low.version.cmp(&high.version) {
                Ordering::Greater => return None,
                Ordering::Equal if !(low.inclusive && high.inclusive) => return None,
                _ => {}
            }
        }

        Some(Interval { lower, upper })
    }
}

fn max_lower_bound(left: &Bound, right: &Bound) -> Bound {
    match left.version.cmp(&right.version) {
        Ordering::Greater => left.clone(),
        Ordering::Less => right.clone(),
        Ordering::Equal => Bound {
            version: left.version.clone(),
            inclusive: left.inclusive && right.inclusive,
        },
    }
}

fn min_upper_bound(left: &Bound, right: &Bound) -> Bound {
    match left.version.cmp(&right.version) {
        Ordering::Less => left.clone(),
        Ordering::Greater => right.clone(),
        Ordering::Equal => Bound {
            version: left.version.clone(),
            inclusive: left.inclusive && right.inclusive,
        },
    }
}

fn inclusive(version: Version) -> Option<Bound> {
    Some(Bound {
        version,
        inclusive: true,
    })
}

fn exclusive(version: Version) -> Option<Bound> {
    Some(Bound {
        version,
        inclusive: false,
    })
}

/// One `||` alternative: a hyphen range or a space separated comparator set.
/// Returns `None` when the comparators contradict each other.
fn parse_alternative(s: &str) -> std::result::Result<Option<Interval>, String> {
    if s.is_empty() {
        return Ok(Some(Interval::any()));
    }

    if let Some((from, to)) = s.split_once(" - ") {
        let from = Partial::parse(from.trim())?;
        let to = Partial::parse(to.trim())?;
        let lower = from.floor().and_then(inclusive);
        let upper = if to.is_complete() {
            to.floor().and_then(inclusive)
        } else {
            to.ceiling()?.and_then(exclusive)
        };
        return Ok(Some(Interval { lower, upper }));
    }

    // Glue a bare operator onto the version that follows it: `>= 15`
    let mut comparators: Vec<String> = Vec::new();
    let mut pending = String::new();
    for token in s.split_whitespace() {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending.push_str(token);
        } else {
            comparators.push(format!("{}{}", pending, token));
            pending.clear();
        }
    }
    if !pending.is_empty() {
        return Err(format!("dangling operator '{}'", pending));
    }

    let mut interval = Interval::any();
    for comparator in &comparators {
        match interval.intersect(&parse_comparator(comparator)?) {
            Some(narrowed) => interval = narrowed,
            None => return Ok(None),
        }
    }
    Ok(Some(interval))
}

fn parse_comparator(s: &str) -> std::result::Result<Interval, String> {
    let (op, rest) = split_operator(s);
    let partial = Partial::parse(rest)?;

    let Some(floor) = partial.floor() else {
        // `*`, `x`, `>=*` and friends
        return Ok(match op {
            "<" | ">" => Interval {
                lower: None,
                upper: exclusive(Version::new(0, 0, 0)),
            },
            _ => Interval::any(),
        });
    };

    let interval = match op {
        ">=" => Interval {
            lower: inclusive(floor),
            upper: None,
        },
        ">" if partial.is_complete() => Interval {
            lower: exclusive(floor),
            upper: None,
        },
        ">" => Interval {
            lower: partial.ceiling()?.and_then(inclusive),
            upper: None,
        },
        "<" => Interval {
            lower: None,
            upper: exclusive(floor),
        },
        "<=" if partial.is_complete() => Interval {
            lower: None,
            upper: inclusive(floor),
        },
        "<=" => Interval {
            lower: None,
            upper: partial.ceiling()?.and_then(exclusive),
        },
        "^" => Interval {
            upper: caret_ceiling(&partial)?.and_then(exclusive),
            lower: inclusive(floor),
        },
        "~" | "~>" => Interval {
            upper: tilde_ceiling(&partial)?.and_then(exclusive),
            lower: inclusive(floor),
        },
        _ if partial.is_complete() => Interval {
            lower: inclusive(floor.clone()),
            upper: inclusive(floor),
        },
        _ => Interval {
            upper: partial.ceiling()?.and_then(exclusive),
            lower: inclusive(floor),
        },
    };
    Ok(interval)
}

fn split_operator(s: &str) -> (&str, &str) {
    for op in [">=", "<=", "~>", ">", "<", "=", "^", "~"] {
        if let Some(rest) = s.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", s.trim())
}

fn bump(component: u64) -> std::result::Result<u64, String> {
    component
        .checked_add(1)
        .ok_or_else(|| format!("component {} is too large", component))
}

fn caret_ceiling(p: &Partial) -> std::result::Result<Option<Version>, String> {
    let Some(major) = p.major else {
        return Ok(None);
    };
    let ceiling = match (major, p.minor, p.patch) {
        (0, Some(0), Some(patch)) => Version::new(0, 0, bump(patch)?),
        (0, Some(minor), _) => Version::new(0, bump(minor)?, 0),
        (major, _, _) => Version::new(bump(major)?, 0, 0),
    };
    Ok(Some(ceiling))
}

fn tilde_ceiling(p: &Partial) -> std::result::Result<Option<Version>, String> {
    let Some(major) = p.major else {
        return Ok(None);
    };
    let ceiling = match p.minor {
        Some(minor) => Version::new(major, bump(minor)?, 0),
        None => Version::new(bump(major)?, 0, 0),
    };
    Ok(Some(ceiling))
}

impl Partial {
    fn parse(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim().trim_start_matches(['v', '=']);
        let s = s.split('+').next().unwrap_or_default();
        let (numbers, pre) = match s.split_once('-') {
            Some((numbers, pre)) => (
                numbers,
                Prerelease::new(pre).map_err(|e| format!("bad prerelease '{}': {}", pre, e))?,
            ),
            None => (s, Prerelease::EMPTY),
        };

        let mut parts = [None, None, None];
        let mut wildcard = false;
        for (idx, part) in numbers.split('.').enumerate() {
            if idx > 2 {
                return Err(format!("too many components in '{}'", s));
            }
            if matches!(part, "x" | "X" | "*" | "") {
                wildcard = true;
                continue;
            }
            if wildcard {
                return Err(format!("number after wildcard in '{}'", s));
            }
            parts[idx] = Some(
                part.parse::<u64>()
                    .map_err(|_| format!("'{}' is not a version", s))?,
            );
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            pre,
        })
    }

    fn is_complete(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }

    /// Smallest version matched, missing components filled with zero
    fn floor(&self) -> Option<Version> {
        let mut version = Version::new(self.major?, self.minor.unwrap_or(0), self.patch.unwrap_or(0));
        if self.is_complete() {
            version.pre = self.pre.clone();
        }
        Some(version)
    }

    /// First version past the partial: `1` -> `2.0.0`, `1.2` -> `1.3.0`
    fn ceiling(&self) -> std::result::Result<Option<Version>, String> {
        let Some(major) = self.major else {
            return Ok(None);
        };
        let ceiling = match (self.minor, self.patch) {
            (None, _) => Version::new(bump(major)?, 0, 0),
            (Some(minor), None) => Version::new(major, bump(minor)?, 0),
            (Some(minor), Some(patch)) => Version::new(major, minor, bump(patch)?),
        };
        Ok(Some(ceiling))
    }
}

/// Parse a concrete version, tolerating a leading `v` or `=`
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim().trim_start_matches(['v', '=']);
    Version::parse(trimmed).map_err(|e| AuditError::version(format!("'{}': {}", input, e)))
}

/// True when the string is a valid version carrying prerelease identifiers
pub fn is_prerelease(input: &str) -> bool {
    parse_version(input).map(|v| !v.pre.is_empty()).unwrap_or(false)
}

/// Pull a representative `major.minor.patch` out of a version or range
/// string: `^1.2` -> `1.2.0`, `~> 3` -> `3.0.0`, `v2.4.1-beta` -> `2.4.1`.
/// Returns `None` when the input holds no number at all (git/file links).
pub fn coerce(input: &str) -> Option<Version> {
    let bytes = input.as_bytes();
    let mut idx = 0;

    while idx < bytes.len() {
        if !bytes[idx].is_ascii_digit() {
            idx += 1;
            continue;
        }

        let mut numbers = Vec::with_capacity(3);
        let mut pos = idx;
        loop {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos - start > 16 {
                break;
            }
            numbers.push(input[start..pos].parse::<u64>().ok()?);
            if numbers.len() == 3
                || pos + 1 >= bytes.len()
                || bytes[pos] != b'.'
                || !bytes[pos + 1].is_ascii_digit()
            {
                break;
            }
            pos += 1;
        }

        if !numbers.is_empty() {
            return Some(Version {
                major: numbers[0],
                minor: numbers.get(1).copied().unwrap_or(0),
                patch: numbers.get(2).copied().unwrap_or(0),
                pre: Prerelease::EMPTY,
                build: BuildMetadata::EMPTY,
            });
        }

        // Skip the rest of an over-long number before trying again
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
    }

    None
}

/// Semver tier separating two versions, `None` when they are equal.
///
/// Prerelease-flavoured tiers (`premajor`, `preminor`, `prepatch`) collapse
/// onto their base tier; a gap only in prerelease identifiers is `Prerelease`.
pub fn diff(a: &Version, b: &Version) -> Option<ViolationType> {
    if a == b {
        return None;
    }
    if a.major != b.major {
        Some(ViolationType::Major)
    } else if a.minor != b.minor {
        Some(ViolationType::Minor)
    } else if a.patch != b.patch {
        Some(ViolationType::Patch)
    } else if a.pre != b.pre {
        Some(ViolationType::Prerelease)
    } else {
        // build metadata only
        None
    }
}
