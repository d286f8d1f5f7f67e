//! Quarter arithmetic
//!
//! A quarter shows up in two forms: a fixed 91-day span used for the
//! expiring-soon threshold and for display rounding, and a three calendar
//! month step used when pushing a trigger date out to its deprecation date.
//! The two are deliberately kept apart.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};

/// Days in the fixed-length quarter
pub const DAYS_IN_QUARTER: i64 = 91;

/// Calendar months in one budget quarter
pub const MONTHS_IN_QUARTER: u32 = 3;

/// Deprecations closer than this many fixed quarters are flagged
pub const EXPIRING_SOON_QUARTERS: i64 = 5;

/// The fixed 91-day quarter
pub fn quarter() -> Duration {
    Duration::days(DAYS_IN_QUARTER)
}

/// True when a positive time-to-deprecation falls strictly inside the
/// expiring-soon window
pub fn is_expiring_soon(remaining: Duration) -> bool {
    remaining > Duration::zero() && remaining < quarter() * EXPIRING_SOON_QUARTERS as i32
}

/// Round a duration up to whole fixed quarters, for display
pub fn quarters_ceil(duration: Duration) -> i64 {
    let millis = duration.num_milliseconds();
    let per_quarter = quarter().num_milliseconds();
    (millis + per_quarter - 1).div_euclid(per_quarter)
}

/// Last millisecond of the calendar quarter containing `date` (UTC)
pub fn end_of_quarter(date: DateTime<Utc>) -> DateTime<Utc> {
    let first_month = (date.month0() / 3) * 3 + 1;
    let (year, month) = if first_month == 10 {
        (date.year() + 1, 1)
    } else {
        (date.year(), first_month + 3)
    };
    let next_quarter = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(date);
    next_quarter - Duration::milliseconds(1)
}

/// Advance a trigger date by whole budget quarters of calendar months, then
/// snap to the end of the quarter it lands in. Budgets past the
/// representable range saturate to the latest representable instant.
pub fn deprecation_date(trigger: DateTime<Utc>, budget_quarters: u32) -> DateTime<Utc> {
    budget_quarters
        .checked_mul(MONTHS_IN_QUARTER)
        .and_then(|months| trigger.checked_add_months(Months::new(months)))
        .map(end_of_quarter)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
