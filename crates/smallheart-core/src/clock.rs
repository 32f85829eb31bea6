//! Wall-clock day-window math.
//!
//! The daily scheduler realigns to local midnight. The window is derived,
//! never stored: callers must recompute it after any wait, because the
//! process may resume after a long real-time gap (host suspend).

use std::time::Duration;

use chrono::{DateTime, Local, Timelike};

/// Seconds remaining until the end of the current local day.
///
/// Matches the platform's daily reset boundary: the distance to 23:59:59
/// plus one second, so the result is always in `(0, 86400]` and strictly
/// decreasing as real time advances within a day.
pub fn seconds_until_day_end() -> Duration {
    seconds_until_day_end_at(Local::now())
}

/// [`seconds_until_day_end`] for an explicit instant.
pub fn seconds_until_day_end_at(now: DateTime<Local>) -> Duration {
    let end = now
        .with_hour(23)
        .and_then(|t| t.with_minute(59))
        .and_then(|t| t.with_second(59))
        .and_then(|t| t.with_nanosecond(0));
    let Some(end) = end else {
        // 23:59:59 can be unrepresentable around exotic DST transitions;
        // fall back to the shortest positive window so the caller realigns
        // on the next iteration.
        return Duration::from_secs(1);
    };
    // +1 carries the window past 23:59:59 to the actual day boundary.
    let secs = (end - now).num_seconds() + 1;
    Duration::from_secs(u64::try_from(secs.max(1)).unwrap_or(1))
}
