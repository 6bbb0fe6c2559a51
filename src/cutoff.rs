use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Items published before the cutoff are dropped from the feed.
pub const DEFAULT_CUTOFF_WEEKS: u32 = 4;

/// Go back `window_weeks` from `now`, then truncate to midnight UTC of that day.
///
/// Saturates at the earliest representable instant instead of overflowing.
pub fn cutoff_from(now: DateTime<Utc>, window_weeks: u32) -> DateTime<Utc> {
    let shifted = Duration::try_weeks(i64::from(window_weeks))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    shifted
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Cutoff relative to the current wall clock.
pub fn compute_cutoff(window_weeks: u32) -> DateTime<Utc> {
    cutoff_from(Utc::now(), window_weeks)
}
