use crate::domain::calendar_time::local_date;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Position of `now` within the `[start_hour, end_hour]` display window of
/// `day`, as a fraction in `0..=1`. `None` unless `day` is today in `tz` and
/// `now` falls inside the window.
pub fn current_time_position(
    day: NaiveDate,
    now: DateTime<Utc>,
    tz: Tz,
    start_hour: u32,
    end_hour: u32,
) -> Option<f64> {
    if end_hour <= start_hour || local_date(now, tz) != day {
        return None;
    }
    let seconds = f64::from(now.with_timezone(&tz).num_seconds_from_midnight());
    let window_start = f64::from(start_hour) * SECONDS_PER_HOUR;
    let window_end = f64::from(end_hour) * SECONDS_PER_HOUR;
    if seconds < window_start || seconds > window_end {
        return None;
    }
    Some((seconds - window_start) / (window_end - window_start))
}
