//! Calendar-day arithmetic in the configured time zone.
//!
//! Events are stored as UTC instants; "same day", "midnight" and "Monday" only
//! make sense relative to a zone, so every helper here takes one.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

const DST_GAP_PROBE_MINUTES: i64 = 15;
const DST_GAP_PROBE_STEPS: i64 = 12;

pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`.
///
/// When a DST transition skips local midnight the day starts at the first
/// local time that exists after the gap.
pub fn midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(value) | LocalResult::Ambiguous(value, _) => value.with_timezone(&Utc),
        LocalResult::None => (1..=DST_GAP_PROBE_STEPS)
            .find_map(|step| {
                tz.from_local_datetime(&(naive + Duration::minutes(step * DST_GAP_PROBE_MINUTES)))
                    .earliest()
            })
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

pub fn start_of_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    midnight(local_date(instant, tz), tz)
}

pub fn is_midnight(instant: DateTime<Utc>, tz: Tz) -> bool {
    start_of_day(instant, tz) == instant
}

/// Shifts a date by whole calendar days, saturating at chrono's date limits.
pub fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(if days >= 0 { NaiveDate::MAX } else { NaiveDate::MIN })
}

/// Monday of the week containing `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    shift_days(date, -i64::from(date.weekday().num_days_from_monday()))
}

pub fn calendar_days_between(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> i64 {
    (local_date(end, tz) - local_date(start, tz)).num_days()
}

/// Canonical string key of a calendar day: the day's first instant in RFC 3339
/// UTC with millisecond precision (`2026-10-12T00:00:00.000Z`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey(String);

impl DayKey {
    pub fn for_date(date: NaiveDate, tz: Tz) -> Self {
        Self(midnight(date, tz).to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn for_instant(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self::for_date(local_date(instant, tz), tz)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
