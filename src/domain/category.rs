use crate::domain::calendar_time::{calendar_days_between, is_midnight, local_date, shift_days};
use crate::domain::models::EventRange;
use chrono::{Datelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Temporal shape of an event, deciding which derived index holds it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Timed event inside a single calendar day.
    Time,
    /// Date-aligned, exactly one calendar day.
    Day,
    /// Date-aligned, Monday to Monday.
    Week,
    /// Anything spanning more than one day that is not a full aligned week.
    Multi,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Day => "day",
            Self::Week => "week",
            Self::Multi => "multi",
        }
    }
}

/// Classifies a range. Depends only on the range and the zone that defines days.
pub fn categorize(range: &EventRange, tz: Tz) -> Category {
    let aligned = is_midnight(range.start, tz) && is_midnight(range.end, tz);
    let days = calendar_days_between(range.start, range.end, tz);

    if !aligned {
        let start_day = local_date(range.start, tz);
        let ends_at_next_midnight =
            is_midnight(range.end, tz) && local_date(range.end, tz) == shift_days(start_day, 1);
        if days <= 0 || ends_at_next_midnight {
            return Category::Time;
        }
        return Category::Multi;
    }

    match days {
        days if days <= 0 => Category::Time,
        1 => Category::Day,
        7 if local_date(range.start, tz).weekday() == Weekday::Mon => Category::Week,
        _ => Category::Multi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar_time::midnight;
    use chrono::{DateTime, Duration, NaiveDate, Utc};
    use proptest::prelude::*;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn range(start: &str, end: &str) -> EventRange {
        EventRange::new(utc(start), utc(end))
    }

    #[test]
    fn timed_event_within_a_day_is_time() {
        let value = range("2026-10-12T09:00:00Z", "2026-10-12T10:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Time);
    }

    #[test]
    fn timed_event_ending_at_next_midnight_is_time() {
        let value = range("2026-10-12T22:00:00Z", "2026-10-13T00:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Time);
    }

    #[test]
    fn timed_event_crossing_midnight_is_multi() {
        let value = range("2026-10-12T22:00:00Z", "2026-10-13T02:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Multi);
    }

    #[test]
    fn single_aligned_day_is_day() {
        let value = range("2026-10-14T00:00:00Z", "2026-10-15T00:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Day);
    }

    #[test]
    fn two_aligned_days_are_multi() {
        let value = range("2026-10-14T00:00:00Z", "2026-10-16T00:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Multi);
    }

    #[test]
    fn monday_aligned_week_is_week() {
        let value = range("2026-10-12T00:00:00Z", "2026-10-19T00:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Week);
    }

    #[test]
    fn seven_days_not_starting_monday_is_multi() {
        let value = range("2026-10-13T00:00:00Z", "2026-10-20T00:00:00Z");
        assert_eq!(categorize(&value, Tz::UTC), Category::Multi);
    }

    #[test]
    fn alignment_is_judged_in_configured_zone() {
        let tz: Tz = "America/New_York".parse().expect("known zone");
        // Midnight UTC is 20:00 the previous evening in New York.
        let value = range("2026-10-14T00:00:00Z", "2026-10-15T00:00:00Z");
        assert_eq!(categorize(&value, tz), Category::Multi);

        let local_day = EventRange::new(
            midnight(NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date"), tz),
            midnight(NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date"), tz),
        );
        assert_eq!(categorize(&local_day, tz), Category::Day);
    }

    proptest! {
        #[test]
        fn aligned_weeks_follow_the_monday_rule(day_offset in 0i64..3650) {
            let base = NaiveDate::from_ymd_opt(2020, 1, 6).expect("valid date") + Duration::days(day_offset);
            let start = midnight(base, Tz::UTC);
            let value = EventRange::new(start, start + Duration::days(7));
            let expected = if base.weekday() == Weekday::Mon { Category::Week } else { Category::Multi };
            prop_assert_eq!(categorize(&value, Tz::UTC), expected);
        }

        #[test]
        fn categorize_is_deterministic(start_minutes in 0i64..200_000, length_minutes in 1i64..20_000) {
            let origin = utc("2026-01-05T00:00:00Z");
            let start = origin + Duration::minutes(start_minutes);
            let value = EventRange::new(start, start + Duration::minutes(length_minutes));
            let first = categorize(&value, Tz::UTC);
            prop_assert_eq!(first, categorize(&value, Tz::UTC));
            if length_minutes % (24 * 60) == 0 && start_minutes % (24 * 60) == 0 {
                prop_assert_ne!(first, Category::Time);
            }
        }
    }
}
