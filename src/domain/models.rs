use crate::domain::calendar_time::{local_date, midnight, shift_days, start_of_week};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.end <= self.start {
            return Err("event end must be after event start".to_string());
        }
        Ok(())
    }

    pub fn overlaps(&self, other: &EventRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub description: String,
    pub range: EventRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarDescriptor {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// The window being viewed: Monday-aligned by convention, half-open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActiveRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActiveRange {
    pub fn week_of(date: NaiveDate, tz: Tz) -> Self {
        let monday = start_of_week(date);
        Self {
            start: midnight(monday, tz),
            end: midnight(shift_days(monday, 7), tz),
        }
    }

    pub fn week_containing(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self::week_of(local_date(instant, tz), tz)
    }

    pub fn as_event_range(&self) -> EventRange {
        EventRange::new(self.start, self.end)
    }

    /// The seven local dates of the week containing `start`.
    pub fn days(&self, tz: Tz) -> Vec<NaiveDate> {
        let monday = start_of_week(local_date(self.start, tz));
        (0..7).map(|offset| shift_days(monday, offset)).collect()
    }
}

/// Form state of an event being created or edited. `id` is `None` for new events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    pub id: Option<String>,
    pub calendar_id: String,
    pub title: String,
    pub description: String,
    pub range: EventRange,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.calendar_id.trim().is_empty() {
            return Err("event calendar must be selected".to_string());
        }
        if let Some(id) = self.id.as_deref() {
            if id.trim().is_empty() {
                return Err("event id must not be empty when present".to_string());
            }
        }
        if self.range.end < self.range.start {
            return Err("Start date is after end date".to_string());
        }
        self.range.validate()
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

impl From<&CalendarEvent> for EventDraft {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            id: Some(event.id.clone()),
            calendar_id: event.calendar_id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            range: event.range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use chrono::Datelike;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn draft(start: &str, end: &str) -> EventDraft {
        EventDraft {
            id: None,
            calendar_id: "work".to_string(),
            title: "Standup".to_string(),
            description: String::new(),
            range: EventRange::new(utc(start), utc(end)),
        }
    }

    #[test]
    fn draft_with_end_before_start_is_rejected() {
        let result = draft("2026-10-12T10:00:00Z", "2026-10-12T09:00:00Z").validate();
        assert_eq!(result, Err("Start date is after end date".to_string()));
    }

    #[test]
    fn draft_with_empty_range_is_rejected() {
        let result = draft("2026-10-12T10:00:00Z", "2026-10-12T10:00:00Z").validate();
        assert!(result.is_err());
    }

    #[test]
    fn draft_requires_calendar() {
        let mut value = draft("2026-10-12T09:00:00Z", "2026-10-12T10:00:00Z");
        assert!(value.validate().is_ok());
        value.calendar_id = "  ".to_string();
        assert!(value.validate().is_err());
    }

    #[test]
    fn week_containing_is_monday_aligned_and_half_open() {
        let range = ActiveRange::week_containing(utc("2026-10-17T15:00:00Z"), Tz::UTC);
        assert_eq!(range.start, utc("2026-10-12T00:00:00Z"));
        assert_eq!(range.end, utc("2026-10-19T00:00:00Z"));

        let days = range.days(Tz::UTC);
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].weekday(), Weekday::Mon);
        assert_eq!(days[6].weekday(), Weekday::Sun);
    }

    #[test]
    fn ranges_overlap_only_when_sharing_time() {
        let morning = EventRange::new(utc("2026-10-12T09:00:00Z"), utc("2026-10-12T10:00:00Z"));
        let adjacent = EventRange::new(utc("2026-10-12T10:00:00Z"), utc("2026-10-12T11:00:00Z"));
        let inner = EventRange::new(utc("2026-10-12T09:30:00Z"), utc("2026-10-12T09:45:00Z"));
        assert!(!morning.overlaps(&adjacent));
        assert!(morning.overlaps(&inner));
    }
}
