use crate::domain::calendar_time::{is_midnight, local_date, midnight};
use crate::domain::models::{CalendarEvent, EventDraft, EventRange};
use crate::infrastructure::calendar_gateway::EventListing;
use crate::infrastructure::error::CalendarError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MISSING_ID: &str = "<missing id>";

/// `start`/`end` of a provider event: `date` for all-day events, `dateTime` otherwise.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct GoogleEventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub start: GoogleEventTime,
    #[serde(default)]
    pub end: GoogleEventTime,
}

impl GoogleCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case("cancelled"))
            .unwrap_or(false)
    }
}

pub fn decode_event(
    event: &GoogleCalendarEvent,
    calendar_id: &str,
    tz: Tz,
) -> Result<CalendarEvent, CalendarError> {
    let id = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CalendarError::invalid_event(MISSING_ID, "id", ""))?;

    let start = parse_event_time(&event.start, id, "start", tz)?;
    let end = parse_event_time(&event.end, id, "end", tz)?;
    if end < start {
        return Err(CalendarError::invalid_event(id, "end", end.to_rfc3339()));
    }

    Ok(CalendarEvent {
        id: id.to_string(),
        calendar_id: calendar_id.to_string(),
        title: event.summary.clone().unwrap_or_default(),
        description: event.description.clone().unwrap_or_default(),
        range: EventRange::new(start, end),
    })
}

/// Decodes a calendar's items, dropping cancelled ones. Items that fail to
/// decode are reported in `invalid` and logged; the rest are ordered by start.
pub fn decode_listing(
    items: impl IntoIterator<Item = GoogleCalendarEvent>,
    calendar_id: &str,
    tz: Tz,
) -> EventListing {
    let mut listing = EventListing::default();
    for item in items {
        if item.is_cancelled() {
            continue;
        }
        match decode_event(&item, calendar_id, tz) {
            Ok(event) => listing.events.push(event),
            Err(error) => {
                warn!(calendar_id, error = %error, "skipping undecodable event");
                listing.invalid.push(error);
            }
        }
    }
    listing
        .events
        .sort_by(|left, right| left.range.start.cmp(&right.range.start));
    listing
}

/// Midnight-aligned drafts are written back as all-day dates.
pub fn encode_draft(draft: &EventDraft, tz: Tz) -> GoogleCalendarEvent {
    let all_day = is_midnight(draft.range.start, tz) && is_midnight(draft.range.end, tz);
    let encode_time = |instant: DateTime<Utc>| {
        if all_day {
            GoogleEventTime {
                date_time: None,
                date: Some(local_date(instant, tz).format(DATE_FORMAT).to_string()),
                time_zone: None,
            }
        } else {
            GoogleEventTime {
                date_time: Some(instant.to_rfc3339()),
                date: None,
                time_zone: Some(tz.name().to_string()),
            }
        }
    };

    GoogleCalendarEvent {
        id: draft.id.clone(),
        summary: Some(draft.title.clone()),
        description: Some(draft.description.clone()),
        status: None,
        start: encode_time(draft.range.start),
        end: encode_time(draft.range.end),
    }
}

fn parse_event_time(
    value: &GoogleEventTime,
    event_id: &str,
    field_name: &str,
    tz: Tz,
) -> Result<DateTime<Utc>, CalendarError> {
    if let Some(raw) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(raw.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| CalendarError::invalid_event(event_id, format!("{field_name}.dateTime"), raw));
    }
    if let Some(raw) = value.date.as_deref() {
        return NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map(|date| midnight(date, tz))
            .map_err(|_| CalendarError::invalid_event(event_id, format!("{field_name}.date"), raw));
    }
    Err(CalendarError::invalid_event(event_id, field_name, ""))
}
