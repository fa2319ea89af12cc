use crate::domain::models::{CalendarEvent, EventDraft};
use crate::infrastructure::error::CalendarError;
use crate::infrastructure::event_mapper::{GoogleCalendarEvent, decode_event, decode_listing, encode_draft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use tracing::debug;
use url::Url;

const CALENDAR_LIST_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3/users/me/calendarList";
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSummary {
    pub id: String,
    pub name: String,
}

/// Events overlapping `[start, end)` in one calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEventsRequest {
    pub calendar_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Events of one calendar. Items the provider sent but that could not be
/// decoded are kept in `invalid` as `InvalidEvent` errors; they never reach
/// `events`.
#[derive(Debug, Default)]
pub struct EventListing {
    pub events: Vec<CalendarEvent>,
    pub invalid: Vec<CalendarError>,
}

/// Request/response access to the remote calendar provider.
///
/// `list_events` returns single (non-recurring) instances ordered by start time,
/// excluding deleted events. One malformed item does not fail the listing.
/// `upsert_event` creates when the draft has no id and
/// returns the provider's canonical event.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, CalendarError>;

    async fn list_events(
        &self,
        request: ListEventsRequest,
    ) -> Result<EventListing, CalendarError>;

    async fn upsert_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, event: &CalendarEvent) -> Result<(), CalendarError>;
}

/// Google Calendar v3 over HTTPS. The access token is obtained elsewhere.
#[derive(Debug, Clone)]
pub struct ReqwestCalendarGateway {
    client: Client,
    access_token: String,
    tz: Tz,
}

impl ReqwestCalendarGateway {
    pub fn new(access_token: impl Into<String>, tz: Tz) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            tz,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), CalendarError> {
        if value.trim().is_empty() {
            return Err(CalendarError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// Surfaces the provider's `error.message` verbatim when the body carries one.
    fn http_error(status: reqwest::StatusCode, body: &str) -> CalendarError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error)
            .and_then(|detail| detail.message)
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("calendar api error: http {}", status.as_u16())
                } else {
                    format!("calendar api error: http {}; body={body}", status.as_u16())
                }
            });
        CalendarError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    fn events_endpoint(calendar_id: &str) -> Result<Url, CalendarError> {
        let mut url = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| CalendarError::InvalidConfig(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                CalendarError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    fn event_endpoint(calendar_id: &str, event_id: &str) -> Result<Url, CalendarError> {
        let mut url = Self::events_endpoint(calendar_id)?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                CalendarError::InvalidConfig("calendar events URL cannot be a base".to_string())
            })?;
            segments.push(event_id);
        }
        Ok(url)
    }

    async fn read_body(
        response: reqwest::Response,
        action: &str,
    ) -> Result<String, CalendarError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CalendarError::Network(format!("failed reading {action} response: {error}")))?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(body)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CalendarListResponse {
    items: Option<Vec<CalendarListItem>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CalendarListItem {
    id: String,
    summary: Option<String>,
    #[serde(rename = "summaryOverride")]
    summary_override: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl CalendarGateway for ReqwestCalendarGateway {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, CalendarError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;

        let mut page_token: Option<String> = None;
        let mut calendars = Vec::new();
        loop {
            let mut req = self
                .client
                .get(CALENDAR_LIST_ENDPOINT)
                .query(&[("maxResults", "250")])
                .bearer_auth(&self.access_token);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req
                .send()
                .await
                .map_err(|error| CalendarError::Network(format!("listing calendars: {error}")))?;
            let body = Self::read_body(response, "calendar list").await?;
            let parsed: CalendarListResponse = serde_json::from_str(&body)?;

            calendars.extend(parsed.items.unwrap_or_default().into_iter().filter_map(|item| {
                let id = item.id.trim();
                if id.is_empty() {
                    return None;
                }
                let name = item
                    .summary_override
                    .or(item.summary)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| id.to_string());
                Some(CalendarSummary {
                    id: id.to_string(),
                    name,
                })
            }));

            match parsed.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(count = calendars.len(), "listed calendars");
        Ok(calendars)
    }

    async fn list_events(
        &self,
        request: ListEventsRequest,
    ) -> Result<EventListing, CalendarError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;
        Self::ensure_non_empty(&request.calendar_id, "calendar id")?;

        let endpoint = Self::events_endpoint(&request.calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut items = Vec::new();

        loop {
            let mut req = self
                .client
                .get(endpoint.clone())
                .bearer_auth(&self.access_token)
                .query(&[
                    ("showDeleted", "false"),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", "2500"),
                ])
                .query(&[
                    ("timeMin", request.start.to_rfc3339()),
                    ("timeMax", request.end.to_rfc3339()),
                ]);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req.send().await.map_err(|error| {
                CalendarError::Network(format!("listing events of {}: {error}", request.calendar_id))
            })?;
            let body = Self::read_body(response, "events list").await?;
            let parsed: EventsPageResponse = serde_json::from_str(&body)?;

            items.extend(parsed.items.unwrap_or_default());

            match parsed.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(decode_listing(items, &request.calendar_id, self.tz))
    }

    async fn upsert_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;
        Self::ensure_non_empty(&draft.calendar_id, "calendar id")?;

        let payload = encode_draft(draft, self.tz);
        let req = match draft.id.as_deref() {
            Some(event_id) => {
                Self::ensure_non_empty(event_id, "event id")?;
                self.client
                    .put(Self::event_endpoint(&draft.calendar_id, event_id)?)
            }
            None => self.client.post(Self::events_endpoint(&draft.calendar_id)?),
        };

        let response = req
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|error| CalendarError::Network(format!("saving event: {error}")))?;
        let body = Self::read_body(response, "event save").await?;
        let parsed: GoogleCalendarEvent = serde_json::from_str(&body)?;
        decode_event(&parsed, &draft.calendar_id, self.tz)
    }

    async fn delete_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        Self::ensure_non_empty(&self.access_token, "access token")?;
        Self::ensure_non_empty(&event.calendar_id, "calendar id")?;
        Self::ensure_non_empty(&event.id, "event id")?;

        let response = self
            .client
            .delete(Self::event_endpoint(&event.calendar_id, &event.id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|error| CalendarError::Network(format!("deleting event: {error}")))?;
        Self::read_body(response, "event delete").await?;
        Ok(())
    }
}
