use crate::domain::models::{CalendarEvent, EventDraft, EventRange};
use crate::infrastructure::calendar_gateway::{
    CalendarGateway, CalendarSummary, EventListing, ListEventsRequest,
};
use crate::infrastructure::error::CalendarError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-process gateway: assigns ids on create, filters by range and orders by
/// start like the real provider. Failures can be injected per calendar.
#[derive(Debug, Default)]
pub struct InMemoryCalendarGateway {
    state: Mutex<GatewayState>,
    list_event_calls: AtomicUsize,
}

#[derive(Debug, Default)]
struct GatewayState {
    calendars: Vec<CalendarSummary>,
    events: HashMap<String, Vec<CalendarEvent>>,
    failing_calendars: HashSet<String>,
    rejection: Option<String>,
    next_id: u64,
}

impl InMemoryCalendarGateway {
    pub fn with_calendars(calendars: Vec<CalendarSummary>) -> Self {
        Self {
            state: Mutex::new(GatewayState {
                calendars,
                ..GatewayState::default()
            }),
            list_event_calls: AtomicUsize::new(0),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, GatewayState>, CalendarError> {
        self.state
            .lock()
            .map_err(|error| CalendarError::LockPoisoned(format!("in-memory gateway: {error}")))
    }

    /// Stores `event` as the provider would, replacing any event with the same id.
    pub fn put_event(&self, event: CalendarEvent) -> Result<(), CalendarError> {
        let mut state = self.lock_state()?;
        let events = state.events.entry(event.calendar_id.clone()).or_default();
        events.retain(|existing| existing.id != event.id);
        events.push(event);
        Ok(())
    }

    pub fn remove_event(&self, calendar_id: &str, event_id: &str) -> Result<bool, CalendarError> {
        let mut state = self.lock_state()?;
        let Some(events) = state.events.get_mut(calendar_id) else {
            return Ok(false);
        };
        let before = events.len();
        events.retain(|existing| existing.id != event_id);
        Ok(events.len() != before)
    }

    /// Makes `list_events` fail for `calendar_id` until cleared.
    pub fn set_calendar_failing(&self, calendar_id: &str, failing: bool) -> Result<(), CalendarError> {
        let mut state = self.lock_state()?;
        if failing {
            state.failing_calendars.insert(calendar_id.to_string());
        } else {
            state.failing_calendars.remove(calendar_id);
        }
        Ok(())
    }

    /// Makes every upsert/delete fail with `message` until cleared with `None`.
    pub fn set_rejection(&self, message: Option<&str>) -> Result<(), CalendarError> {
        let mut state = self.lock_state()?;
        state.rejection = message.map(ToOwned::to_owned);
        Ok(())
    }

    pub fn list_event_calls(&self) -> usize {
        self.list_event_calls.load(Ordering::SeqCst)
    }

    fn check_rejection(state: &GatewayState) -> Result<(), CalendarError> {
        match state.rejection.as_deref() {
            Some(message) => Err(CalendarError::Rejected {
                status: 400,
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CalendarGateway for InMemoryCalendarGateway {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, CalendarError> {
        Ok(self.lock_state()?.calendars.clone())
    }

    async fn list_events(
        &self,
        request: ListEventsRequest,
    ) -> Result<EventListing, CalendarError> {
        self.list_event_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock_state()?;
        if state.failing_calendars.contains(&request.calendar_id) {
            return Err(CalendarError::Network(format!(
                "calendar {} is unreachable",
                request.calendar_id
            )));
        }

        let window = EventRange::new(request.start, request.end);
        let mut events = state
            .events
            .get(&request.calendar_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.range.overlaps(&window))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        events.sort_by(|left, right| left.range.start.cmp(&right.range.start));
        Ok(EventListing {
            events,
            invalid: Vec::new(),
        })
    }

    async fn upsert_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError> {
        let mut state = self.lock_state()?;
        Self::check_rejection(&state)?;
        if !state.calendars.iter().any(|calendar| calendar.id == draft.calendar_id) {
            return Err(CalendarError::Rejected {
                status: 404,
                message: "Not Found".to_string(),
            });
        }

        let id = match draft.id.clone() {
            Some(id) => id,
            None => {
                state.next_id = state.next_id.saturating_add(1);
                format!("mem-{}", state.next_id)
            }
        };
        let event = CalendarEvent {
            id,
            calendar_id: draft.calendar_id.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            range: draft.range,
        };

        let events = state.events.entry(event.calendar_id.clone()).or_default();
        events.retain(|existing| existing.id != event.id);
        events.push(event.clone());
        Ok(event)
    }

    async fn delete_event(&self, event: &CalendarEvent) -> Result<(), CalendarError> {
        let mut state = self.lock_state()?;
        Self::check_rejection(&state)?;
        if let Some(events) = state.events.get_mut(&event.calendar_id) {
            events.retain(|existing| existing.id != event.id);
        }
        Ok(())
    }
}
