use crate::domain::calendar_time::{midnight, shift_days, start_of_day};
use crate::domain::models::{ActiveRange, CalendarEvent, EventDraft, EventRange};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub draft: EventDraft,
    pub is_new: bool,
    /// Last validation or gateway message, shown verbatim.
    pub error: Option<String>,
    pub submitting: bool,
}

/// Form state for creating or editing one event at a time.
#[derive(Debug)]
pub struct EventEditor {
    tz: Tz,
    slot_minutes: i64,
    new_event_minutes: i64,
    session: Option<EditSession>,
}

impl EventEditor {
    pub fn new(tz: Tz, slot_minutes: u32, new_event_minutes: u32) -> Self {
        Self {
            tz,
            slot_minutes: i64::from(slot_minutes.max(1)),
            new_event_minutes: i64::from(new_event_minutes.max(1)),
            session: None,
        }
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    pub fn open_existing(&mut self, event: &CalendarEvent) -> &EditSession {
        self.open(EventDraft::from(event))
    }

    /// New timed draft at `time` floored to the slot grid of its day.
    pub fn open_slot(&mut self, time: DateTime<Utc>, calendar_id: &str) -> &EditSession {
        let day_start = start_of_day(time, self.tz);
        let minutes = (time - day_start).num_minutes();
        let start = day_start + Duration::minutes(minutes - minutes % self.slot_minutes);
        let end = start + Duration::minutes(self.new_event_minutes);
        self.open(blank_draft(calendar_id, EventRange::new(start, end)))
    }

    pub fn open_day(&mut self, date: NaiveDate, calendar_id: &str) -> &EditSession {
        let range = EventRange::new(midnight(date, self.tz), midnight(shift_days(date, 1), self.tz));
        self.open(blank_draft(calendar_id, range))
    }

    /// New draft covering the whole week that contains `active.start`.
    pub fn open_week(&mut self, active: ActiveRange, calendar_id: &str) -> &EditSession {
        let week = ActiveRange::week_containing(active.start, self.tz);
        self.open(blank_draft(calendar_id, week.as_event_range()))
    }

    fn open(&mut self, draft: EventDraft) -> &EditSession {
        let is_new = draft.is_new();
        self.session.insert(EditSession {
            draft,
            is_new,
            error: None,
            submitting: false,
        })
    }

    /// Replaces the draft of the open session, keeping its new/existing flag.
    pub fn update_draft(&mut self, draft: EventDraft) -> bool {
        match self.session.as_mut() {
            Some(session) => {
                session.draft = draft;
                true
            }
            None => false,
        }
    }

    pub fn set_submitting(&mut self, submitting: bool) {
        if let Some(session) = self.session.as_mut() {
            session.submitting = submitting;
            if submitting {
                session.error = None;
            }
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        if let Some(session) = self.session.as_mut() {
            session.error = Some(message.into());
            session.submitting = false;
        }
    }

    pub fn close(&mut self) -> Option<EditSession> {
        self.session.take()
    }
}

fn blank_draft(calendar_id: &str, range: EventRange) -> EventDraft {
    EventDraft {
        id: None,
        calendar_id: calendar_id.to_string(),
        title: String::new(),
        description: String::new(),
        range,
    }
}
