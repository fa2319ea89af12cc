use crate::application::loader::LoadResult;
use crate::domain::models::{ActiveRange, CalendarEvent};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Deduplicated-by-id snapshot of the events currently considered loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalEventSet {
    events: BTreeMap<String, CalendarEvent>,
}

impl CanonicalEventSet {
    /// Later events replace earlier ones with the same id.
    pub fn from_events(events: impl IntoIterator<Item = CalendarEvent>) -> Self {
        let mut set = Self::default();
        for event in events {
            set.insert(event);
        }
        set
    }

    pub fn insert(&mut self, event: CalendarEvent) -> Option<CalendarEvent> {
        self.events.insert(event.id.clone(), event)
    }

    pub fn remove(&mut self, event_id: &str) -> Option<CalendarEvent> {
        self.events.remove(event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<&CalendarEvent> {
        self.events.get(event_id)
    }

    /// Events in id order.
    pub fn events(&self) -> impl Iterator<Item = &CalendarEvent> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Result belongs to a range or calendar that is no longer current.
    Ignored,
    /// Accepted, but some active calendar has not answered yet.
    Pending,
    /// Accepted and every active calendar has answered.
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub calendar_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct CalendarSlot {
    min_ticket: u64,
    last_ticket: u64,
    responded: bool,
    latest: Vec<CalendarEvent>,
    failure: Option<String>,
    invalid_events: Vec<String>,
}

#[derive(Debug, Clone)]
enum LocalChange {
    Upsert(CalendarEvent),
    Delete(String),
}

#[derive(Debug, Clone)]
struct Overlay {
    calendar_id: String,
    mark: u64,
    change: LocalChange,
}

/// Combines the latest result of every active calendar and layers local
/// mutations on top until a newer fetch confirms them.
#[derive(Debug, Default)]
pub struct EventMerger {
    range: Option<ActiveRange>,
    active_ids: Vec<String>,
    slots: HashMap<String, CalendarSlot>,
    overlays: Vec<Overlay>,
}

impl EventMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to a new range and calendar set.
    ///
    /// A range change drops every cached result and overlay. Otherwise results
    /// of calendars that stay active are kept. Newly active calendars only
    /// accept results with a ticket above `ticket_floor`, so responses from an
    /// earlier subscription of the same key are ignored.
    pub fn set_scope(&mut self, range: ActiveRange, active_ids: Vec<String>, ticket_floor: u64) {
        if self.range != Some(range) {
            self.slots.clear();
            self.overlays.clear();
        }
        self.slots.retain(|calendar_id, _| active_ids.contains(calendar_id));
        self.overlays
            .retain(|overlay| active_ids.contains(&overlay.calendar_id));
        for calendar_id in &active_ids {
            self.slots
                .entry(calendar_id.clone())
                .or_insert_with(|| CalendarSlot {
                    min_ticket: ticket_floor,
                    ..CalendarSlot::default()
                });
        }
        self.range = Some(range);
        self.active_ids = active_ids;
    }

    pub fn apply_result(&mut self, result: LoadResult) -> MergeOutcome {
        let LoadResult {
            key,
            ticket,
            outcome,
        } = result;
        if self.range != Some(key.range) {
            debug!(calendar_id = %key.calendar_id, ticket, "ignoring result for a previous range");
            return MergeOutcome::Ignored;
        }
        let Some(slot) = self.slots.get_mut(&key.calendar_id) else {
            debug!(calendar_id = %key.calendar_id, ticket, "ignoring result for an inactive calendar");
            return MergeOutcome::Ignored;
        };
        if ticket <= slot.min_ticket || ticket <= slot.last_ticket {
            debug!(calendar_id = %key.calendar_id, ticket, "ignoring superseded result");
            return MergeOutcome::Ignored;
        }

        slot.responded = true;
        slot.last_ticket = ticket;
        match outcome {
            Ok(listing) => {
                slot.latest = listing.events;
                slot.failure = None;
                slot.invalid_events = listing.invalid.iter().map(ToString::to_string).collect();
                let before = self.overlays.len();
                self.overlays
                    .retain(|overlay| overlay.calendar_id != key.calendar_id || overlay.mark >= ticket);
                if self.overlays.len() != before {
                    debug!(
                        calendar_id = %key.calendar_id,
                        cleared = before - self.overlays.len(),
                        "fetch superseded local changes"
                    );
                }
            }
            Err(error) => {
                slot.failure = Some(error.to_string());
            }
        }

        if self.is_ready() {
            MergeOutcome::Advanced
        } else {
            MergeOutcome::Pending
        }
    }

    fn is_active(&self, calendar_id: &str) -> bool {
        self.active_ids.iter().any(|active| active == calendar_id)
    }

    /// Layers `event` over the loaded data. `mark` is the latest fetch ticket
    /// at the time the change was confirmed by the gateway. Changes to
    /// inactive calendars are not layered: no fetch would ever clear them.
    pub fn upsert_local(&mut self, event: CalendarEvent, mark: u64) {
        if !self.is_active(&event.calendar_id) {
            debug!(calendar_id = %event.calendar_id, event_id = %event.id, "not layering change to inactive calendar");
            return;
        }
        self.overlays.push(Overlay {
            calendar_id: event.calendar_id.clone(),
            mark,
            change: LocalChange::Upsert(event),
        });
    }

    pub fn delete_local(&mut self, event: &CalendarEvent, mark: u64) {
        if !self.is_active(&event.calendar_id) {
            debug!(calendar_id = %event.calendar_id, event_id = %event.id, "not layering change to inactive calendar");
            return;
        }
        self.overlays.push(Overlay {
            calendar_id: event.calendar_id.clone(),
            mark,
            change: LocalChange::Delete(event.id.clone()),
        });
    }

    fn is_ready(&self) -> bool {
        self.active_ids.iter().all(|calendar_id| {
            self.slots
                .get(calendar_id)
                .map(|slot| slot.responded)
                .unwrap_or(false)
        })
    }

    /// The merged set, or `None` while an active calendar has not answered for
    /// the current range. An empty calendar set yields an empty set at once.
    pub fn canonical(&self) -> Option<CanonicalEventSet> {
        let range = self.range?;
        if !self.is_ready() {
            return None;
        }

        let mut set = CanonicalEventSet::from_events(
            self.active_ids
                .iter()
                .filter_map(|calendar_id| self.slots.get(calendar_id))
                .flat_map(|slot| slot.latest.iter().cloned()),
        );

        let window = range.as_event_range();
        for overlay in self
            .overlays
            .iter()
            .filter(|overlay| self.is_active(&overlay.calendar_id))
        {
            match &overlay.change {
                LocalChange::Upsert(event) if event.range.overlaps(&window) => {
                    set.insert(event.clone());
                }
                LocalChange::Upsert(event) => {
                    set.remove(&event.id);
                }
                LocalChange::Delete(event_id) => {
                    set.remove(event_id);
                }
            }
        }
        Some(set)
    }

    /// Failed fetches and undecodable events of the latest results, in
    /// selection order.
    pub fn fetch_failures(&self) -> Vec<FetchFailure> {
        self.active_ids
            .iter()
            .filter_map(|calendar_id| self.slots.get(calendar_id).map(|slot| (calendar_id, slot)))
            .flat_map(|(calendar_id, slot)| {
                slot.failure
                    .iter()
                    .chain(&slot.invalid_events)
                    .map(move |message| FetchFailure {
                        calendar_id: calendar_id.clone(),
                        message: message.clone(),
                    })
            })
            .collect()
    }
}
