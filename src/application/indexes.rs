use crate::application::change_feed::{ChangeBatch, EventChange};
use crate::domain::calendar_time::{DayKey, local_date, midnight, shift_days};
use crate::domain::category::{Category, categorize};
use crate::domain::models::{CalendarEvent, EventRange};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Insert,
    Remove,
}

/// A change routed to one category. Updates that move between categories
/// become a removal from the old one and an insertion into the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedChange {
    pub action: IndexAction,
    pub category: Category,
    pub event: CalendarEvent,
}

pub fn categorize_change(change: &EventChange, tz: Tz) -> Vec<CategorizedChange> {
    let routed = |action, event: &CalendarEvent| CategorizedChange {
        action,
        category: categorize(&event.range, tz),
        event: event.clone(),
    };
    match change {
        EventChange::New(event) => vec![routed(IndexAction::Insert, event)],
        EventChange::Removed(event) => vec![routed(IndexAction::Remove, event)],
        EventChange::Updated { event, previous } => vec![
            routed(IndexAction::Remove, previous),
            routed(IndexAction::Insert, event),
        ],
    }
}

pub trait DerivedIndex {
    /// Applies `change` if its category belongs to this index.
    fn apply(&mut self, change: &CategorizedChange);
}

/// One single-day copy of `event` per calendar day it touches, up to but
/// excluding the day its end falls on at midnight.
pub fn expand_multi_day(event: &CalendarEvent, tz: Tz) -> Vec<(DayKey, CalendarEvent)> {
    let mut day = local_date(event.range.start, tz);
    let mut expanded = Vec::new();
    loop {
        let day_start = midnight(day, tz);
        if day_start >= event.range.end {
            break;
        }
        let next_day = shift_days(day, 1);
        if next_day == day {
            break;
        }
        let mut copy = event.clone();
        copy.range = EventRange::new(day_start, midnight(next_day, tz));
        expanded.push((DayKey::for_date(day, tz), copy));
        day = next_day;
    }
    expanded
}

type DayBuckets = HashMap<DayKey, BTreeMap<String, CalendarEvent>>;

fn insert_into(buckets: &mut DayBuckets, key: DayKey, event: CalendarEvent) {
    buckets.entry(key).or_default().insert(event.id.clone(), event);
}

fn remove_from(buckets: &mut DayBuckets, key: &DayKey, event_id: &str) {
    if let Some(bucket) = buckets.get_mut(key) {
        bucket.remove(event_id);
        if bucket.is_empty() {
            buckets.remove(key);
        }
    }
}

fn bucket_events(buckets: &DayBuckets, key: &DayKey) -> Vec<CalendarEvent> {
    buckets
        .get(key)
        .map(|bucket| sorted_by_start(bucket.values()))
        .unwrap_or_default()
}

fn sorted_by_start<'a>(events: impl Iterator<Item = &'a CalendarEvent>) -> Vec<CalendarEvent> {
    let mut events = events.cloned().collect::<Vec<_>>();
    events.sort_by(|left, right| {
        left.range
            .start
            .cmp(&right.range.start)
            .then_with(|| left.id.cmp(&right.id))
    });
    events
}

/// `time` events keyed by their start day.
#[derive(Debug)]
pub struct TimedEventsByDay {
    tz: Tz,
    buckets: DayBuckets,
}

impl TimedEventsByDay {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            buckets: HashMap::new(),
        }
    }

    pub fn events_on(&self, key: &DayKey) -> Vec<CalendarEvent> {
        bucket_events(&self.buckets, key)
    }
}

impl DerivedIndex for TimedEventsByDay {
    fn apply(&mut self, change: &CategorizedChange) {
        if change.category != Category::Time {
            return;
        }
        let key = DayKey::for_instant(change.event.range.start, self.tz);
        match change.action {
            IndexAction::Insert => insert_into(&mut self.buckets, key, change.event.clone()),
            IndexAction::Remove => remove_from(&mut self.buckets, &key, &change.event.id),
        }
    }
}

/// `day` events on their day plus `multi` events expanded to every day they touch.
#[derive(Debug)]
pub struct DailyTasksByDay {
    tz: Tz,
    buckets: DayBuckets,
}

impl DailyTasksByDay {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            buckets: HashMap::new(),
        }
    }

    pub fn tasks_on(&self, key: &DayKey) -> Vec<CalendarEvent> {
        bucket_events(&self.buckets, key)
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    fn entries_for(&self, change: &CategorizedChange) -> Vec<(DayKey, CalendarEvent)> {
        match change.category {
            Category::Day => vec![(
                DayKey::for_instant(change.event.range.start, self.tz),
                change.event.clone(),
            )],
            Category::Multi => expand_multi_day(&change.event, self.tz),
            Category::Time | Category::Week => Vec::new(),
        }
    }
}

impl DerivedIndex for DailyTasksByDay {
    fn apply(&mut self, change: &CategorizedChange) {
        for (key, event) in self.entries_for(change) {
            match change.action {
                IndexAction::Insert => insert_into(&mut self.buckets, key, event),
                IndexAction::Remove => remove_from(&mut self.buckets, &key, &event.id),
            }
        }
    }
}

/// `week` events. Not keyed: the current range holds at most the active week.
#[derive(Debug, Default)]
pub struct WeeklyTasks {
    events: BTreeMap<String, CalendarEvent>,
}

impl WeeklyTasks {
    pub fn tasks(&self) -> Vec<CalendarEvent> {
        sorted_by_start(self.events.values())
    }
}

impl DerivedIndex for WeeklyTasks {
    fn apply(&mut self, change: &CategorizedChange) {
        if change.category != Category::Week {
            return;
        }
        match change.action {
            IndexAction::Insert => {
                self.events.insert(change.event.id.clone(), change.event.clone());
            }
            IndexAction::Remove => {
                self.events.remove(&change.event.id);
            }
        }
    }
}

/// The three indexes the week view reads, fed from one change stream.
#[derive(Debug)]
pub struct WeekIndexes {
    tz: Tz,
    timed: TimedEventsByDay,
    daily: DailyTasksByDay,
    weekly: WeeklyTasks,
}

impl WeekIndexes {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            timed: TimedEventsByDay::new(tz),
            daily: DailyTasksByDay::new(tz),
            weekly: WeeklyTasks::default(),
        }
    }

    pub fn apply_change(&mut self, change: &EventChange) {
        for routed in categorize_change(change, self.tz) {
            trace!(
                event_id = %routed.event.id,
                category = routed.category.as_str(),
                action = ?routed.action,
                "routing change"
            );
            self.timed.apply(&routed);
            self.daily.apply(&routed);
            self.weekly.apply(&routed);
        }
    }

    pub fn apply_batch(&mut self, batch: &ChangeBatch) {
        for change in &batch.changes {
            self.apply_change(change);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.tz);
    }

    pub fn timed_events(&self, day: NaiveDate) -> Vec<CalendarEvent> {
        self.timed.events_on(&DayKey::for_date(day, self.tz))
    }

    pub fn daily_tasks(&self, day: NaiveDate) -> Vec<CalendarEvent> {
        self.daily.tasks_on(&DayKey::for_date(day, self.tz))
    }

    pub fn weekly_tasks(&self) -> Vec<CalendarEvent> {
        self.weekly.tasks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn event(id: &str, calendar_id: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            calendar_id: calendar_id.to_string(),
            title: id.to_string(),
            description: String::new(),
            range: EventRange::new(utc(start), utc(end)),
        }
    }

    #[test]
    fn multi_day_event_expands_to_each_touched_day() {
        let offsite = event("offsite", "b", "2026-10-12T00:00:00Z", "2026-10-15T00:00:00Z");
        let mut indexes = WeekIndexes::new(Tz::UTC);
        indexes.apply_change(&EventChange::New(offsite.clone()));

        for day in ["2026-10-12", "2026-10-13", "2026-10-14"] {
            let tasks = indexes.daily_tasks(date(day));
            assert_eq!(tasks.len(), 1, "{day}");
            assert_eq!(tasks[0].id, "offsite");
            assert_eq!(tasks[0].range.start, midnight(date(day), Tz::UTC));
        }
        assert!(indexes.daily_tasks(date("2026-10-15")).is_empty());
        assert_eq!(indexes.daily.entry_count(), 3);

        indexes.apply_change(&EventChange::Removed(offsite));
        assert_eq!(indexes.daily.entry_count(), 0);
    }

    #[test]
    fn timed_multi_day_event_covers_partial_days() {
        let overnight = event("overnight", "a", "2026-10-12T22:00:00Z", "2026-10-13T02:00:00Z");
        let expanded = expand_multi_day(&overnight, Tz::UTC);
        let keys = expanded
            .iter()
            .map(|(key, _)| key.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["2026-10-12T00:00:00.000Z", "2026-10-13T00:00:00.000Z"]);
    }

    #[test]
    fn timed_events_are_keyed_by_start_day() {
        let standup = event("e1", "a", "2026-10-12T09:00:00Z", "2026-10-12T10:00:00Z");
        let mut indexes = WeekIndexes::new(Tz::UTC);
        indexes.apply_change(&EventChange::New(standup.clone()));

        assert_eq!(indexes.timed_events(date("2026-10-12")), vec![standup]);
        assert!(indexes.timed_events(date("2026-10-13")).is_empty());
        assert!(indexes.daily_tasks(date("2026-10-12")).is_empty());
    }

    #[test]
    fn update_replaces_entry_instead_of_duplicating() {
        let before = event("e1", "a", "2026-10-12T09:00:00Z", "2026-10-12T10:00:00Z");
        let mut after = before.clone();
        after.title = "Standup (moved)".to_string();

        let mut indexes = WeekIndexes::new(Tz::UTC);
        indexes.apply_change(&EventChange::New(before.clone()));
        indexes.apply_change(&EventChange::Updated {
            event: after.clone(),
            previous: before,
        });

        assert_eq!(indexes.timed_events(date("2026-10-12")), vec![after]);
    }

    #[test]
    fn recategorized_update_moves_between_indexes() {
        let timed = event("e1", "a", "2026-10-12T09:00:00Z", "2026-10-12T10:00:00Z");
        let week = event("e1", "a", "2026-10-12T00:00:00Z", "2026-10-19T00:00:00Z");

        let mut indexes = WeekIndexes::new(Tz::UTC);
        indexes.apply_change(&EventChange::New(timed.clone()));
        indexes.apply_change(&EventChange::Updated {
            event: week.clone(),
            previous: timed,
        });

        assert!(indexes.timed_events(date("2026-10-12")).is_empty());
        assert_eq!(indexes.weekly_tasks(), vec![week.clone()]);

        let updates = categorize_change(
            &EventChange::Updated {
                event: week.clone(),
                previous: week,
            },
            Tz::UTC,
        );
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].action, IndexAction::Remove);
        assert_eq!(updates[1].action, IndexAction::Insert);
    }

    #[test]
    fn removing_one_calendar_leaves_other_events_on_same_day() {
        let from_a = event("a1", "a", "2026-10-13T00:00:00Z", "2026-10-14T00:00:00Z");
        let from_b = event("b1", "b", "2026-10-13T00:00:00Z", "2026-10-14T00:00:00Z");
        let mut indexes = WeekIndexes::new(Tz::UTC);
        indexes.apply_change(&EventChange::New(from_a.clone()));
        indexes.apply_change(&EventChange::New(from_b.clone()));

        indexes.apply_change(&EventChange::Removed(from_b));
        assert_eq!(indexes.daily_tasks(date("2026-10-13")), vec![from_a]);
    }

    #[test]
    fn queries_default_to_empty() {
        let indexes = WeekIndexes::new(Tz::UTC);
        assert!(indexes.timed_events(date("2026-10-12")).is_empty());
        assert!(indexes.daily_tasks(date("2026-10-12")).is_empty());
        assert!(indexes.weekly_tasks().is_empty());
    }
}
