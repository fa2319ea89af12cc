//! Snapshot diffing and the multicast change stream.
//!
//! The feed keeps the last published canonical set behind the same lock that
//! sequences publication, so a cold subscriber's replay and its live receiver
//! are taken at one version: nothing is duplicated or missed at the seam.

use crate::application::merger::CanonicalEventSet;
use crate::domain::models::CalendarEvent;
use crate::infrastructure::error::CalendarError;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventChange {
    New(CalendarEvent),
    Updated {
        event: CalendarEvent,
        previous: CalendarEvent,
    },
    Removed(CalendarEvent),
}

impl EventChange {
    /// The event as it is after the change (the removed value for `Removed`).
    pub fn event(&self) -> &CalendarEvent {
        match self {
            Self::New(event) | Self::Removed(event) => event,
            Self::Updated { event, .. } => event,
        }
    }
}

/// Changes that turn `previous` into `next`: all `New`, then `Updated`, then
/// `Removed`, each group in id order.
pub fn diff_event_sets(previous: &CanonicalEventSet, next: &CanonicalEventSet) -> Vec<EventChange> {
    let mut added = Vec::new();
    let mut updated = Vec::new();
    for event in next.events() {
        match previous.get(&event.id) {
            None => added.push(EventChange::New(event.clone())),
            Some(before) if before != event => updated.push(EventChange::Updated {
                event: event.clone(),
                previous: before.clone(),
            }),
            Some(_) => {}
        }
    }
    let removed = previous
        .events()
        .filter(|event| next.get(&event.id).is_none())
        .map(|event| EventChange::Removed(event.clone()));

    added.into_iter().chain(updated).chain(removed).collect()
}

/// Changes published by one transition. Versions increase by one per batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub version: u64,
    pub changes: Vec<EventChange>,
}

#[derive(Debug, Default)]
struct FeedState {
    snapshot: CanonicalEventSet,
    version: u64,
}

pub struct ChangeFeed {
    state: Mutex<FeedState>,
    sender: broadcast::Sender<Arc<ChangeBatch>>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(FeedState::default()),
            sender,
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, FeedState>, CalendarError> {
        self.state
            .lock()
            .map_err(|error| CalendarError::LockPoisoned(format!("change feed: {error}")))
    }

    /// Diffs `next` against the current snapshot and broadcasts the result.
    /// Returns `None` when nothing changed.
    pub fn publish(&self, next: CanonicalEventSet) -> Result<Option<Arc<ChangeBatch>>, CalendarError> {
        let mut state = self.lock_state()?;
        let changes = diff_event_sets(&state.snapshot, &next);
        if changes.is_empty() {
            return Ok(None);
        }

        state.version += 1;
        state.snapshot = next;
        let batch = Arc::new(ChangeBatch {
            version: state.version,
            changes,
        });
        // Sent under the lock: subscribers attach either before or after this batch.
        let receivers = self.sender.send(Arc::clone(&batch)).unwrap_or(0);
        debug!(
            version = batch.version,
            changes = batch.changes.len(),
            receivers,
            "published change batch"
        );
        Ok(Some(batch))
    }

    /// Live changes only, starting after the current version.
    pub fn subscribe(&self) -> Result<ChangeSubscription, CalendarError> {
        let state = self.lock_state()?;
        Ok(ChangeSubscription {
            receiver: self.sender.subscribe(),
            seen_version: state.version,
            replay: None,
        })
    }

    /// A `New` change per live event first, then everything published later.
    pub fn subscribe_cold(&self) -> Result<ChangeSubscription, CalendarError> {
        let state = self.lock_state()?;
        let replay = (!state.snapshot.is_empty()).then(|| {
            Arc::new(ChangeBatch {
                version: state.version,
                changes: state
                    .snapshot
                    .events()
                    .cloned()
                    .map(EventChange::New)
                    .collect(),
            })
        });
        Ok(ChangeSubscription {
            receiver: self.sender.subscribe(),
            seen_version: state.version,
            replay,
        })
    }

    pub fn snapshot(&self) -> Result<CanonicalEventSet, CalendarError> {
        Ok(self.lock_state()?.snapshot.clone())
    }

    pub fn version(&self) -> Result<u64, CalendarError> {
        Ok(self.lock_state()?.version)
    }
}

pub struct ChangeSubscription {
    receiver: broadcast::Receiver<Arc<ChangeBatch>>,
    seen_version: u64,
    replay: Option<Arc<ChangeBatch>>,
}

impl ChangeSubscription {
    pub async fn recv(&mut self) -> Result<Arc<ChangeBatch>, CalendarError> {
        if let Some(batch) = self.replay.take() {
            return Ok(batch);
        }
        loop {
            match self.receiver.recv().await {
                Ok(batch) if batch.version <= self.seen_version => continue,
                Ok(batch) => {
                    self.seen_version = batch.version;
                    return Ok(batch);
                }
                Err(RecvError::Lagged(skipped)) => return Err(CalendarError::FeedLagged(skipped)),
                Err(RecvError::Closed) => return Err(CalendarError::FeedClosed),
            }
        }
    }

    /// Next batch if one is ready.
    pub fn try_recv(&mut self) -> Result<Option<Arc<ChangeBatch>>, CalendarError> {
        if let Some(batch) = self.replay.take() {
            return Ok(Some(batch));
        }
        loop {
            match self.receiver.try_recv() {
                Ok(batch) if batch.version <= self.seen_version => continue,
                Ok(batch) => {
                    self.seen_version = batch.version;
                    return Ok(Some(batch));
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => return Err(CalendarError::FeedLagged(skipped)),
                Err(TryRecvError::Closed) => return Err(CalendarError::FeedClosed),
            }
        }
    }

    pub fn seen_version(&self) -> u64 {
        self.seen_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventRange;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, title: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            calendar_id: "work".to_string(),
            title: title.to_string(),
            description: String::new(),
            range: EventRange::new(utc("2026-10-12T09:00:00Z"), utc("2026-10-12T10:00:00Z")),
        }
    }

    fn replay(base: &CanonicalEventSet, changes: &[EventChange]) -> CanonicalEventSet {
        let mut set = base.clone();
        for change in changes {
            match change {
                EventChange::New(event) | EventChange::Updated { event, .. } => {
                    set.insert(event.clone());
                }
                EventChange::Removed(event) => {
                    set.remove(&event.id);
                }
            }
        }
        set
    }

    #[test]
    fn diff_orders_new_then_updated_then_removed() {
        let previous = CanonicalEventSet::from_events([event("b", "B"), event("c", "C")]);
        let next = CanonicalEventSet::from_events([event("a", "A"), event("b", "B2")]);

        let changes = diff_event_sets(&previous, &next);
        assert_eq!(
            changes,
            vec![
                EventChange::New(event("a", "A")),
                EventChange::Updated {
                    event: event("b", "B2"),
                    previous: event("b", "B"),
                },
                EventChange::Removed(event("c", "C")),
            ]
        );
    }

    #[test]
    fn title_edit_is_a_single_update() {
        let previous = CanonicalEventSet::from_events([event("e1", "Standup")]);
        let next = CanonicalEventSet::from_events([event("e1", "Standup (moved)")]);

        match diff_event_sets(&previous, &next).as_slice() {
            [EventChange::Updated { event, previous }] => {
                assert_eq!(previous.title, "Standup");
                assert_eq!(event.title, "Standup (moved)");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn republishing_identical_set_emits_nothing() {
        let feed = ChangeFeed::new(8);
        let set = CanonicalEventSet::from_events([event("e1", "Standup")]);
        assert!(feed.publish(set.clone()).expect("publish").is_some());
        assert!(feed.publish(set).expect("publish").is_none());
        assert_eq!(feed.version().expect("version"), 1);
    }

    #[tokio::test]
    async fn cold_subscriber_gets_snapshot_then_live_changes() {
        let feed = ChangeFeed::new(8);
        feed.publish(CanonicalEventSet::from_events([event("e1", "Standup")]))
            .expect("publish");

        let mut live = feed.subscribe().expect("subscribe");
        let mut cold = feed.subscribe_cold().expect("subscribe cold");
        assert!(live.try_recv().expect("try_recv").is_none());

        let first = cold.recv().await.expect("replay");
        assert_eq!(first.changes, vec![EventChange::New(event("e1", "Standup"))]);

        feed.publish(CanonicalEventSet::from_events([
            event("e1", "Standup"),
            event("e2", "Review"),
        ]))
        .expect("publish");

        let from_cold = cold.recv().await.expect("live batch");
        let from_live = live.recv().await.expect("live batch");
        assert_eq!(from_cold.version, 2);
        assert_eq!(from_cold, from_live);
        assert_eq!(from_cold.changes, vec![EventChange::New(event("e2", "Review"))]);
        assert!(cold.try_recv().expect("try_recv").is_none());
    }

    #[test]
    fn lagging_subscriber_is_told_so() {
        let feed = ChangeFeed::new(1);
        let mut subscription = feed.subscribe().expect("subscribe");
        feed.publish(CanonicalEventSet::from_events([event("a", "A")]))
            .expect("publish");
        feed.publish(CanonicalEventSet::from_events([event("b", "B")]))
            .expect("publish");

        assert!(matches!(subscription.try_recv(), Err(CalendarError::FeedLagged(1))));
        let batch = subscription.try_recv().expect("after lag").expect("batch");
        assert_eq!(batch.version, 2);
    }

    #[test]
    fn dropping_the_feed_closes_subscriptions() {
        let feed = ChangeFeed::new(4);
        let mut subscription = feed.subscribe().expect("subscribe");
        drop(feed);
        assert!(matches!(subscription.try_recv(), Err(CalendarError::FeedClosed)));
    }

    fn snapshot_strategy() -> impl Strategy<Value = CanonicalEventSet> {
        prop::collection::btree_map(0u8..12, (0u8..3, 0i64..48), 0..10).prop_map(|entries| {
            let origin = utc("2026-10-12T00:00:00Z");
            CanonicalEventSet::from_events(entries.into_iter().map(|(id, (title, hour))| {
                let start = origin + Duration::hours(hour);
                CalendarEvent {
                    id: format!("evt-{id}"),
                    calendar_id: "work".to_string(),
                    title: format!("title-{title}"),
                    description: String::new(),
                    range: EventRange::new(start, start + Duration::minutes(30)),
                }
            }))
        })
    }

    proptest! {
        #[test]
        fn replaying_all_batches_from_empty_rebuilds_last_snapshot(
            snapshots in prop::collection::vec(snapshot_strategy(), 1..8)
        ) {
            let feed = ChangeFeed::new(16);
            let mut subscription = feed.subscribe_cold().expect("subscribe");
            let mut rebuilt = CanonicalEventSet::default();
            for snapshot in &snapshots {
                feed.publish(snapshot.clone()).expect("publish");
                while let Some(batch) = subscription.try_recv().expect("try_recv") {
                    rebuilt = replay(&rebuilt, &batch.changes);
                }
            }
            prop_assert_eq!(&rebuilt, snapshots.last().expect("non-empty"));
            prop_assert_eq!(rebuilt, feed.snapshot().expect("snapshot"));
        }

        #[test]
        fn diff_of_identical_sets_is_empty(snapshot in snapshot_strategy()) {
            prop_assert!(diff_event_sets(&snapshot, &snapshot).is_empty());
        }

        #[test]
        fn late_cold_subscriber_sees_the_same_set(
            snapshots in prop::collection::vec(snapshot_strategy(), 1..6)
        ) {
            let feed = ChangeFeed::new(16);
            for snapshot in &snapshots {
                feed.publish(snapshot.clone()).expect("publish");
            }
            let mut cold = feed.subscribe_cold().expect("subscribe");
            let mut rebuilt = CanonicalEventSet::default();
            while let Some(batch) = cold.try_recv().expect("try_recv") {
                rebuilt = replay(&rebuilt, &batch.changes);
            }
            prop_assert_eq!(&rebuilt, snapshots.last().expect("non-empty"));
        }
    }
}
