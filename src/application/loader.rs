use crate::domain::models::ActiveRange;
use crate::infrastructure::calendar_gateway::{CalendarGateway, EventListing, ListEventsRequest};
use crate::infrastructure::error::CalendarError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// One live fetch: a calendar within a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadKey {
    pub calendar_id: String,
    pub range: ActiveRange,
}

/// Outcome of a single fetch. `ticket` increases with every fetch started by
/// the loader, across all keys.
#[derive(Debug)]
pub struct LoadResult {
    pub key: LoadKey,
    pub ticket: u64,
    pub outcome: Result<EventListing, CalendarError>,
}

struct Subscription {
    handle: JoinHandle<()>,
    refresh: Arc<Notify>,
}

/// Keeps one refresh task per relevant [`LoadKey`] and forwards every fetch
/// result to a single channel.
pub struct EventLoader<G> {
    gateway: Arc<G>,
    refresh_interval: Duration,
    sender: mpsc::UnboundedSender<LoadResult>,
    tickets: Arc<AtomicU64>,
    subscriptions: HashMap<LoadKey, Subscription>,
}

impl<G> EventLoader<G>
where
    G: CalendarGateway + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        refresh_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<LoadResult>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let loader = Self {
            gateway,
            refresh_interval,
            sender,
            tickets: Arc::new(AtomicU64::new(0)),
            subscriptions: HashMap::new(),
        };
        (loader, receiver)
    }

    /// Aborts subscriptions whose key is not in `keys` and starts the missing
    /// ones. Keys that stay relevant keep their task and schedule.
    pub fn sync_keys(&mut self, keys: &[LoadKey]) {
        let stale = self
            .subscriptions
            .keys()
            .filter(|key| !keys.contains(key))
            .cloned()
            .collect::<Vec<_>>();
        for key in stale {
            if let Some(subscription) = self.subscriptions.remove(&key) {
                subscription.handle.abort();
                debug!(calendar_id = %key.calendar_id, start = %key.range.start, "unsubscribed calendar");
            }
        }

        for key in keys {
            if self.subscriptions.contains_key(key) {
                continue;
            }
            let refresh = Arc::new(Notify::new());
            let handle = tokio::spawn(run_subscription(
                Arc::clone(&self.gateway),
                key.clone(),
                self.refresh_interval,
                Arc::clone(&refresh),
                Arc::clone(&self.tickets),
                self.sender.clone(),
            ));
            debug!(calendar_id = %key.calendar_id, start = %key.range.start, "subscribed calendar");
            self.subscriptions
                .insert(key.clone(), Subscription { handle, refresh });
        }
    }

    /// Requests an immediate re-fetch for every subscription of `calendar_id`.
    /// A request made while a fetch is running triggers one more fetch after it.
    pub fn invalidate(&self, calendar_id: &str) -> bool {
        let mut matched = false;
        for (key, subscription) in &self.subscriptions {
            if key.calendar_id == calendar_id {
                subscription.refresh.notify_one();
                matched = true;
            }
        }
        matched
    }

    /// Ticket of the most recently started fetch.
    pub fn current_ticket(&self) -> u64 {
        self.tickets.load(Ordering::SeqCst)
    }

    pub fn active_keys(&self) -> Vec<LoadKey> {
        self.subscriptions.keys().cloned().collect()
    }

    pub fn shutdown(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.handle.abort();
        }
    }
}

impl<G> Drop for EventLoader<G> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.values() {
            subscription.handle.abort();
        }
    }
}

async fn run_subscription<G>(
    gateway: Arc<G>,
    key: LoadKey,
    refresh_interval: Duration,
    refresh: Arc<Notify>,
    tickets: Arc<AtomicU64>,
    sender: mpsc::UnboundedSender<LoadResult>,
) where
    G: CalendarGateway + 'static,
{
    loop {
        let ticket = tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = gateway
            .list_events(ListEventsRequest {
                calendar_id: key.calendar_id.clone(),
                start: key.range.start,
                end: key.range.end,
            })
            .await;

        match &outcome {
            Ok(listing) => debug!(
                calendar_id = %key.calendar_id,
                ticket,
                count = listing.events.len(),
                invalid = listing.invalid.len(),
                "fetched events"
            ),
            Err(error) => warn!(
                calendar_id = %key.calendar_id,
                ticket,
                error = %error,
                "event fetch failed"
            ),
        }

        if sender
            .send(LoadResult {
                key: key.clone(),
                ticket,
                outcome,
            })
            .is_err()
        {
            break;
        }

        tokio::select! {
            _ = sleep(refresh_interval) => {}
            _ = refresh.notified() => {}
        }
    }
}
