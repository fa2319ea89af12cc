use crate::application::change_feed::{ChangeBatch, ChangeFeed, ChangeSubscription};
use crate::application::editing::{EditSession, EventEditor};
use crate::application::indexes::WeekIndexes;
use crate::application::loader::{EventLoader, LoadKey, LoadResult};
use crate::application::merger::{EventMerger, FetchFailure, MergeOutcome};
use crate::application::range::ActiveRangeState;
use crate::application::selection::CalendarSelection;
use crate::application::time_indicator;
use crate::domain::models::{ActiveRange, CalendarDescriptor, CalendarEvent, EventDraft};
use crate::infrastructure::calendar_gateway::CalendarGateway;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::CalendarError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns the whole pipeline for one signed-in session: selection and range
/// state, per-calendar loaders, the merger, the change feed and the derived
/// indexes. Queries read the indexes; actions are the only way to mutate.
pub struct WeekViewSession<G> {
    gateway: Arc<G>,
    config: EngineConfig,
    tz: Tz,
    now_provider: NowProvider,
    selection: CalendarSelection,
    range: ActiveRangeState,
    loader: EventLoader<G>,
    results: mpsc::UnboundedReceiver<LoadResult>,
    merger: EventMerger,
    feed: Arc<ChangeFeed>,
    index_feed: ChangeSubscription,
    indexes: WeekIndexes,
    editor: EventEditor,
}

impl<G> WeekViewSession<G>
where
    G: CalendarGateway + 'static,
{
    pub async fn start(gateway: Arc<G>, config: EngineConfig) -> Result<Self, CalendarError> {
        Self::start_with_now_provider(gateway, config, Arc::new(Utc::now)).await
    }

    /// Lists calendars once and subscribes a loader per active calendar for
    /// the week containing `now_provider()`.
    pub async fn start_with_now_provider(
        gateway: Arc<G>,
        config: EngineConfig,
        now_provider: NowProvider,
    ) -> Result<Self, CalendarError> {
        config.validate()?;
        let tz = config.tz()?;

        let listing = gateway.list_calendars().await?;
        info!(calendars = listing.len(), time_zone = %tz, "starting week view session");
        let selection = CalendarSelection::from_listing(listing, &config.hidden_calendar_ids);
        let range = ActiveRangeState::new(now_provider(), tz);
        let (loader, results) = EventLoader::new(Arc::clone(&gateway), config.refresh_interval());
        let feed = Arc::new(ChangeFeed::new(config.change_feed_capacity));
        let index_feed = feed.subscribe_cold()?;
        let editor = EventEditor::new(tz, config.slot_minutes, config.new_event_minutes);

        let mut session = Self {
            gateway,
            config,
            tz,
            now_provider,
            selection,
            range,
            loader,
            results,
            merger: EventMerger::new(),
            feed,
            index_feed,
            indexes: WeekIndexes::new(tz),
            editor,
        };
        session.rescope()?;
        Ok(session)
    }

    pub fn calendars(&self) -> &[CalendarDescriptor] {
        self.selection.calendars()
    }

    pub fn active_range(&self) -> ActiveRange {
        self.range.current()
    }

    pub fn active_days(&self) -> Vec<NaiveDate> {
        self.range.current().days(self.tz)
    }

    pub fn timed_events(&self, day: NaiveDate) -> Vec<CalendarEvent> {
        self.indexes.timed_events(day)
    }

    pub fn daily_tasks(&self, day: NaiveDate) -> Vec<CalendarEvent> {
        self.indexes.daily_tasks(day)
    }

    pub fn weekly_tasks(&self) -> Vec<CalendarEvent> {
        self.indexes.weekly_tasks()
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_editing()
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.editor.session()
    }

    pub fn current_time_position(&self, day: NaiveDate) -> Option<f64> {
        time_indicator::current_time_position(
            day,
            (self.now_provider)(),
            self.tz,
            self.config.display_start_hour,
            self.config.display_end_hour,
        )
    }

    pub fn fetch_failures(&self) -> Vec<FetchFailure> {
        self.merger.fetch_failures()
    }

    /// Shared handle for consumers that want the change stream itself.
    pub fn change_feed(&self) -> Arc<ChangeFeed> {
        Arc::clone(&self.feed)
    }

    pub fn toggle_calendar(&mut self, calendar_id: &str) -> Result<bool, CalendarError> {
        if !self.selection.toggle(calendar_id) {
            debug!(calendar_id, "toggle ignored for unknown calendar");
            return Ok(false);
        }
        info!(
            calendar_id,
            active = self.selection.get(calendar_id).map(|calendar| calendar.is_active),
            "calendar toggled"
        );
        self.rescope()?;
        Ok(true)
    }

    pub fn set_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ActiveRange, CalendarError> {
        let range = self.range.set_range(start, end)?;
        self.rescope()?;
        Ok(range)
    }

    pub fn previous_week(&mut self) -> Result<ActiveRange, CalendarError> {
        let range = self.range.previous_week();
        self.rescope()?;
        Ok(range)
    }

    pub fn next_week(&mut self) -> Result<ActiveRange, CalendarError> {
        let range = self.range.next_week();
        self.rescope()?;
        Ok(range)
    }

    pub fn click_event(&mut self, event_id: &str) -> Result<&EditSession, CalendarError> {
        let snapshot = self.feed.snapshot()?;
        let event = snapshot
            .get(event_id)
            .ok_or_else(|| CalendarError::UnknownEvent(event_id.to_string()))?;
        Ok(self.editor.open_existing(event))
    }

    pub fn click_empty_slot(&mut self, time: DateTime<Utc>) -> Result<&EditSession, CalendarError> {
        let calendar_id = self.default_calendar_id()?;
        Ok(self.editor.open_slot(time, &calendar_id))
    }

    pub fn click_day(&mut self, day: NaiveDate) -> Result<&EditSession, CalendarError> {
        let calendar_id = self.default_calendar_id()?;
        Ok(self.editor.open_day(day, &calendar_id))
    }

    pub fn click_week(&mut self) -> Result<&EditSession, CalendarError> {
        let calendar_id = self.default_calendar_id()?;
        Ok(self.editor.open_week(self.range.current(), &calendar_id))
    }

    pub fn cancel_edit(&mut self) {
        if self.editor.close().is_some() {
            debug!("edit cancelled");
        }
    }

    /// Validates and saves `draft` through the gateway.
    ///
    /// Invalid drafts never reach the gateway. On rejection the session stays
    /// open with the gateway's message. On success the saved event is layered
    /// over the loaded data, its calendar is re-fetched and the session closes.
    pub async fn submit_event(&mut self, draft: EventDraft) -> Result<CalendarEvent, CalendarError> {
        if !self.editor.update_draft(draft.clone()) {
            return Err(CalendarError::NoEditInProgress);
        }
        if let Err(message) = draft.validate() {
            self.editor.record_error(message.clone());
            return Err(CalendarError::Validation(message));
        }
        if self.selection.get(&draft.calendar_id).is_none() {
            let error = CalendarError::UnknownCalendar(draft.calendar_id.clone());
            self.editor.record_error(error.to_string());
            return Err(error);
        }

        self.editor.set_submitting(true);
        let saved = match self.gateway.upsert_event(&draft).await {
            Ok(saved) => saved,
            Err(error) => {
                warn!(calendar_id = %draft.calendar_id, error = %error, "event submission rejected");
                self.editor.record_error(error.to_string());
                return Err(error);
            }
        };

        info!(event_id = %saved.id, calendar_id = %saved.calendar_id, "event saved");
        self.merger
            .upsert_local(saved.clone(), self.loader.current_ticket());
        self.loader.invalidate(&saved.calendar_id);
        self.editor.close();
        self.republish()?;
        Ok(saved)
    }

    pub async fn delete_event(&mut self, event: CalendarEvent) -> Result<(), CalendarError> {
        self.editor.set_submitting(true);
        if let Err(error) = self.gateway.delete_event(&event).await {
            warn!(event_id = %event.id, error = %error, "event deletion rejected");
            self.editor.record_error(error.to_string());
            return Err(error);
        }

        info!(event_id = %event.id, calendar_id = %event.calendar_id, "event deleted");
        self.merger.delete_local(&event, self.loader.current_ticket());
        self.loader.invalidate(&event.calendar_id);
        self.editor.close();
        self.republish()?;
        Ok(())
    }

    /// Waits for the next loader result and folds it into the indexes.
    pub async fn next_update(&mut self) -> Result<MergeOutcome, CalendarError> {
        let result = self.results.recv().await.ok_or(CalendarError::FeedClosed)?;
        self.apply_result(result)
    }

    /// Applies every loader result already received, without waiting.
    pub fn process_pending(&mut self) -> Result<usize, CalendarError> {
        let mut applied = 0;
        while let Ok(result) = self.results.try_recv() {
            self.apply_result(result)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Stops every loader task. Queries keep answering from the last state.
    pub fn shutdown(&mut self) {
        self.loader.shutdown();
        info!("week view session shut down");
    }

    fn apply_result(&mut self, result: LoadResult) -> Result<MergeOutcome, CalendarError> {
        let outcome = self.merger.apply_result(result);
        if outcome == MergeOutcome::Advanced {
            self.republish()?;
        }
        Ok(outcome)
    }

    fn default_calendar_id(&self) -> Result<String, CalendarError> {
        self.selection
            .default_calendar_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| CalendarError::UnknownCalendar("no calendars available".to_string()))
    }

    /// Re-keys the merger and loaders after a selection or range change.
    fn rescope(&mut self) -> Result<(), CalendarError> {
        let range = self.range.current();
        let active_ids = self.selection.active_ids();
        let keys = active_ids
            .iter()
            .map(|calendar_id| LoadKey {
                calendar_id: calendar_id.clone(),
                range,
            })
            .collect::<Vec<_>>();

        debug!(start = %range.start, end = %range.end, calendars = keys.len(), "rescoping loaders");
        self.merger
            .set_scope(range, active_ids, self.loader.current_ticket());
        self.loader.sync_keys(&keys);
        self.republish()
    }

    fn republish(&mut self) -> Result<(), CalendarError> {
        if let Some(set) = self.merger.canonical() {
            if let Some(batch) = self.feed.publish(set)? {
                info!(version = batch.version, changes = batch.changes.len(), "canonical events advanced");
            }
        }
        self.drain_index_feed()
    }

    fn drain_index_feed(&mut self) -> Result<(), CalendarError> {
        loop {
            match self.index_feed.try_recv() {
                Ok(Some(batch)) => self.apply_batch(&batch),
                Ok(None) => return Ok(()),
                Err(CalendarError::FeedLagged(skipped)) => {
                    warn!(skipped, "index feed lagged, rebuilding indexes");
                    self.index_feed = self.feed.subscribe_cold()?;
                    self.indexes.clear();
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn apply_batch(&mut self, batch: &ChangeBatch) {
        self.indexes.apply_batch(batch);
        debug!(version = batch.version, changes = batch.changes.len(), "indexes updated");
    }
}
