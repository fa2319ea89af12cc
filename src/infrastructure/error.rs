use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(String),
    /// Rendered verbatim so the provider's message reaches the user unchanged.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("invalid calendar event {event_id}: unparsable {field} '{value}'")]
    InvalidEvent {
        event_id: String,
        field: String,
        value: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("unknown calendar: {0}")]
    UnknownCalendar(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("no edit in progress")]
    NoEditInProgress,
    #[error("change feed consumer lagged behind by {0} batches")]
    FeedLagged(u64),
    #[error("change feed closed")]
    FeedClosed,
    #[error("state lock poisoned: {0}")]
    LockPoisoned(String),
}

impl CalendarError {
    pub fn invalid_event(
        event_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidEvent {
            event_id: event_id.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}
