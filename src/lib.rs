pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::change_feed::{ChangeBatch, ChangeFeed, ChangeSubscription, EventChange, diff_event_sets};
pub use application::editing::EditSession;
pub use application::indexes::WeekIndexes;
pub use application::merger::{CanonicalEventSet, FetchFailure, MergeOutcome};
pub use application::session::{NowProvider, WeekViewSession};
pub use domain::calendar_time::DayKey;
pub use domain::category::{Category, categorize};
pub use domain::models::{ActiveRange, CalendarDescriptor, CalendarEvent, EventDraft, EventRange};
pub use infrastructure::calendar_gateway::{
    CalendarGateway, CalendarSummary, ListEventsRequest, ReqwestCalendarGateway,
};
pub use infrastructure::config::{EngineConfig, ensure_default_config, load_config};
pub use infrastructure::error::CalendarError;
pub use infrastructure::in_memory_gateway::InMemoryCalendarGateway;
pub use infrastructure::logging::init_tracing;
