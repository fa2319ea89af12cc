use crate::domain::calendar_time::{local_date, midnight, shift_days, start_of_week};
use crate::domain::models::ActiveRange;
use crate::infrastructure::error::CalendarError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// The `[start, end)` window currently on screen.
#[derive(Debug, Clone)]
pub struct ActiveRangeState {
    current: ActiveRange,
    tz: Tz,
}

impl ActiveRangeState {
    /// Starts on the week containing `now`.
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            current: ActiveRange::week_containing(now, tz),
            tz,
        }
    }

    pub fn current(&self) -> ActiveRange {
        self.current
    }

    pub fn set_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ActiveRange, CalendarError> {
        if end <= start {
            return Err(CalendarError::Validation(
                "range end must be after range start".to_string(),
            ));
        }
        self.current = ActiveRange { start, end };
        Ok(self.current)
    }

    pub fn previous_week(&mut self) -> ActiveRange {
        self.shift_weeks(-1)
    }

    pub fn next_week(&mut self) -> ActiveRange {
        self.shift_weeks(1)
    }

    /// Moves relative to the week containing the current start, never wall-clock now.
    fn shift_weeks(&mut self, weeks: i64) -> ActiveRange {
        let monday = shift_days(start_of_week(local_date(self.current.start, self.tz)), weeks * 7);
        self.current = ActiveRange {
            start: midnight(monday, self.tz),
            end: midnight(shift_days(monday, 7), self.tz),
        };
        self.current
    }
}
