use crate::domain::models::CalendarDescriptor;
use crate::infrastructure::calendar_gateway::CalendarSummary;

/// Known calendars and which of them are visible. Populated once per session.
#[derive(Debug, Clone, Default)]
pub struct CalendarSelection {
    calendars: Vec<CalendarDescriptor>,
}

impl CalendarSelection {
    pub fn from_listing(listing: Vec<CalendarSummary>, hidden_calendar_ids: &[String]) -> Self {
        let calendars = listing
            .into_iter()
            .map(|summary| {
                let is_active = !hidden_calendar_ids.iter().any(|hidden| hidden == &summary.id);
                CalendarDescriptor {
                    id: summary.id,
                    name: summary.name,
                    is_active,
                }
            })
            .collect();
        Self { calendars }
    }

    pub fn calendars(&self) -> &[CalendarDescriptor] {
        &self.calendars
    }

    pub fn get(&self, calendar_id: &str) -> Option<&CalendarDescriptor> {
        self.calendars.iter().find(|calendar| calendar.id == calendar_id)
    }

    /// Flips `is_active` of the matching calendar. Unknown ids are ignored;
    /// returns whether anything changed.
    pub fn toggle(&mut self, calendar_id: &str) -> bool {
        match self
            .calendars
            .iter_mut()
            .find(|calendar| calendar.id == calendar_id)
        {
            Some(calendar) => {
                calendar.is_active = !calendar.is_active;
                true
            }
            None => false,
        }
    }

    /// Active calendar ids in listing order.
    pub fn active_ids(&self) -> Vec<String> {
        self.calendars
            .iter()
            .filter(|calendar| calendar.is_active)
            .map(|calendar| calendar.id.clone())
            .collect()
    }

    /// Calendar that new events go to: the first active one, else the first listed.
    pub fn default_calendar_id(&self) -> Option<&str> {
        self.calendars
            .iter()
            .find(|calendar| calendar.is_active)
            .or_else(|| self.calendars.first())
            .map(|calendar| calendar.id.as_str())
    }
}
