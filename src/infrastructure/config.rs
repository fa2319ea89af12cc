use crate::infrastructure::error::CalendarError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const ENGINE_JSON: &str = "engine.json";
const SUPPORTED_SCHEMA: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub schema: u8,
    pub time_zone: String,
    pub refresh_interval_seconds: u64,
    pub display_start_hour: u32,
    pub display_end_hour: u32,
    pub slot_minutes: u32,
    pub new_event_minutes: u32,
    pub hidden_calendar_ids: Vec<String>,
    pub change_feed_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            time_zone: "UTC".to_string(),
            refresh_interval_seconds: 60,
            display_start_hour: 8,
            display_end_hour: 20,
            slot_minutes: 30,
            new_event_minutes: 60,
            hidden_calendar_ids: Vec::new(),
            change_feed_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), CalendarError> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(CalendarError::InvalidConfig(format!(
                "unsupported schema {}",
                self.schema
            )));
        }
        self.tz()?;
        if self.display_end_hour > 24 || self.display_end_hour <= self.display_start_hour {
            return Err(CalendarError::InvalidConfig(format!(
                "display window {}..{} is not a valid hour range",
                self.display_start_hour, self.display_end_hour
            )));
        }
        if self.refresh_interval_seconds == 0 {
            return Err(CalendarError::InvalidConfig(
                "refreshIntervalSeconds must be positive".to_string(),
            ));
        }
        if self.slot_minutes == 0 || self.new_event_minutes == 0 {
            return Err(CalendarError::InvalidConfig(
                "slotMinutes and newEventMinutes must be positive".to_string(),
            ));
        }
        if self.change_feed_capacity == 0 {
            return Err(CalendarError::InvalidConfig(
                "changeFeedCapacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, CalendarError> {
        self.time_zone.trim().parse::<Tz>().map_err(|error| {
            CalendarError::InvalidConfig(format!("invalid timeZone '{}': {error}", self.time_zone))
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), CalendarError> {
    let path = config_dir.join(ENGINE_JSON);
    if !path.exists() {
        fs::create_dir_all(config_dir)?;
        let formatted = serde_json::to_string_pretty(&EngineConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<EngineConfig, CalendarError> {
    let path = config_dir.join(ENGINE_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CalendarError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != u64::from(SUPPORTED_SCHEMA) {
        return Err(CalendarError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let config: EngineConfig = serde_json::from_value(parsed)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_config(dir.path()).expect("write defaults");

        let loaded = load_config(dir.path()).expect("load defaults");
        assert_eq!(loaded, EngineConfig::default());
        assert_eq!(loaded.refresh_interval(), Duration::from_secs(60));

        fs::write(
            dir.path().join(ENGINE_JSON),
            "{\"schema\":1,\"timeZone\":\"Europe/Madrid\",\"hiddenCalendarIds\":[\"holidays\"]}\n",
        )
        .expect("overwrite config");
        ensure_default_config(dir.path()).expect("keeps existing file");

        let loaded = load_config(dir.path()).expect("load custom");
        assert_eq!(loaded.time_zone, "Europe/Madrid");
        assert_eq!(loaded.hidden_calendar_ids, vec!["holidays".to_string()]);
        assert_eq!(loaded.display_start_hour, 8);
    }

    #[test]
    fn load_rejects_missing_or_unknown_schema() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join(ENGINE_JSON), "{\"timeZone\":\"UTC\"}").expect("write");
        assert!(matches!(load_config(dir.path()), Err(CalendarError::InvalidConfig(_))));

        fs::write(dir.path().join(ENGINE_JSON), "{\"schema\":2}").expect("write");
        assert!(matches!(load_config(dir.path()), Err(CalendarError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let bad_zone = EngineConfig {
            time_zone: "Mars/Olympus".to_string(),
            ..EngineConfig::default()
        };
        assert!(bad_zone.validate().is_err());

        let inverted_window = EngineConfig {
            display_start_hour: 20,
            display_end_hour: 8,
            ..EngineConfig::default()
        };
        assert!(inverted_window.validate().is_err());

        let no_refresh = EngineConfig {
            refresh_interval_seconds: 0,
            ..EngineConfig::default()
        };
        assert!(no_refresh.validate().is_err());
    }
}
