//! Runtime settings.
//!
//! Every tunable the jobs and services use lives here. Settings load from an
//! optional JSON file; missing keys fall back to the defaults below.

use std::path::Path;

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::QuietHours;

/// Application-level constants
pub const APP_NAME: &str = "dosewatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest reminder window a scheduling run will expand.
pub const MAX_REMINDER_WINDOW_DAYS: u32 = 366;

/// Default log filter for binaries.
pub fn default_log_filter() -> &'static str {
    "dosewatch_core=info,dosewatch_jobs=info"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Max distance between slot and intake for a dose to count as punctual
    pub punctuality_tolerance_minutes: i64,
    /// Age after which a pending dose is swept to missed
    pub missed_grace_hours: i64,
    /// Max doses examined per sweep run
    pub sweep_batch_size: usize,
    /// Max notifications sent per dispatch run
    pub dispatch_batch_size: usize,
    /// Pending notifications older than this are expired instead of sent
    pub expiry_horizon_minutes: i64,
    /// Days ahead for which reminders are scheduled
    pub reminder_window_days: u32,
    /// Per-pair classifier timeout
    pub classifier_timeout_ms: u64,
    /// Pairs classified concurrently
    pub classifier_batch_size: usize,
    /// Max patients handled per bulk scheduling run
    pub schedule_batch_size: usize,
    /// Quiet hours applied to patients without stored preferences (`HH:MM`)
    pub default_quiet_hours_start: Option<String>,
    pub default_quiet_hours_end: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            punctuality_tolerance_minutes: 60,
            missed_grace_hours: 24,
            sweep_batch_size: 500,
            dispatch_batch_size: 100,
            expiry_horizon_minutes: 360,
            reminder_window_days: 7,
            classifier_timeout_ms: 5_000,
            classifier_batch_size: 16,
            schedule_batch_size: 200,
            default_quiet_hours_start: None,
            default_quiet_hours_end: None,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Validation(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> CoreResult<Self> {
        let settings: Settings = serde_json::from_str(raw)
            .map_err(|e| CoreError::Validation(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no job can run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.punctuality_tolerance_minutes < 0 {
            return Err(CoreError::Validation(
                "punctuality_tolerance_minutes must not be negative".into(),
            ));
        }
        if self.missed_grace_hours <= 0 || self.expiry_horizon_minutes <= 0 {
            return Err(CoreError::Validation(
                "missed_grace_hours and expiry_horizon_minutes must be positive".into(),
            ));
        }
        if self.sweep_batch_size == 0
            || self.dispatch_batch_size == 0
            || self.classifier_batch_size == 0
            || self.schedule_batch_size == 0
        {
            return Err(CoreError::Validation("batch sizes must be positive".into()));
        }
        if self.reminder_window_days == 0 || self.reminder_window_days > MAX_REMINDER_WINDOW_DAYS {
            return Err(CoreError::Validation(format!(
                "reminder_window_days must be between 1 and {MAX_REMINDER_WINDOW_DAYS}"
            )));
        }
        self.default_quiet_hours()?;
        Ok(())
    }

    pub fn punctuality_tolerance(&self) -> Duration {
        Duration::minutes(self.punctuality_tolerance_minutes)
    }

    pub fn missed_grace(&self) -> Duration {
        Duration::hours(self.missed_grace_hours)
    }

    pub fn expiry_horizon(&self) -> Duration {
        Duration::minutes(self.expiry_horizon_minutes)
    }

    pub fn classifier_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.classifier_timeout_ms)
    }

    /// Parsed default quiet hours; both ends must be given together.
    pub fn default_quiet_hours(&self) -> CoreResult<Option<QuietHours>> {
        match (&self.default_quiet_hours_start, &self.default_quiet_hours_end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Ok(Some(QuietHours::new(
                parse_clock(start)?,
                parse_clock(end)?,
            ))),
            _ => Err(CoreError::Validation(
                "default quiet hours need both start and end".into(),
            )),
        }
    }
}

fn parse_clock(raw: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| CoreError::Validation(format!("invalid time '{raw}', expected HH:MM")))
}
