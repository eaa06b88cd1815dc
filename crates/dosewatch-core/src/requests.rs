//! Typed, validated inputs for service operations.
//!
//! Each request checks its own fields before any storage is touched.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::{parse_time_slots, DateWindow, Prescription};

/// New prescription for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: String,
    pub medication_id: String,
    pub dosage: String,
    /// `HH:MM` slots, any order
    pub time_slots: Vec<String>,
    #[serde(default)]
    pub route: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    pub initial_stock: u32,
    pub low_stock_threshold: u32,
}

impl CreatePrescriptionRequest {
    /// Validate and build the prescription.
    pub fn into_prescription(self, now: NaiveDateTime) -> CoreResult<Prescription> {
        require("patient_id", &self.patient_id)?;
        require("medication_id", &self.medication_id)?;
        require("dosage", &self.dosage)?;
        if self.time_slots.is_empty() {
            return Err(CoreError::Validation("at least one time slot is required".into()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(CoreError::Validation(format!(
                    "end_date {end} is before start_date {}",
                    self.start_date
                )));
            }
        }
        if self.duration_days == Some(0) {
            return Err(CoreError::Validation("duration_days must be positive".into()));
        }

        let mut prescription = Prescription::new(
            self.patient_id,
            self.medication_id,
            self.dosage.trim().to_string(),
            parse_time_slots(&self.time_slots)?,
            self.start_date,
            now,
        )
        .with_stock(self.initial_stock, self.low_stock_threshold);
        prescription.route = self.route.filter(|r| !r.trim().is_empty());
        prescription.end_date = self.end_date;
        prescription.duration_days = self.duration_days;
        Ok(prescription)
    }
}

/// Confirmation of a dose taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogDoseRequest {
    pub dose_id: String,
    /// Defaults to now
    #[serde(default)]
    pub taken_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LogDoseRequest {
    pub fn new(dose_id: impl Into<String>) -> Self {
        Self {
            dose_id: dose_id.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        require("dose_id", &self.dose_id)?;
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(CoreError::Validation(format!(
                    "notes exceed {MAX_NOTES_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

const MAX_NOTES_LEN: usize = 1_000;

/// Period for an adherence report, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub patient_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl ReportRequest {
    pub fn window(&self) -> CoreResult<DateWindow> {
        require("patient_id", &self.patient_id)?;
        DateWindow::new(self.period_start, self.period_end)
    }
}

/// What to schedule reminders for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ScheduleTarget {
    Patient(String),
    Prescription(String),
}

fn require(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
