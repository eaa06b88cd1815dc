//! Dose instance models (`MedicationLog`).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Dose lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    /// Due or overdue, not yet confirmed
    Pending,
    /// Confirmed taken
    Taken,
    /// Not taken; set explicitly or by the sweeper
    Missed,
    /// Deliberately skipped by the patient
    Skipped,
}

impl DoseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseStatus::Pending => "pending",
            DoseStatus::Taken => "taken",
            DoseStatus::Missed => "missed",
            DoseStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DoseStatus::Pending),
            "taken" => Some(DoseStatus::Taken),
            "missed" => Some(DoseStatus::Missed),
            "skipped" => Some(DoseStatus::Skipped),
            _ => None,
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DoseStatus::Pending)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: DoseStatus) -> bool {
        matches!(self, DoseStatus::Pending) && next.is_terminal()
    }
}

/// One concrete scheduled dose of a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoseInstance {
    /// Unique identifier
    pub id: String,
    /// Owning prescription
    pub prescription_id: String,
    /// Slot timestamp; immutable once created
    pub scheduled_at: NaiveDateTime,
    pub status: DoseStatus,
    pub taken_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl DoseInstance {
    /// Create a pending dose for a slot.
    pub fn new(prescription_id: String, scheduled_at: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prescription_id,
            scheduled_at,
            status: DoseStatus::Pending,
            taken_at: None,
            notes: None,
            created_at: now,
        }
    }

    /// Whether the dose was taken within `tolerance` of its slot.
    pub fn is_punctual(&self, tolerance: chrono::Duration) -> bool {
        match (self.status, self.taken_at) {
            (DoseStatus::Taken, Some(taken_at)) => {
                (taken_at - self.scheduled_at).abs() <= tolerance
            }
            _ => false,
        }
    }
}
