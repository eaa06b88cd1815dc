//! Schedule expansion.
//!
//! A prescription's daily slots are expanded over a day window into one dose
//! per (day, slot). The uniqueness key is the prescription plus the exact slot
//! timestamp, so expanding overlapping windows never duplicates a dose.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{Database, InsertOutcome};
use crate::error::CoreResult;
use crate::models::{DateWindow, DoseInstance, Prescription};

/// Result of materializing a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionOutcome {
    /// Doses inserted by this run
    pub created: usize,
    /// Doses that already existed
    pub existing: usize,
}

/// Slot timestamps a prescription should have within `window`, in order.
///
/// Empty for inactive prescriptions and for windows outside the course.
pub fn expand(prescription: &Prescription, window: &DateWindow) -> Vec<NaiveDateTime> {
    if !prescription.active {
        return Vec::new();
    }

    let first = window.start.max(prescription.start_date);
    let last = match prescription.effective_end_date() {
        Some(end) => window.end.min(end),
        None => window.end,
    };
    if first > last {
        return Vec::new();
    }

    first
        .iter_days()
        .take_while(|day| *day <= last)
        .flat_map(|day| prescription.time_slots.iter().map(move |slot| slot.on(day)))
        .collect()
}

/// Writes expanded doses to the store.
pub struct ScheduleExpander<'a> {
    db: &'a Database,
}

impl<'a> ScheduleExpander<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Ensure every dose of `window` exists. Safe to re-run.
    pub fn materialize(
        &self,
        prescription: &Prescription,
        window: &DateWindow,
        now: NaiveDateTime,
    ) -> CoreResult<ExpansionOutcome> {
        let slots = expand(prescription, window);
        let mut outcome = ExpansionOutcome::default();
        if slots.is_empty() {
            return Ok(outcome);
        }

        let tx = self.db.transaction()?;
        for scheduled_at in slots {
            let dose = DoseInstance::new(prescription.id.clone(), scheduled_at, now);
            match self.db.insert_dose_if_absent(&dose)? {
                InsertOutcome::Inserted => outcome.created += 1,
                InsertOutcome::AlreadyExists => outcome.existing += 1,
            }
        }
        tx.commit()?;

        tracing::debug!(
            prescription_id = %prescription.id,
            created = outcome.created,
            existing = outcome.existing,
            "schedule expanded"
        );
        Ok(outcome)
    }
}
