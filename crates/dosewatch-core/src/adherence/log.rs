//! Dose lifecycle: taken, missed, skipped.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::stock::{StockChange, StockLedger};
use crate::access::{Actor, PermissionGate};
use crate::db::{resolve_pending_dose, Database, OwnedDose};
use crate::error::{CoreError, CoreResult};
use crate::models::{permissions, DoseInstance, DoseStatus};

/// A dose confirmed taken, with the stock movement it caused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakenDose {
    pub dose: DoseInstance,
    pub patient_id: String,
    pub stock: StockChange,
}

/// Owns the `pending -> {taken, missed, skipped}` transitions.
///
/// Re-resolving a terminal dose is an `InvalidState` error; it never
/// silently succeeds and never moves stock twice.
pub struct AdherenceLog<'a> {
    db: &'a Database,
    gate: PermissionGate<'a>,
}

impl<'a> AdherenceLog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            gate: PermissionGate::new(db),
        }
    }

    /// Confirm a dose taken and take one unit from stock, atomically.
    ///
    /// `taken_at` defaults to `now`. With no stock left the whole change is
    /// rolled back and the dose stays `pending`.
    pub fn log_taken(
        &self,
        dose_id: &str,
        actor: &Actor,
        taken_at: Option<NaiveDateTime>,
        notes: Option<&str>,
        now: NaiveDateTime,
    ) -> CoreResult<TakenDose> {
        let taken_at = taken_at.unwrap_or(now);
        if taken_at > now {
            return Err(CoreError::Validation(format!(
                "taken_at {taken_at} is in the future"
            )));
        }
        let owned = self.load_for(dose_id, actor)?;

        let tx = self.db.transaction()?;
        if !resolve_pending_dose(&tx, dose_id, DoseStatus::Taken, Some(&taken_at), notes)? {
            return Err(already_resolved(dose_id));
        }
        let stock = StockLedger::decrement(&tx, &owned.dose.prescription_id)?;
        tx.commit()?;

        tracing::info!(
            dose_id,
            prescription_id = %owned.dose.prescription_id,
            remaining = stock.remaining,
            crossed_low_threshold = stock.crossed_low_threshold,
            "dose logged taken"
        );

        Ok(TakenDose {
            dose: self.reload(dose_id)?,
            patient_id: owned.patient_id,
            stock,
        })
    }

    /// Mark a pending dose missed. Stock is untouched.
    pub fn mark_missed(
        &self,
        dose_id: &str,
        actor: &Actor,
        notes: Option<&str>,
    ) -> CoreResult<DoseInstance> {
        self.resolve_without_stock(dose_id, actor, DoseStatus::Missed, notes)
    }

    /// Mark a pending dose deliberately skipped. Stock is untouched.
    pub fn skip(&self, dose_id: &str, actor: &Actor, notes: Option<&str>) -> CoreResult<DoseInstance> {
        self.resolve_without_stock(dose_id, actor, DoseStatus::Skipped, notes)
    }

    fn resolve_without_stock(
        &self,
        dose_id: &str,
        actor: &Actor,
        status: DoseStatus,
        notes: Option<&str>,
    ) -> CoreResult<DoseInstance> {
        self.load_for(dose_id, actor)?;
        if !self.db.resolve_pending_dose(dose_id, status, None, notes)? {
            return Err(already_resolved(dose_id));
        }
        tracing::info!(dose_id, status = status.as_str(), "dose resolved");
        self.reload(dose_id)
    }

    /// Load a dose and check the actor may resolve it.
    fn load_for(&self, dose_id: &str, actor: &Actor) -> CoreResult<OwnedDose> {
        let owned = self
            .db
            .get_owned_dose(dose_id)?
            .ok_or_else(|| CoreError::NotFound(format!("dose {dose_id}")))?;

        match self
            .gate
            .authorize(actor, &owned.patient_id, permissions::ADHERENCE_MARK)
        {
            Err(CoreError::NotFound(_)) => Err(CoreError::NotFound(format!("dose {dose_id}"))),
            other => other,
        }?;

        if owned.dose.status.is_terminal() {
            return Err(already_resolved(dose_id));
        }
        Ok(owned)
    }

    fn reload(&self, dose_id: &str) -> CoreResult<DoseInstance> {
        self.db
            .get_dose(dose_id)?
            .ok_or_else(|| CoreError::NotFound(format!("dose {dose_id}")))
    }
}

fn already_resolved(dose_id: &str) -> CoreError {
    CoreError::InvalidState(format!("dose {dose_id} is no longer pending"))
}
