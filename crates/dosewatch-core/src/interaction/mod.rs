//! Interaction detection and alert deduplication.
//!
//! Pipeline: active medications → candidate pairs → classifier verdicts →
//! severity normalization → deduplicated alerts.

mod dedup;
mod detector;

pub use dedup::{recommendation_for, AlertDeduplicator, AlertRepository};
pub use detector::{candidate_pairs, Detection, DetectionReport, InteractionDetector};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use dosewatch_classifier::Severity;

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{AlertSeverity, Medication};

/// Source of a patient's active medication set.
pub trait MedicationCatalog {
    /// Medications of the patient's active prescriptions running on `on`.
    fn find_active_medications_for_patient(
        &self,
        patient_id: &str,
        on: NaiveDate,
    ) -> CoreResult<Vec<Medication>>;
}

impl MedicationCatalog for Database {
    fn find_active_medications_for_patient(
        &self,
        patient_id: &str,
        on: NaiveDate,
    ) -> CoreResult<Vec<Medication>> {
        let today = on.format("%Y-%m-%d").to_string();
        let mut medications = Vec::new();
        for id in self.active_medication_ids(patient_id, &today)? {
            let medication = self
                .get_medication(&id)?
                .ok_or_else(|| CoreError::NotFound(format!("medication {id}")))?;
            medications.push(medication);
        }
        Ok(medications)
    }
}

/// A qualifying interaction between two of a patient's medications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub medication_1_id: String,
    pub medication_2_id: String,
    pub severity: AlertSeverity,
    pub description: String,
}

impl AlertSeverity {
    /// Alert level for a normalized severity; `None` for findings that are
    /// discarded (`none`, `minor`).
    pub fn from_normalized(severity: Severity) -> Option<Self> {
        match severity {
            Severity::None | Severity::Minor => None,
            Severity::Mild => Some(AlertSeverity::Mild),
            Severity::Moderate => Some(AlertSeverity::Moderate),
            Severity::Severe => Some(AlertSeverity::Severe),
            Severity::Contraindicated => Some(AlertSeverity::Contraindicated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{day, seed_medication, seed_patient, seed_prescription};

    #[test]
    fn test_alert_levels() {
        assert_eq!(AlertSeverity::from_normalized(Severity::Minor), None);
        assert_eq!(AlertSeverity::from_normalized(Severity::None), None);
        assert_eq!(
            AlertSeverity::from_normalized(Severity::Contraindicated),
            Some(AlertSeverity::Contraindicated)
        );
    }

    #[test]
    fn test_catalog_skips_discontinued_and_ended() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_patient(&db, "Ana");
        let warfarin = seed_medication(&db, "Warfarin");
        let aspirin = seed_medication(&db, "Aspirin");
        let ibuprofen = seed_medication(&db, "Ibuprofen");

        seed_prescription(&db, &patient, &warfarin, &["08:00"], 10, 2);
        // Same medication twice counts once
        seed_prescription(&db, &patient, &warfarin, &["20:00"], 10, 2);

        let ended = seed_prescription(&db, &patient, &aspirin, &["08:00"], 10, 2);
        db.conn()
            .execute(
                "UPDATE prescriptions SET end_date = '2025-01-03' WHERE id = ?",
                [&ended.id],
            )
            .unwrap();

        let stopped = seed_prescription(&db, &patient, &ibuprofen, &["08:00"], 10, 2);
        db.deactivate_prescription(&stopped.id, &crate::test_support::now())
            .unwrap();

        let active = db.find_active_medications_for_patient(&patient.id, day(10)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, warfarin.id);

        // Before the aspirin course ended
        let earlier = db.find_active_medications_for_patient(&patient.id, day(2)).unwrap();
        assert_eq!(earlier.len(), 2);
    }
}
