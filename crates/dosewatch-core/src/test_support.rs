//! Fixtures shared by unit tests.

use chrono::{NaiveDate, NaiveDateTime};

use crate::db::Database;
use crate::models::{
    parse_time_slots, AlertSeverity, InteractionAlert, Medication, Patient, Prescription,
};

/// A timestamp in January 2025.
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

/// Fixed "current time" for tests: 2025-01-10 09:00.
pub fn now() -> NaiveDateTime {
    at(10, 9, 0)
}

pub fn seed_patient(db: &Database, name: &str) -> Patient {
    let patient = Patient::new(name.into(), now());
    db.insert_patient(&patient).unwrap();
    patient
}

pub fn seed_medication(db: &Database, name: &str) -> Medication {
    let med = Medication::new(name.into()).with_generic(name.to_lowercase());
    db.upsert_medication(&med).unwrap();
    med
}

/// Active prescription starting 2025-01-01 with no end date.
pub fn seed_prescription(
    db: &Database,
    patient: &Patient,
    med: &Medication,
    slots: &[&str],
    stock: u32,
    threshold: u32,
) -> Prescription {
    let rx = Prescription::new(
        patient.id.clone(),
        med.id.clone(),
        "1 tablet".into(),
        parse_time_slots(slots).unwrap(),
        day(1),
        now(),
    )
    .with_stock(stock, threshold);
    db.insert_prescription(&rx).unwrap();
    rx
}

pub fn make_alert(
    patient_id: &str,
    medication_1_id: &str,
    medication_2_id: &str,
    severity: AlertSeverity,
) -> InteractionAlert {
    InteractionAlert {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: patient_id.to_string(),
        medication_1_id: medication_1_id.to_string(),
        medication_2_id: medication_2_id.to_string(),
        severity,
        description: "Increased bleeding risk.".into(),
        recommendation: "Consult your doctor.".into(),
        detected_at: now(),
        acknowledged_at: None,
    }
}
