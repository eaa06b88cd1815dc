//! Dose logging, stock and caregiver access integration tests.

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use dosewatch_core::models::{permissions, DoseStatus};
use dosewatch_core::requests::{CreatePrescriptionRequest, LogDoseRequest, ReportRequest};
use dosewatch_core::{Actor, CareService, CoreError, DateWindow, Database, Medication, Patient, Settings};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    day(d).and_hms_opt(h, m, 0).unwrap()
}

struct Fixture {
    db: Database,
    settings: Settings,
    patient: Patient,
}

impl Fixture {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Rosa".into(), at(1, 0, 0));
        db.insert_patient(&patient).unwrap();
        Self {
            db,
            settings: Settings::default(),
            patient,
        }
    }

    fn service(&self) -> CareService<'_> {
        CareService::new(&self.db, &self.settings)
    }

    fn me(&self) -> Actor {
        Actor::Patient(self.patient.id.clone())
    }

    fn medication(&self, name: &str) -> Medication {
        let med = Medication::new(name.into()).with_generic(name.to_lowercase());
        self.db.upsert_medication(&med).unwrap();
        med
    }

    /// Prescription from day 1 with doses materialized for days 1..=days.
    fn prescription(&self, slots: &[&str], stock: u32, threshold: u32, days: u32) -> String {
        let med = self.medication("Metformin");
        let rx = self
            .service()
            .create_prescription(
                &self.me(),
                CreatePrescriptionRequest {
                    patient_id: self.patient.id.clone(),
                    medication_id: med.id,
                    dosage: "500 mg".into(),
                    time_slots: slots.iter().map(|s| s.to_string()).collect(),
                    route: Some("oral".into()),
                    start_date: day(1),
                    end_date: None,
                    duration_days: None,
                    initial_stock: stock,
                    low_stock_threshold: threshold,
                },
                at(1, 0, 0),
            )
            .unwrap();
        self.service()
            .expand_schedule(&rx.id, &DateWindow::new(day(1), day(days)).unwrap(), at(1, 0, 0))
            .unwrap();
        rx.id
    }

    fn dose_ids(&self, from: u32, to: u32) -> Vec<String> {
        self.db
            .list_doses_for_patient(&self.patient.id, &at(from, 0, 0), &at(to, 23, 59))
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect()
    }
}

#[test]
fn test_taken_dose_decrements_stock_in_one_step() {
    let fx = Fixture::new();
    let rx_id = fx.prescription(&["08:00"], 10, 2, 1);
    let dose_id = &fx.dose_ids(1, 1)[0];

    let taken = fx
        .service()
        .log_dose_taken(&fx.me(), &LogDoseRequest::new(dose_id.clone()), at(1, 8, 5))
        .unwrap();
    assert_eq!(taken.dose.status, DoseStatus::Taken);
    assert_eq!(taken.dose.taken_at, Some(at(1, 8, 5)));
    assert_eq!(taken.stock.remaining, 9);
    assert_eq!(fx.db.get_prescription(&rx_id).unwrap().unwrap().current_stock, 9);
}

#[test]
fn test_terminal_doses_stay_terminal() {
    let fx = Fixture::new();
    let rx_id = fx.prescription(&["08:00"], 10, 2, 3);
    let ids = fx.dose_ids(1, 3);
    let service = fx.service();

    service
        .log_dose_taken(&fx.me(), &LogDoseRequest::new(ids[0].clone()), at(3, 9, 0))
        .unwrap();
    service.mark_dose_missed(&fx.me(), &ids[1], None).unwrap();
    service.skip_dose(&fx.me(), &ids[2], Some("nausea")).unwrap();

    for id in &ids {
        let relog = service.log_dose_taken(&fx.me(), &LogDoseRequest::new(id.clone()), at(3, 9, 0));
        assert!(matches!(relog, Err(CoreError::InvalidState(_))), "{id}");
        assert!(matches!(
            service.mark_dose_missed(&fx.me(), id, None),
            Err(CoreError::InvalidState(_))
        ));
    }
    // Only the one taken dose consumed stock
    assert_eq!(fx.db.get_prescription(&rx_id).unwrap().unwrap().current_stock, 9);
}

#[test]
fn test_last_unit_then_insufficient_stock() {
    let fx = Fixture::new();
    let rx_id = fx.prescription(&["08:00", "20:00"], 3, 0, 2);
    let ids = fx.dose_ids(1, 2);
    let service = fx.service();

    for id in &ids[..3] {
        service
            .log_dose_taken(&fx.me(), &LogDoseRequest::new(id.clone()), at(2, 21, 0))
            .unwrap();
    }
    let err = service
        .log_dose_taken(&fx.me(), &LogDoseRequest::new(ids[3].clone()), at(2, 21, 0))
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientStock(_)));

    // Rolled back: the dose is still pending and stock never went negative
    assert_eq!(fx.db.get_dose(&ids[3]).unwrap().unwrap().status, DoseStatus::Pending);
    assert_eq!(fx.db.get_prescription(&rx_id).unwrap().unwrap().current_stock, 0);

    fx.service().restock(&fx.me(), &rx_id, 30, at(2, 22, 0)).unwrap();
    service
        .log_dose_taken(&fx.me(), &LogDoseRequest::new(ids[3].clone()), at(2, 22, 0))
        .unwrap();
}

#[test]
fn test_future_taken_at_rejected() {
    let fx = Fixture::new();
    fx.prescription(&["08:00"], 10, 2, 1);
    let mut request = LogDoseRequest::new(fx.dose_ids(1, 1)[0].clone());
    request.taken_at = Some(at(1, 12, 0));
    let err = fx.service().log_dose_taken(&fx.me(), &request, at(1, 9, 0)).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[test]
fn test_view_only_caregiver_cannot_mark() {
    let fx = Fixture::new();
    let rx_id = fx.prescription(&["08:00"], 10, 2, 1);
    let dose_id = fx.dose_ids(1, 1)[0].clone();
    let service = fx.service();

    let grant = service
        .invite_caregiver(
            &fx.me(),
            "carer-9",
            &[
                permissions::ADHERENCE_VIEW.to_string(),
                permissions::MEDICATIONS_VIEW.to_string(),
            ],
            at(1, 0, 0),
        )
        .unwrap();
    let carer = Actor::Caregiver("carer-9".into());

    // Pending grant confers nothing
    let report_request = ReportRequest {
        patient_id: fx.patient.id.clone(),
        period_start: day(1),
        period_end: day(1),
    };
    assert!(matches!(
        service.adherence_report(&carer, &report_request),
        Err(CoreError::Unauthorized(_))
    ));

    service.accept_invitation(&carer, &grant.id, at(1, 1, 0)).unwrap();
    assert!(service.adherence_report(&carer, &report_request).is_ok());

    let err = service
        .log_dose_taken(&carer, &LogDoseRequest::new(dose_id.clone()), at(1, 8, 0))
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
    assert_eq!(fx.db.get_dose(&dose_id).unwrap().unwrap().status, DoseStatus::Pending);
    assert_eq!(fx.db.get_prescription(&rx_id).unwrap().unwrap().current_stock, 10);

    // Granting the key takes effect on the next call
    service
        .set_grant_permissions(&fx.me(), &grant.id, &[permissions::ADHERENCE_MARK.to_string()], at(1, 2, 0))
        .unwrap();
    service
        .log_dose_taken(&carer, &LogDoseRequest::new(dose_id), at(1, 8, 0))
        .unwrap();
}

#[test]
fn test_foreign_patient_dose_is_not_found() {
    let fx = Fixture::new();
    fx.prescription(&["08:00"], 10, 2, 1);
    let dose_id = fx.dose_ids(1, 1)[0].clone();

    let stranger = Patient::new("Other".into(), at(1, 0, 0));
    fx.db.insert_patient(&stranger).unwrap();
    let err = fx
        .service()
        .log_dose_taken(&Actor::Patient(stranger.id), &LogDoseRequest::new(dose_id), at(1, 9, 0))
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn test_adherence_report_counts() {
    let fx = Fixture::new();
    fx.prescription(&["08:00", "20:00"], 20, 2, 2);
    let ids = fx.dose_ids(1, 2);
    let service = fx.service();

    // Punctual, late by 3h, missed, left pending
    service
        .log_dose_taken(
            &fx.me(),
            &LogDoseRequest { dose_id: ids[0].clone(), taken_at: Some(at(1, 8, 30)), notes: None },
            at(2, 21, 0),
        )
        .unwrap();
    service
        .log_dose_taken(
            &fx.me(),
            &LogDoseRequest { dose_id: ids[1].clone(), taken_at: Some(at(1, 23, 0)), notes: None },
            at(2, 21, 0),
        )
        .unwrap();
    service.mark_dose_missed(&fx.me(), &ids[2], None).unwrap();

    let report = service
        .adherence_report(
            &fx.me(),
            &ReportRequest {
                patient_id: fx.patient.id.clone(),
                period_start: day(1),
                period_end: day(2),
            },
        )
        .unwrap();
    assert_eq!(report.prescriptions.len(), 1);
    let counts = report.totals;
    assert_eq!((counts.scheduled, counts.taken, counts.missed, counts.pending), (4, 2, 1, 1));
    assert_eq!(counts.punctuality_rate(), Some(0.5));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_stock_is_initial_minus_taken(initial in 0u32..8, attempts in 0usize..10) {
        let fx = Fixture::new();
        let rx_id = fx.prescription(&["06:00", "12:00", "18:00"], initial, 0, 4);
        let ids = fx.dose_ids(1, 4);
        let service = fx.service();

        let mut taken = 0u32;
        for id in ids.iter().take(attempts) {
            match service.log_dose_taken(&fx.me(), &LogDoseRequest::new(id.clone()), at(5, 0, 0)) {
                Ok(_) => taken += 1,
                Err(CoreError::InsufficientStock(_)) => prop_assert_eq!(taken, initial),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
        let stock = fx.db.get_prescription(&rx_id).unwrap().unwrap().current_stock;
        prop_assert_eq!(stock, initial - taken);
        prop_assert_eq!(taken, initial.min(attempts as u32));
    }
}
