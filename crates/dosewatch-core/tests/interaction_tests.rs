//! Interaction detection and alert lifecycle integration tests.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use dosewatch_classifier::{
    ClassifierError, ClassifierResult, DrugRef, InteractionClassifier, RuleTableClassifier, Verdict,
};
use dosewatch_core::models::{NotificationType, Prescription, TimeSlot};
use dosewatch_core::{Actor, AlertSeverity, CareService, CoreError, Database, Medication, Patient, Settings};

fn at(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn setup() -> (Database, Patient) {
    let db = Database::open_in_memory().unwrap();
    let patient = Patient::new("Rosa".into(), at(1, 0));
    db.insert_patient(&patient).unwrap();
    (db, patient)
}

fn add_medication(db: &Database, patient: &Patient, name: &str) -> Medication {
    let med = Medication::new(name.into()).with_generic(name.to_lowercase());
    db.upsert_medication(&med).unwrap();
    let rx = Prescription::new(
        patient.id.clone(),
        med.id.clone(),
        "1 tablet".into(),
        vec![TimeSlot::new(8, 0).unwrap()],
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        at(1, 0),
    )
    .with_stock(30, 5);
    db.insert_prescription(&rx).unwrap();
    med
}

/// Classifier that is never reachable.
struct OfflineClassifier;

impl InteractionClassifier for OfflineClassifier {
    fn classify(&self, _a: &DrugRef, _b: &DrugRef) -> ClassifierResult<Verdict> {
        Err(ClassifierError::Unavailable("connection refused".into()))
    }
}

#[test]
fn test_one_open_alert_per_pair_until_acknowledged() {
    let (db, patient) = setup();
    let settings = Settings::default();
    let service = CareService::new(&db, &settings);
    let me = Actor::Patient(patient.id.clone());
    add_medication(&db, &patient, "Warfarin");
    add_medication(&db, &patient, "Aspirin");

    let first = service.detect_and_alert(&patient.id, None, at(2, 9)).unwrap();
    assert_eq!(first.pairs_evaluated, 1);
    assert_eq!(first.alerts_created, 1);
    assert_eq!(first.notifications_scheduled, 1);

    // Same risk, still open: nothing new
    let again = service.detect_and_alert(&patient.id, None, at(2, 10)).unwrap();
    assert_eq!(again.alerts_created, 0);
    assert_eq!(service.open_alerts(&me, &patient.id).unwrap().len(), 1);

    let alert = &service.open_alerts(&me, &patient.id).unwrap()[0];
    assert_eq!(alert.severity, AlertSeverity::Severe);
    service.acknowledge_alert(&me, &alert.id, at(2, 11)).unwrap();
    assert!(service.open_alerts(&me, &patient.id).unwrap().is_empty());

    // Resolved and reappearing: alert again, with its own notification
    let after = service.detect_and_alert(&patient.id, None, at(3, 9)).unwrap();
    assert_eq!(after.alerts_created, 1);
    assert_eq!(after.notifications_scheduled, 1);

    let alert_notifications = db
        .list_notifications_for_patient(&patient.id, 20)
        .unwrap()
        .into_iter()
        .filter(|n| n.notification_type == NotificationType::InteractionAlert)
        .count();
    assert_eq!(alert_notifications, 2);
}

#[test]
fn test_focus_medication_only_pairs_with_itself() {
    let (db, patient) = setup();
    let settings = Settings::default();
    let service = CareService::new(&db, &settings);
    add_medication(&db, &patient, "Warfarin");
    add_medication(&db, &patient, "Aspirin");
    let omeprazole = add_medication(&db, &patient, "Omeprazole");

    let report = service
        .detect_and_alert(&patient.id, Some(&omeprazole.id), at(2, 9))
        .unwrap();
    assert_eq!(report.pairs_evaluated, 2);
    assert_eq!(report.alerts_created, 0);
}

#[test]
fn test_unavailable_classifier_defers_without_alerting() {
    let (db, patient) = setup();
    let settings = Settings::default();
    let service = CareService::new(&db, &settings).with_classifier(Arc::new(OfflineClassifier));
    add_medication(&db, &patient, "Warfarin");
    add_medication(&db, &patient, "Aspirin");

    let report = service.detect_and_alert(&patient.id, None, at(2, 9)).unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.pairs_evaluated, 0);
    assert_eq!(report.alerts_created, 0);

    // A later run with a working classifier picks the pair up
    let report = CareService::new(&db, &settings)
        .with_classifier(Arc::new(RuleTableClassifier::with_common_rules()))
        .detect_and_alert(&patient.id, None, at(2, 10))
        .unwrap();
    assert_eq!(report.alerts_created, 1);
}

#[test]
fn test_acknowledge_requires_alert_permission() {
    let (db, patient) = setup();
    let settings = Settings::default();
    let service = CareService::new(&db, &settings);
    let me = Actor::Patient(patient.id.clone());
    add_medication(&db, &patient, "Warfarin");
    add_medication(&db, &patient, "Aspirin");
    service.detect_and_alert(&patient.id, None, at(2, 9)).unwrap();
    let alert_id = service.open_alerts(&me, &patient.id).unwrap()[0].id.clone();

    let grant = service
        .invite_caregiver(&me, "carer-1", &["patient.medications.view".to_string()], at(2, 9))
        .unwrap();
    let carer = Actor::Caregiver("carer-1".into());
    service.accept_invitation(&carer, &grant.id, at(2, 9)).unwrap();

    assert!(matches!(
        service.acknowledge_alert(&carer, &alert_id, at(2, 10)),
        Err(CoreError::Unauthorized(_))
    ));

    let stranger = Patient::new("Other".into(), at(1, 0));
    db.insert_patient(&stranger).unwrap();
    assert!(matches!(
        service.acknowledge_alert(&Actor::Patient(stranger.id), &alert_id, at(2, 10)),
        Err(CoreError::NotFound(_))
    ));
}
