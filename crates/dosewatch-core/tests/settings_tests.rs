//! Settings files and on-disk databases.

use std::io::Write;

use chrono::{NaiveDate, NaiveTime};
use tempfile::{NamedTempFile, TempDir};

use dosewatch_core::notify::load_preferences;
use dosewatch_core::{CoreError, Database, Medication, Patient, Settings};

#[test]
fn test_settings_file_overrides_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "missed_grace_hours": 12,
            "reminder_window_days": 3,
            "default_quiet_hours_start": "22:00",
            "default_quiet_hours_end": "07:00"
        }}"#
    )
    .unwrap();

    let settings = Settings::from_json_file(file.path()).unwrap();
    assert_eq!(settings.missed_grace_hours, 12);
    assert_eq!(settings.reminder_window_days, 3);
    // Unspecified keys keep their defaults
    assert_eq!(settings.dispatch_batch_size, Settings::default().dispatch_batch_size);

    let quiet = settings.default_quiet_hours().unwrap().unwrap();
    assert_eq!(quiet.start, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
    assert!(quiet.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
}

#[test]
fn test_invalid_settings_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "sweep_batch_size": 0 }}"#).unwrap();
    assert!(matches!(
        Settings::from_json_file(file.path()),
        Err(CoreError::Validation(_))
    ));

    assert!(Settings::from_json_str(r#"{ "default_quiet_hours_start": "22:00" }"#).is_err());
    assert!(Settings::from_json_str(r#"{ "default_quiet_hours_start": "25:00", "default_quiet_hours_end": "07:00" }"#).is_err());
    assert!(Settings::from_json_file("/nonexistent/dosewatch.json").is_err());
}

#[test]
fn test_huge_reminder_window_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "reminder_window_days": 100000 }}"#).unwrap();
    assert!(matches!(
        Settings::from_json_file(file.path()),
        Err(CoreError::Validation(_))
    ));
}

#[test]
fn test_default_quiet_hours_apply_without_stored_preferences() {
    let settings = Settings::from_json_str(
        r#"{ "default_quiet_hours_start": "23:00", "default_quiet_hours_end": "06:00" }"#,
    )
    .unwrap();
    let db = Database::open_in_memory().unwrap();
    let now = NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    let patient = Patient::new("Rosa".into(), now);
    db.insert_patient(&patient).unwrap();

    let prefs = load_preferences(&db, &patient.id, &settings).unwrap();
    assert!(prefs.push_enabled);
    assert_eq!(
        prefs.quiet_hours.map(|q| q.end),
        Some(NaiveTime::from_hms_opt(6, 0, 0).unwrap())
    );
}

#[test]
fn test_database_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dosewatch.db");
    let now = NaiveDate::from_ymd_opt(2025, 3, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();

    let patient = Patient::new("Rosa".into(), now);
    let med = Medication::new("Warfarin".into());
    {
        let db = Database::open(&path).unwrap();
        db.insert_patient(&patient).unwrap();
        db.upsert_medication(&med).unwrap();
    }

    // Reopening runs the schema setup again without clobbering rows
    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_patient(&patient.id).unwrap().unwrap().name, "Rosa");
    assert_eq!(db.get_medication(&med.id).unwrap().unwrap().name, "Warfarin");
}
