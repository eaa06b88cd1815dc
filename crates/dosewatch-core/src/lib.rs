//! Dosewatch Core Library
//!
//! Medication adherence tracking, drug interaction alerts and notification
//! scheduling over a local SQLite store.
//!
//! # Architecture
//!
//! ```text
//!  Prescription created
//!          │
//!          ▼
//!  ScheduleExpander ──► dose instances ──► NotificationScheduler (reminders)
//!          │
//!  Dose logged (PermissionGate)
//!          │
//!  ┌───────▼────────────────────────────┐
//!  │  pending → taken  +  stock - 1     │  one transaction
//!  └───────┬────────────────────────────┘
//!          │ after commit
//!          ├──► low-stock notification (once per crossing)
//!          └──► InteractionDetector ──► AlertDeduplicator ──► alert notification
//!
//!  Jobs: MissedDoseSweeper, NotificationScheduler::schedule_all,
//!        NotificationDispatcher
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Prescription, DoseInstance, InteractionAlert, etc.)
//! - [`schedule`]: Dose expansion and the missed-dose sweeper
//! - [`adherence`]: Dose logging, stock ledger, adherence reports
//! - [`interaction`]: Interaction detection and alert deduplication
//! - [`notify`]: Notification scheduling and dispatch
//! - [`access`]: Caregiver permission gate
//! - [`service`]: Facade used by the jobs binary and the FFI object

pub mod access;
pub mod adherence;
pub mod config;
pub mod db;
pub mod error;
pub mod interaction;
pub mod models;
pub mod notify;
pub mod requests;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use access::{Actor, PermissionGate};
pub use config::Settings;
pub use db::Database;
pub use error::{CoreError, CoreResult};
pub use models::{
    AlertSeverity, DateWindow, DoseInstance, DoseStatus, InteractionAlert, Medication,
    Notification, NotificationPreference, Patient, Prescription,
};
pub use service::CareService;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use notify::{DeliveryError, DeliveryProvider};
use requests::{CreatePrescriptionRequest, LogDoseRequest, ReportRequest, ScheduleTarget};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum DoseWatchError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<CoreError> for DoseWatchError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => DoseWatchError::InvalidInput(msg),
            CoreError::NotFound(msg) => DoseWatchError::NotFound(msg),
            CoreError::Unauthorized(msg) => DoseWatchError::Unauthorized(msg),
            CoreError::InvalidState(msg) => DoseWatchError::InvalidState(msg),
            CoreError::InsufficientStock(msg) => DoseWatchError::InsufficientStock(msg),
            CoreError::Conflict(msg) => DoseWatchError::Conflict(msg),
            CoreError::CollaboratorUnavailable(msg) => DoseWatchError::Unavailable(msg),
            CoreError::Database(e) => DoseWatchError::DatabaseError(e.to_string()),
        }
    }
}

impl From<db::DbError> for DoseWatchError {
    fn from(e: db::DbError) -> Self {
        DoseWatchError::DatabaseError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DoseWatchError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        DoseWatchError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// `settings_json` overrides the default settings when given.
#[uniffi::export]
pub fn open_database(
    path: String,
    settings_json: Option<String>,
) -> Result<Arc<DoseWatchCore>, DoseWatchError> {
    let db = Database::open(&path)?;
    let settings = match settings_json {
        Some(raw) => Settings::from_json_str(&raw)?,
        None => Settings::default(),
    };
    Ok(Arc::new(DoseWatchCore {
        db: Arc::new(Mutex::new(db)),
        settings,
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<DoseWatchCore>, DoseWatchError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(DoseWatchCore {
        db: Arc::new(Mutex::new(db)),
        settings: Settings::default(),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
///
/// Times are the device's local wall clock.
#[derive(uniffi::Object)]
pub struct DoseWatchCore {
    db: Arc<Mutex<Database>>,
    settings: Settings,
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[uniffi::export]
impl DoseWatchCore {
    // =========================================================================
    // Catalog & Patients
    // =========================================================================

    /// Add or update a catalog medication.
    pub fn upsert_medication(&self, medication: FfiMedication) -> Result<(), DoseWatchError> {
        let db = self.db.lock()?;
        db.upsert_medication(&medication.into())?;
        Ok(())
    }

    /// Create a new patient.
    pub fn create_patient(&self, name: String) -> Result<FfiPatient, DoseWatchError> {
        let db = self.db.lock()?;
        let patient = Patient::new(name, local_now());
        db.insert_patient(&patient)?;
        Ok(patient.into())
    }

    // =========================================================================
    // Prescriptions
    // =========================================================================

    pub fn create_prescription(
        &self,
        actor: FfiActor,
        request: FfiPrescriptionRequest,
    ) -> Result<FfiPrescription, DoseWatchError> {
        let db = self.db.lock()?;
        let request = request.try_into()?;
        let prescription = CareService::new(&db, &self.settings).create_prescription(
            &actor.into(),
            request,
            local_now(),
        )?;
        Ok(prescription.into())
    }

    pub fn discontinue_prescription(
        &self,
        actor: FfiActor,
        prescription_id: String,
    ) -> Result<FfiPrescription, DoseWatchError> {
        let db = self.db.lock()?;
        let prescription = CareService::new(&db, &self.settings).discontinue_prescription(
            &actor.into(),
            &prescription_id,
            local_now(),
        )?;
        Ok(prescription.into())
    }

    /// Add units to stock; returns the new stock.
    pub fn restock(
        &self,
        actor: FfiActor,
        prescription_id: String,
        units: u32,
    ) -> Result<u32, DoseWatchError> {
        let db = self.db.lock()?;
        Ok(CareService::new(&db, &self.settings).restock(
            &actor.into(),
            &prescription_id,
            units,
            local_now(),
        )?)
    }

    // =========================================================================
    // Doses
    // =========================================================================

    /// Confirm a dose taken. `taken_at` is `YYYY-MM-DD HH:MM:SS`, default now.
    pub fn log_dose_taken(
        &self,
        actor: FfiActor,
        dose_id: String,
        taken_at: Option<String>,
        notes: Option<String>,
    ) -> Result<FfiTakenDose, DoseWatchError> {
        let db = self.db.lock()?;
        let request = LogDoseRequest {
            dose_id,
            taken_at: taken_at.as_deref().map(parse_timestamp).transpose()?,
            notes,
        };
        let taken = CareService::new(&db, &self.settings).log_dose_taken(
            &actor.into(),
            &request,
            local_now(),
        )?;
        Ok(FfiTakenDose {
            dose: taken.dose.into(),
            remaining_stock: taken.stock.remaining,
            low_stock: taken.stock.crossed_low_threshold,
        })
    }

    pub fn mark_dose_missed(
        &self,
        actor: FfiActor,
        dose_id: String,
        notes: Option<String>,
    ) -> Result<FfiDose, DoseWatchError> {
        let db = self.db.lock()?;
        let dose = CareService::new(&db, &self.settings).mark_dose_missed(
            &actor.into(),
            &dose_id,
            notes.as_deref(),
        )?;
        Ok(dose.into())
    }

    pub fn skip_dose(
        &self,
        actor: FfiActor,
        dose_id: String,
        notes: Option<String>,
    ) -> Result<FfiDose, DoseWatchError> {
        let db = self.db.lock()?;
        let dose = CareService::new(&db, &self.settings).skip_dose(
            &actor.into(),
            &dose_id,
            notes.as_deref(),
        )?;
        Ok(dose.into())
    }

    /// Adherence over `[period_start, period_end]` (`YYYY-MM-DD`).
    pub fn adherence_report(
        &self,
        actor: FfiActor,
        patient_id: String,
        period_start: String,
        period_end: String,
    ) -> Result<FfiAdherenceReport, DoseWatchError> {
        let db = self.db.lock()?;
        let request = ReportRequest {
            patient_id,
            period_start: parse_date(&period_start)?,
            period_end: parse_date(&period_end)?,
        };
        let report = CareService::new(&db, &self.settings).adherence_report(&actor.into(), &request)?;
        Ok(report.into())
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Check all of a patient's active medication pairs.
    pub fn detect_interactions(&self, patient_id: String) -> Result<u32, DoseWatchError> {
        let db = self.db.lock()?;
        let report =
            CareService::new(&db, &self.settings).detect_and_alert(&patient_id, None, local_now())?;
        Ok(report.alerts_created as u32)
    }

    pub fn open_alerts(
        &self,
        actor: FfiActor,
        patient_id: String,
    ) -> Result<Vec<FfiAlert>, DoseWatchError> {
        let db = self.db.lock()?;
        let alerts = CareService::new(&db, &self.settings).open_alerts(&actor.into(), &patient_id)?;
        Ok(alerts.into_iter().map(|a| a.into()).collect())
    }

    pub fn acknowledge_alert(
        &self,
        actor: FfiActor,
        alert_id: String,
    ) -> Result<FfiAlert, DoseWatchError> {
        let db = self.db.lock()?;
        let alert = CareService::new(&db, &self.settings).acknowledge_alert(
            &actor.into(),
            &alert_id,
            local_now(),
        )?;
        Ok(alert.into())
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Schedule upcoming reminders for a patient. Returns how many were added.
    pub fn schedule_reminders(&self, patient_id: String) -> Result<u32, DoseWatchError> {
        let db = self.db.lock()?;
        let outcome = CareService::new(&db, &self.settings)
            .schedule_notifications(&ScheduleTarget::Patient(patient_id), local_now())?;
        Ok(outcome.scheduled as u32)
    }

    /// Hand due notifications to the app for local display.
    ///
    /// Returned notifications are recorded as sent.
    pub fn take_due_notifications(&self) -> Result<Vec<FfiNotification>, DoseWatchError> {
        let db = self.db.lock()?;
        let outbox = DeviceOutbox::default();
        CareService::new(&db, &self.settings)
            .with_delivery(&outbox)
            .dispatch_due_notifications(local_now())?;
        let delivered = outbox.delivered.into_inner()?;
        Ok(delivered.into_iter().map(|n| n.into()).collect())
    }

    pub fn mark_notification_read(
        &self,
        actor: FfiActor,
        notification_id: String,
    ) -> Result<(), DoseWatchError> {
        let db = self.db.lock()?;
        CareService::new(&db, &self.settings).mark_notification_read(
            &actor.into(),
            &notification_id,
            local_now(),
        )?;
        Ok(())
    }

    pub fn set_preferences(
        &self,
        actor: FfiActor,
        preferences: FfiPreferences,
    ) -> Result<(), DoseWatchError> {
        let db = self.db.lock()?;
        let preference = preferences.try_into()?;
        CareService::new(&db, &self.settings).update_preferences(&actor.into(), &preference)?;
        Ok(())
    }

    // =========================================================================
    // Caregivers
    // =========================================================================

    pub fn invite_caregiver(
        &self,
        actor: FfiActor,
        caregiver_id: String,
        permissions: Vec<String>,
    ) -> Result<FfiGrant, DoseWatchError> {
        let db = self.db.lock()?;
        let grant = CareService::new(&db, &self.settings).invite_caregiver(
            &actor.into(),
            &caregiver_id,
            &permissions,
            local_now(),
        )?;
        Ok(grant.into())
    }

    pub fn accept_invitation(
        &self,
        actor: FfiActor,
        grant_id: String,
    ) -> Result<FfiGrant, DoseWatchError> {
        let db = self.db.lock()?;
        let grant = CareService::new(&db, &self.settings).accept_invitation(
            &actor.into(),
            &grant_id,
            local_now(),
        )?;
        Ok(grant.into())
    }

    pub fn revoke_grant(&self, actor: FfiActor, grant_id: String) -> Result<FfiGrant, DoseWatchError> {
        let db = self.db.lock()?;
        let grant =
            CareService::new(&db, &self.settings).revoke_grant(&actor.into(), &grant_id, local_now())?;
        Ok(grant.into())
    }
}

/// Delivery for on-device display: the app shows what it is handed.
#[derive(Default)]
struct DeviceOutbox {
    delivered: Mutex<Vec<Notification>>,
}

impl DeliveryProvider for DeviceOutbox {
    fn send(
        &self,
        notification: &Notification,
        _channels: &[models::Channel],
    ) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, DoseWatchError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| DoseWatchError::InvalidInput(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, DoseWatchError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(|_| {
        DoseWatchError::InvalidInput(format!(
            "invalid timestamp '{raw}', expected YYYY-MM-DD HH:MM:SS"
        ))
    })
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe acting party.
#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiActor {
    Patient { id: String },
    Caregiver { id: String },
}

impl From<FfiActor> for Actor {
    fn from(actor: FfiActor) -> Self {
        match actor {
            FfiActor::Patient { id } => Actor::Patient(id),
            FfiActor::Caregiver { id } => Actor::Caregiver(id),
        }
    }
}

/// FFI-safe catalog medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
    pub active: bool,
}

impl From<FfiMedication> for Medication {
    fn from(med: FfiMedication) -> Self {
        Medication {
            id: med.id,
            name: med.name,
            generic_name: med.generic_name,
            active: med.active,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
        }
    }
}

/// FFI-safe prescription input. Dates are `YYYY-MM-DD`, slots `HH:MM`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionRequest {
    pub patient_id: String,
    pub medication_id: String,
    pub dosage: String,
    pub time_slots: Vec<String>,
    pub route: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duration_days: Option<u32>,
    pub initial_stock: u32,
    pub low_stock_threshold: u32,
}

impl TryFrom<FfiPrescriptionRequest> for CreatePrescriptionRequest {
    type Error = DoseWatchError;

    fn try_from(req: FfiPrescriptionRequest) -> Result<Self, Self::Error> {
        Ok(CreatePrescriptionRequest {
            patient_id: req.patient_id,
            medication_id: req.medication_id,
            dosage: req.dosage,
            time_slots: req.time_slots,
            route: req.route,
            start_date: parse_date(&req.start_date)?,
            end_date: req.end_date.as_deref().map(parse_date).transpose()?,
            duration_days: req.duration_days,
            initial_stock: req.initial_stock,
            low_stock_threshold: req.low_stock_threshold,
        })
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub id: String,
    pub patient_id: String,
    pub medication_id: String,
    pub dosage: String,
    pub time_slots: Vec<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub current_stock: u32,
    pub low_stock_threshold: u32,
    pub active: bool,
}

impl From<Prescription> for FfiPrescription {
    fn from(rx: Prescription) -> Self {
        Self {
            end_date: rx.effective_end_date().map(|d| d.to_string()),
            time_slots: rx.time_slots.iter().map(|s| s.to_string()).collect(),
            start_date: rx.start_date.to_string(),
            id: rx.id,
            patient_id: rx.patient_id,
            medication_id: rx.medication_id,
            dosage: rx.dosage,
            current_stock: rx.current_stock,
            low_stock_threshold: rx.low_stock_threshold,
            active: rx.active,
        }
    }
}

/// FFI-safe dose instance.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDose {
    pub id: String,
    pub prescription_id: String,
    pub scheduled_at: String,
    pub status: String,
    pub taken_at: Option<String>,
    pub notes: Option<String>,
}

impl From<DoseInstance> for FfiDose {
    fn from(dose: DoseInstance) -> Self {
        Self {
            id: dose.id,
            prescription_id: dose.prescription_id,
            scheduled_at: format_timestamp(dose.scheduled_at),
            status: dose.status.as_str().to_string(),
            taken_at: dose.taken_at.map(format_timestamp),
            notes: dose.notes,
        }
    }
}

/// FFI-safe result of logging a dose.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTakenDose {
    pub dose: FfiDose,
    pub remaining_stock: u32,
    /// Stock just crossed the low-stock threshold
    pub low_stock: bool,
}

/// FFI-safe per-prescription adherence.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionAdherence {
    pub prescription_id: String,
    pub scheduled: u32,
    pub taken: u32,
    pub missed: u32,
    pub skipped: u32,
    pub pending: u32,
    pub punctuality_rate: Option<f64>,
    pub adherence_rate: Option<f64>,
}

/// FFI-safe adherence report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAdherenceReport {
    pub patient_id: String,
    pub prescriptions: Vec<FfiPrescriptionAdherence>,
    pub punctuality_rate: Option<f64>,
    pub adherence_rate: Option<f64>,
}

impl From<adherence::AdherenceReport> for FfiAdherenceReport {
    fn from(report: adherence::AdherenceReport) -> Self {
        Self {
            punctuality_rate: report.totals.punctuality_rate(),
            adherence_rate: report.totals.adherence_rate(),
            patient_id: report.patient_id,
            prescriptions: report
                .prescriptions
                .into_iter()
                .map(|p| FfiPrescriptionAdherence {
                    prescription_id: p.prescription_id,
                    scheduled: p.counts.scheduled,
                    taken: p.counts.taken,
                    missed: p.counts.missed,
                    skipped: p.counts.skipped,
                    pending: p.counts.pending,
                    punctuality_rate: p.punctuality_rate,
                    adherence_rate: p.adherence_rate,
                })
                .collect(),
        }
    }
}

/// FFI-safe interaction alert.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlert {
    pub id: String,
    pub patient_id: String,
    pub medication_1_id: String,
    pub medication_2_id: String,
    pub severity: String,
    pub description: String,
    pub recommendation: String,
    pub detected_at: String,
    pub acknowledged_at: Option<String>,
}

impl From<InteractionAlert> for FfiAlert {
    fn from(alert: InteractionAlert) -> Self {
        Self {
            id: alert.id,
            patient_id: alert.patient_id,
            medication_1_id: alert.medication_1_id,
            medication_2_id: alert.medication_2_id,
            severity: alert.severity.as_str().to_string(),
            description: alert.description,
            recommendation: alert.recommendation,
            detected_at: format_timestamp(alert.detected_at),
            acknowledged_at: alert.acknowledged_at.map(format_timestamp),
        }
    }
}

/// FFI-safe notification.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNotification {
    pub id: String,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub scheduled_for: String,
}

impl From<Notification> for FfiNotification {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type.as_str().to_string(),
            title: n.title,
            body: n.body,
            scheduled_for: format_timestamp(n.scheduled_for),
        }
    }
}

/// FFI-safe notification preferences. Quiet hours are `HH:MM`.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPreferences {
    pub patient_id: String,
    pub medication_reminder: bool,
    pub low_stock: bool,
    pub interaction_alert: bool,
    pub system: bool,
    pub push_enabled: bool,
    pub whatsapp_enabled: bool,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
}

impl TryFrom<FfiPreferences> for NotificationPreference {
    type Error = DoseWatchError;

    fn try_from(p: FfiPreferences) -> Result<Self, Self::Error> {
        let clock = |raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|_| DoseWatchError::InvalidInput(format!("invalid time '{raw}'")))
        };
        let quiet_hours = match (p.quiet_hours_start.as_deref(), p.quiet_hours_end.as_deref()) {
            (None, None) => None,
            (Some(start), Some(end)) => Some(models::QuietHours::new(clock(start)?, clock(end)?)),
            _ => {
                return Err(DoseWatchError::InvalidInput(
                    "quiet hours need both start and end".into(),
                ))
            }
        };
        Ok(NotificationPreference {
            patient_id: p.patient_id,
            medication_reminder: p.medication_reminder,
            low_stock: p.low_stock,
            interaction_alert: p.interaction_alert,
            system: p.system,
            push_enabled: p.push_enabled,
            whatsapp_enabled: p.whatsapp_enabled,
            quiet_hours,
        })
    }
}

/// FFI-safe caregiver grant.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiGrant {
    pub id: String,
    pub caregiver_id: String,
    pub patient_id: String,
    pub status: String,
    pub permissions: Vec<String>,
}

impl From<models::CaregiverGrant> for FfiGrant {
    fn from(grant: models::CaregiverGrant) -> Self {
        Self {
            id: grant.id,
            caregiver_id: grant.caregiver_id,
            patient_id: grant.patient_id,
            status: grant.status.as_str().to_string(),
            permissions: grant.permissions.into_iter().collect(),
        }
    }
}
