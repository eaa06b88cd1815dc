//! Service facade.
//!
//! [`CareService`] wires the components together for callers: the CLI jobs,
//! the FFI object and integration tests. Every patient-scoped operation takes
//! the acting party and authorizes it first.
//!
//! Follow-up work after a committed write (reminders, low-stock notices,
//! interaction checks) is best effort: failures are logged, never returned,
//! so a recorded dose is not reported as failed.

use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};

use dosewatch_classifier::{InteractionClassifier, RuleTableClassifier};

use crate::access::{Actor, PermissionGate};
use crate::adherence::{build_report, AdherenceLog, AdherenceReport, StockLedger, TakenDose};
use crate::config::Settings;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::interaction::{AlertDeduplicator, DetectionReport, InteractionDetector};
use crate::models::{
    permissions, CaregiverGrant, DateWindow, DoseInstance, InteractionAlert, Notification,
    NotificationPreference, Prescription,
};
use crate::notify::{
    load_preferences, DeliveryProvider, DispatchReport, NotificationDispatcher,
    NotificationScheduler, ScheduleOutcome,
};
use crate::requests::{CreatePrescriptionRequest, LogDoseRequest, ReportRequest, ScheduleTarget};
use crate::schedule::{ExpansionOutcome, MissedDoseSweeper, ScheduleExpander, SweepReport};

pub struct CareService<'a> {
    db: &'a Database,
    settings: &'a Settings,
    classifier: Arc<dyn InteractionClassifier>,
    delivery: Option<&'a dyn DeliveryProvider>,
}

impl<'a> CareService<'a> {
    /// Service with the built-in rule table classifier and no delivery
    /// provider.
    pub fn new(db: &'a Database, settings: &'a Settings) -> Self {
        Self {
            db,
            settings,
            classifier: Arc::new(RuleTableClassifier::with_common_rules()),
            delivery: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn InteractionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_delivery(mut self, delivery: &'a dyn DeliveryProvider) -> Self {
        self.delivery = Some(delivery);
        self
    }

    fn gate(&self) -> PermissionGate<'a> {
        PermissionGate::new(self.db)
    }

    fn scheduler(&self) -> NotificationScheduler<'a> {
        NotificationScheduler::new(self.db, self.settings)
    }

    // =========================================================================
    // Prescriptions
    // =========================================================================

    /// Create a prescription, schedule its reminders and check it against the
    /// patient's other medications.
    pub fn create_prescription(
        &self,
        actor: &Actor,
        request: CreatePrescriptionRequest,
        now: NaiveDateTime,
    ) -> CoreResult<Prescription> {
        self.gate()
            .authorize(actor, &request.patient_id, permissions::MEDICATIONS_EDIT)?;
        if self.db.get_patient(&request.patient_id)?.is_none() {
            return Err(CoreError::NotFound(format!("patient {}", request.patient_id)));
        }
        let medication = self
            .db
            .get_medication(&request.medication_id)?
            .ok_or_else(|| CoreError::NotFound(format!("medication {}", request.medication_id)))?;
        if !medication.active {
            return Err(CoreError::Validation(format!(
                "medication {} is not in the active catalog",
                medication.id
            )));
        }

        let prescription = request.into_prescription(now)?;
        self.db.insert_prescription(&prescription)?;
        tracing::info!(
            prescription_id = %prescription.id,
            patient_id = %prescription.patient_id,
            medication_id = %prescription.medication_id,
            "prescription created"
        );

        if let Err(e) = self.schedule_prescription(&prescription, now) {
            tracing::warn!(prescription_id = %prescription.id, error = %e, "initial reminder scheduling failed");
        }
        self.detect_after_commit(&prescription.patient_id, &prescription.medication_id, now);
        Ok(prescription)
    }

    /// Soft-deactivate a prescription. Future pending doses are skipped and
    /// their pending reminders expired.
    pub fn discontinue_prescription(
        &self,
        actor: &Actor,
        prescription_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<Prescription> {
        let prescription = self.load_prescription(actor, prescription_id, permissions::MEDICATIONS_EDIT)?;
        if !prescription.active {
            return Ok(prescription);
        }

        let tx = self.db.transaction()?;
        self.db.deactivate_prescription(prescription_id, &now)?;
        let skipped = self
            .db
            .skip_future_pending_doses(prescription_id, &now, "prescription discontinued")?;
        let expired = self.db.expire_pending_for_prescription(prescription_id)?;
        tx.commit()?;

        tracing::info!(prescription_id, skipped, expired, "prescription discontinued");
        self.db
            .get_prescription(prescription_id)?
            .ok_or_else(|| CoreError::NotFound(format!("prescription {prescription_id}")))
    }

    /// Add units to a prescription's stock. Returns the new stock.
    pub fn restock(
        &self,
        actor: &Actor,
        prescription_id: &str,
        units: u32,
        now: NaiveDateTime,
    ) -> CoreResult<u32> {
        self.load_prescription(actor, prescription_id, permissions::MEDICATIONS_EDIT)?;
        StockLedger::restock(self.db, prescription_id, units, now)
    }

    /// Materialize the doses of a prescription within `window`.
    pub fn expand_schedule(
        &self,
        prescription_id: &str,
        window: &DateWindow,
        now: NaiveDateTime,
    ) -> CoreResult<ExpansionOutcome> {
        let prescription = self
            .db
            .get_prescription(prescription_id)?
            .ok_or_else(|| CoreError::NotFound(format!("prescription {prescription_id}")))?;
        ScheduleExpander::new(self.db).materialize(&prescription, window, now)
    }

    // =========================================================================
    // Doses
    // =========================================================================

    /// Confirm a dose taken.
    pub fn log_dose_taken(
        &self,
        actor: &Actor,
        request: &LogDoseRequest,
        now: NaiveDateTime,
    ) -> CoreResult<TakenDose> {
        request.validate()?;
        let taken = AdherenceLog::new(self.db).log_taken(
            &request.dose_id,
            actor,
            request.taken_at,
            request.notes(),
            now,
        )?;

        if taken.stock.crossed_low_threshold {
            if let Err(e) = self.notify_low_stock(&taken, now) {
                tracing::warn!(prescription_id = %taken.stock.prescription_id, error = %e, "low-stock notification failed");
            }
        }
        match self.db.get_prescription(&taken.dose.prescription_id) {
            Ok(Some(prescription)) => {
                self.detect_after_commit(&taken.patient_id, &prescription.medication_id, now)
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "interaction re-check skipped"),
        }
        Ok(taken)
    }

    pub fn mark_dose_missed(
        &self,
        actor: &Actor,
        dose_id: &str,
        notes: Option<&str>,
    ) -> CoreResult<DoseInstance> {
        AdherenceLog::new(self.db).mark_missed(dose_id, actor, notes)
    }

    pub fn skip_dose(
        &self,
        actor: &Actor,
        dose_id: &str,
        notes: Option<&str>,
    ) -> CoreResult<DoseInstance> {
        AdherenceLog::new(self.db).skip(dose_id, actor, notes)
    }

    /// Sweep stale pending doses to missed, at most `budget` of them.
    pub fn sweep_missed_doses(&self, now: NaiveDateTime, budget: usize) -> CoreResult<SweepReport> {
        MissedDoseSweeper::new(self.db, self.settings).sweep(now, budget)
    }

    pub fn adherence_report(&self, actor: &Actor, request: &ReportRequest) -> CoreResult<AdherenceReport> {
        let period = request.window()?;
        self.gate()
            .authorize(actor, &request.patient_id, permissions::ADHERENCE_VIEW)?;

        let prescriptions = self.db.list_prescriptions_for_patient(&request.patient_id)?;
        let doses = self.db.list_doses_for_patient(
            &request.patient_id,
            &period.start.and_time(NaiveTime::MIN),
            &end_of_day(period.end),
        )?;
        Ok(build_report(
            &request.patient_id,
            period,
            &prescriptions,
            &doses,
            self.settings.punctuality_tolerance(),
        ))
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    /// Classify the patient's active medication pairs and raise alerts for
    /// new findings.
    pub fn detect_and_alert(
        &self,
        patient_id: &str,
        focus_medication_id: Option<&str>,
        now: NaiveDateTime,
    ) -> CoreResult<DetectionReport> {
        let detector = InteractionDetector::new(self.db, Arc::clone(&self.classifier), self.settings);
        let detection = detector.detect(patient_id, focus_medication_id, now.date())?;
        let alerts = AlertDeduplicator::new(self.db).process(patient_id, &detection.findings, now)?;

        let mut report = detection.report;
        report.alerts_created = alerts.len();
        if !alerts.is_empty() {
            let prefs = load_preferences(self.db, patient_id, self.settings)?;
            for alert in &alerts {
                match self.scheduler().schedule_for_alert(alert, &prefs, now) {
                    Ok(outcome) => report.notifications_scheduled += outcome.scheduled,
                    Err(e) => {
                        tracing::warn!(alert_id = %alert.id, error = %e, "alert notification failed");
                    }
                }
            }
        }
        Ok(report)
    }

    /// Close an open alert. The same pair can alert again afterwards.
    pub fn acknowledge_alert(
        &self,
        actor: &Actor,
        alert_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<InteractionAlert> {
        let alert = self
            .db
            .get_interaction_alert(alert_id)?
            .ok_or_else(|| CoreError::NotFound(format!("alert {alert_id}")))?;
        self.gate()
            .authorize(actor, &alert.patient_id, permissions::ALERTS_MANAGE)
            .map_err(|e| not_found_as(e, "alert", alert_id))?;

        if !self.db.acknowledge_interaction_alert(alert_id, &now)? {
            return Err(CoreError::InvalidState(format!(
                "alert {alert_id} is already acknowledged"
            )));
        }
        tracing::info!(alert_id, patient_id = %alert.patient_id, "alert acknowledged");
        self.db
            .get_interaction_alert(alert_id)?
            .ok_or_else(|| CoreError::NotFound(format!("alert {alert_id}")))
    }

    pub fn open_alerts(&self, actor: &Actor, patient_id: &str) -> CoreResult<Vec<InteractionAlert>> {
        self.gate()
            .authorize(actor, patient_id, permissions::MEDICATIONS_VIEW)?;
        Ok(self.db.list_open_interaction_alerts(patient_id)?)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Schedule reminders for one patient or one prescription.
    pub fn schedule_notifications(
        &self,
        target: &ScheduleTarget,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        match target {
            ScheduleTarget::Patient(patient_id) => self.scheduler().schedule_for_patient(patient_id, now),
            ScheduleTarget::Prescription(prescription_id) => {
                let prescription = self
                    .db
                    .get_prescription(prescription_id)?
                    .ok_or_else(|| CoreError::NotFound(format!("prescription {prescription_id}")))?;
                if !prescription.active {
                    return Err(CoreError::InvalidState(format!(
                        "prescription {prescription_id} is discontinued"
                    )));
                }
                self.schedule_prescription(&prescription, now)
            }
        }
    }

    /// Schedule reminders for every eligible patient, one bounded batch.
    pub fn schedule_all_notifications(&self, now: NaiveDateTime) -> CoreResult<ScheduleOutcome> {
        self.scheduler()
            .schedule_all(now, self.settings.schedule_batch_size)
    }

    pub fn dispatch_due_notifications(&self, now: NaiveDateTime) -> CoreResult<DispatchReport> {
        let provider = self.delivery.ok_or_else(|| {
            CoreError::CollaboratorUnavailable("no delivery provider configured".into())
        })?;
        NotificationDispatcher::new(self.db, self.settings, provider).dispatch(now)
    }

    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        notification_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<Notification> {
        let notification = self.load_notification(notification_id)?;
        self.gate()
            .authorize(actor, &notification.patient_id, permissions::NOTIFICATIONS_MANAGE)
            .map_err(|e| not_found_as(e, "notification", notification_id))?;
        if !self.db.mark_notification_read(notification_id, &now)? {
            return Err(CoreError::InvalidState(format!(
                "notification {notification_id} is {}, not sent",
                notification.status.as_str()
            )));
        }
        self.load_notification(notification_id)
    }

    /// Operator action: put a failed notification back in the queue.
    pub fn requeue_failed_notification(
        &self,
        notification_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<Notification> {
        let provider: &dyn DeliveryProvider = match self.delivery {
            Some(provider) => provider,
            None => &NoDelivery,
        };
        NotificationDispatcher::new(self.db, self.settings, provider).requeue_failed(notification_id, now)
    }

    pub fn update_preferences(
        &self,
        actor: &Actor,
        preference: &NotificationPreference,
    ) -> CoreResult<()> {
        self.gate().authorize(
            actor,
            &preference.patient_id,
            permissions::NOTIFICATIONS_MANAGE,
        )?;
        Ok(self.db.upsert_notification_preference(preference)?)
    }

    // =========================================================================
    // Caregivers
    // =========================================================================

    /// A patient invites a caregiver.
    pub fn invite_caregiver(
        &self,
        actor: &Actor,
        caregiver_id: &str,
        keys: &[String],
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let Actor::Patient(patient_id) = actor else {
            return Err(CoreError::Unauthorized("only patients invite caregivers".into()));
        };
        self.gate().invite(caregiver_id, patient_id, keys, now)
    }

    /// The invited caregiver accepts.
    pub fn accept_invitation(
        &self,
        actor: &Actor,
        grant_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let grant = self.gate().load(grant_id)?;
        match actor {
            Actor::Caregiver(id) if *id == grant.caregiver_id => self.gate().activate(grant_id, now),
            _ => Err(CoreError::Unauthorized(format!(
                "grant {grant_id} belongs to another caregiver"
            ))),
        }
    }

    /// Either side ends the relationship.
    pub fn revoke_grant(
        &self,
        actor: &Actor,
        grant_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let grant = self.gate().load(grant_id)?;
        let allowed = match actor {
            Actor::Patient(id) => *id == grant.patient_id,
            Actor::Caregiver(id) => *id == grant.caregiver_id,
        };
        if !allowed {
            return Err(CoreError::Unauthorized(format!("not a party to grant {grant_id}")));
        }
        self.gate().revoke(grant_id, now)
    }

    /// The patient changes what a caregiver may do.
    pub fn set_grant_permissions(
        &self,
        actor: &Actor,
        grant_id: &str,
        keys: &[String],
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let grant = self.gate().load(grant_id)?;
        if *actor != Actor::Patient(grant.patient_id.clone()) {
            return Err(CoreError::Unauthorized(format!(
                "only the patient edits grant {grant_id}"
            )));
        }
        self.gate().set_permissions(grant_id, keys, now)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn schedule_prescription(
        &self,
        prescription: &Prescription,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        let prefs = load_preferences(self.db, &prescription.patient_id, self.settings)?;
        let window = DateWindow::starting(now.date(), self.settings.reminder_window_days);
        self.scheduler()
            .schedule_for_prescription(prescription, &prefs, &window, now)
    }

    fn notify_low_stock(&self, taken: &TakenDose, now: NaiveDateTime) -> CoreResult<()> {
        let prescription = self
            .db
            .get_prescription(&taken.stock.prescription_id)?
            .ok_or_else(|| CoreError::NotFound(format!("prescription {}", taken.stock.prescription_id)))?;
        let prefs = load_preferences(self.db, &taken.patient_id, self.settings)?;
        self.scheduler().schedule_low_stock(&prescription, &prefs, now)?;
        Ok(())
    }

    fn detect_after_commit(&self, patient_id: &str, medication_id: &str, now: NaiveDateTime) {
        match self.detect_and_alert(patient_id, Some(medication_id), now) {
            Ok(report) if report.deferred > 0 => {
                tracing::warn!(patient_id, deferred = report.deferred, "interaction pairs deferred");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(patient_id, error = %e, "interaction check failed"),
        }
    }

    fn load_prescription(
        &self,
        actor: &Actor,
        prescription_id: &str,
        permission: &str,
    ) -> CoreResult<Prescription> {
        let prescription = self
            .db
            .get_prescription(prescription_id)?
            .ok_or_else(|| CoreError::NotFound(format!("prescription {prescription_id}")))?;
        self.gate()
            .authorize(actor, &prescription.patient_id, permission)
            .map_err(|e| not_found_as(e, "prescription", prescription_id))?;
        Ok(prescription)
    }

    fn load_notification(&self, notification_id: &str) -> CoreResult<Notification> {
        self.db
            .get_notification(notification_id)?
            .ok_or_else(|| CoreError::NotFound(format!("notification {notification_id}")))
    }
}

/// Foreign records read as missing records of the requested kind.
fn not_found_as(err: CoreError, kind: &str, id: &str) -> CoreError {
    match err {
        CoreError::NotFound(_) => CoreError::NotFound(format!("{kind} {id}")),
        other => other,
    }
}

fn end_of_day(date: chrono::NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// Stand-in provider for operations that never deliver.
struct NoDelivery;

impl DeliveryProvider for NoDelivery {
    fn send(
        &self,
        _notification: &Notification,
        _channels: &[crate::models::Channel],
    ) -> Result<(), crate::notify::DeliveryError> {
        Err(crate::notify::DeliveryError::Unavailable("no delivery provider configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DoseStatus, NotificationStatus, NotificationType};
    use crate::test_support::{at, day, now, seed_medication, seed_patient};

    fn rx_request(patient_id: &str, medication_id: &str, slots: &[&str], stock: u32) -> CreatePrescriptionRequest {
        CreatePrescriptionRequest {
            patient_id: patient_id.into(),
            medication_id: medication_id.into(),
            dosage: "1 tablet".into(),
            time_slots: slots.iter().map(|s| s.to_string()).collect(),
            route: None,
            start_date: day(10),
            end_date: None,
            duration_days: None,
            initial_stock: stock,
            low_stock_threshold: 5,
        }
    }

    #[test]
    fn test_create_prescription_schedules_and_detects() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings {
            reminder_window_days: 2,
            ..Settings::default()
        };
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        let actor = Actor::Patient(patient.id.clone());
        let warfarin = seed_medication(&db, "Warfarin");
        let aspirin = seed_medication(&db, "Aspirin");

        service
            .create_prescription(&actor, rx_request(&patient.id, &warfarin.id, &["20:00"], 30), now())
            .unwrap();
        assert!(service.open_alerts(&actor, &patient.id).unwrap().is_empty());

        service
            .create_prescription(&actor, rx_request(&patient.id, &aspirin.id, &["20:00"], 30), now())
            .unwrap();
        let alerts = service.open_alerts(&actor, &patient.id).unwrap();
        assert_eq!(alerts.len(), 1);

        let notifications = db.list_notifications_for_patient(&patient.id, 50).unwrap();
        let reminders = notifications
            .iter()
            .filter(|n| n.notification_type == NotificationType::MedicationReminder)
            .count();
        // Two prescriptions, 20:00 on day 10 and day 11
        assert_eq!(reminders, 4);
        assert!(notifications
            .iter()
            .any(|n| n.alert_id.as_deref() == Some(alerts[0].id.as_str())));
    }

    #[test]
    fn test_create_rejects_unknown_medication_and_foreign_patient() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let ana = seed_patient(&db, "Ana");
        let ben = seed_patient(&db, "Ben");
        let med = seed_medication(&db, "Metformin");

        let err = service
            .create_prescription(&Actor::Patient(ana.id.clone()), rx_request(&ana.id, "nope", &["08:00"], 5), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = service
            .create_prescription(&Actor::Patient(ben.id), rx_request(&ana.id, &med.id, &["08:00"], 5), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_log_taken_crossing_threshold_notifies_once() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        let actor = Actor::Patient(patient.id.clone());
        let med = seed_medication(&db, "Metformin");
        let mut request = rx_request(&patient.id, &med.id, &["08:00"], 7);
        request.start_date = day(1);
        let rx = service.create_prescription(&actor, request, at(1, 0, 0)).unwrap();
        service
            .expand_schedule(&rx.id, &DateWindow::new(day(1), day(4)).unwrap(), now())
            .unwrap();

        for d in 1..=4 {
            let dose = db.get_dose_at(&rx.id, &at(d, 8, 0)).unwrap().unwrap();
            service
                .log_dose_taken(&actor, &LogDoseRequest::new(dose.id), now())
                .unwrap();
        }

        let low_stock: Vec<_> = db
            .list_notifications_for_patient(&patient.id, 100)
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::LowStock)
            .collect();
        // 7 -> 6 -> 5 crosses, 4 and 3 do not re-notify
        assert_eq!(low_stock.len(), 1);
        assert_eq!(db.get_prescription(&rx.id).unwrap().unwrap().current_stock, 3);
    }

    #[test]
    fn test_discontinue_skips_future_doses() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        let actor = Actor::Patient(patient.id.clone());
        let med = seed_medication(&db, "Metformin");
        let rx = service
            .create_prescription(&actor, rx_request(&patient.id, &med.id, &["20:00"], 10), now())
            .unwrap();

        let stopped = service.discontinue_prescription(&actor, &rx.id, now()).unwrap();
        assert!(!stopped.active);

        let dose = db.get_dose_at(&rx.id, &at(10, 20, 0)).unwrap().unwrap();
        assert_eq!(dose.status, DoseStatus::Skipped);
        assert!(db
            .list_notifications_for_patient(&patient.id, 50)
            .unwrap()
            .iter()
            .all(|n| n.status == NotificationStatus::Expired));

        let err = service
            .schedule_notifications(&ScheduleTarget::Prescription(rx.id.clone()), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_acknowledge_twice_is_invalid_state() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        let actor = Actor::Patient(patient.id.clone());
        let a = seed_medication(&db, "Warfarin");
        let b = seed_medication(&db, "Aspirin");
        let alert = crate::test_support::make_alert(&patient.id, &a.id, &b.id, crate::models::AlertSeverity::Severe);
        db.insert_interaction_alert(&alert).unwrap();

        let closed = service.acknowledge_alert(&actor, &alert.id, now()).unwrap();
        assert_eq!(closed.acknowledged_at, Some(now()));
        assert!(matches!(
            service.acknowledge_alert(&actor, &alert.id, now()),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_one_alert_notification_failure_spares_the_rest() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        for name in ["Warfarin", "Aspirin", "Ibuprofen"] {
            let med = seed_medication(&db, name);
            crate::test_support::seed_prescription(&db, &patient, &med, &["08:00"], 30, 5);
        }
        db.conn()
            .execute_batch(
                r#"
                CREATE TRIGGER reject_aspirin_alert BEFORE INSERT ON notifications
                WHEN NEW.notification_type = 'interaction_alert' AND NEW.body LIKE 'Aspirin%'
                BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;
                "#,
            )
            .unwrap();

        let report = service.detect_and_alert(&patient.id, None, now()).unwrap();
        assert_eq!(report.alerts_created, 2);
        assert_eq!(report.notifications_scheduled, 1);

        let alert_notifications = db
            .list_notifications_for_patient(&patient.id, 10)
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::InteractionAlert)
            .count();
        assert_eq!(alert_notifications, 1);
    }

    #[test]
    fn test_dispatch_without_provider() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let err = CareService::new(&db, &settings)
            .dispatch_due_notifications(now())
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_grant_lifecycle_through_service() {
        let db = Database::open_in_memory().unwrap();
        let settings = Settings::default();
        let service = CareService::new(&db, &settings);
        let patient = seed_patient(&db, "Ana");
        let patient_actor = Actor::Patient(patient.id.clone());
        let carer = Actor::Caregiver("carer-1".into());

        let grant = service
            .invite_caregiver(&patient_actor, "carer-1", &[permissions::ALERTS_MANAGE.to_string()], now())
            .unwrap();
        assert!(matches!(
            service.invite_caregiver(&carer, "carer-2", &[], now()),
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.accept_invitation(&Actor::Caregiver("someone".into()), &grant.id, now()),
            Err(CoreError::Unauthorized(_))
        ));
        service.accept_invitation(&carer, &grant.id, now()).unwrap();
        assert!(service.open_alerts(&carer, &patient.id).is_err());

        service
            .set_grant_permissions(&patient_actor, &grant.id, &[permissions::MEDICATIONS_VIEW.to_string()], now())
            .unwrap();
        assert!(service.open_alerts(&carer, &patient.id).is_ok());

        service.revoke_grant(&carer, &grant.id, now()).unwrap();
        assert!(service.open_alerts(&carer, &patient.id).is_err());
    }
}
