//! Notification scheduling.
//!
//! Idempotent: a dose or alert that already has a live notification (not
//! expired, not failed) is skipped, first by lookup and then by the partial
//! unique indexes if a concurrent run got there between lookup and insert.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::load_preferences;
use crate::config::Settings;
use crate::db::{Database, InsertOutcome};
use crate::error::CoreResult;
use crate::models::{
    DateWindow, DoseStatus, InteractionAlert, Notification, NotificationPreference,
    NotificationType, Prescription, QuietHours,
};
use crate::schedule::ScheduleExpander;

/// Counters for a scheduling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub scheduled: usize,
    /// Already had a live notification
    pub skipped_existing: usize,
    /// Dropped by quiet hours
    pub suppressed: usize,
    /// Patients or prescriptions that errored in a bulk run
    pub failed: usize,
}

impl ScheduleOutcome {
    pub fn merge(&mut self, other: ScheduleOutcome) {
        self.scheduled += other.scheduled;
        self.skipped_existing += other.skipped_existing;
        self.suppressed += other.suppressed;
        self.failed += other.failed;
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }

    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.scheduled += 1,
            InsertOutcome::AlreadyExists => self.skipped_existing += 1,
        }
    }
}

/// When a reminder for `slot_at` should go out, or `None` to suppress it.
///
/// Inside quiet hours the reminder moves to the end of the window. A shift
/// that reaches the prescription's next slot is clamped to one minute before
/// it; only when no such minute exists after `slot_at` is it suppressed.
pub fn reminder_time(
    prescription: &Prescription,
    quiet_hours: Option<&QuietHours>,
    slot_at: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let Some(quiet) = quiet_hours else {
        return Some(slot_at);
    };
    let shifted = quiet.shift_out(slot_at);
    if shifted == slot_at {
        return Some(slot_at);
    }
    let next_slot = next_slot_at(prescription, slot_at)?;
    if shifted < next_slot {
        return Some(shifted);
    }
    let latest = next_slot - Duration::minutes(1);
    (latest > slot_at).then_some(latest)
}

fn next_slot_at(prescription: &Prescription, slot_at: NaiveDateTime) -> Option<NaiveDateTime> {
    let time: NaiveTime = slot_at.time();
    match prescription.next_slot_after(time) {
        Some(slot) => Some(slot.on(slot_at.date())),
        None => prescription
            .time_slots
            .first()
            .map(|slot| slot.on(slot_at.date() + Duration::days(1))),
    }
}

pub struct NotificationScheduler<'a> {
    db: &'a Database,
    settings: &'a Settings,
}

impl<'a> NotificationScheduler<'a> {
    pub fn new(db: &'a Database, settings: &'a Settings) -> Self {
        Self { db, settings }
    }

    /// Reminders for the future doses of one prescription within `window`.
    pub fn schedule_for_prescription(
        &self,
        prescription: &Prescription,
        prefs: &NotificationPreference,
        window: &DateWindow,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        if !prefs.accepts(NotificationType::MedicationReminder) {
            return Ok(outcome);
        }

        ScheduleExpander::new(self.db).materialize(prescription, window, now)?;
        let doses = self.db.list_doses_for_prescription(
            &prescription.id,
            &window.start.and_time(NaiveTime::MIN),
            &window.end.and_hms_opt(23, 59, 59).unwrap_or_else(|| window.end.and_time(NaiveTime::MIN)),
        )?;

        for dose in doses
            .iter()
            .filter(|d| d.status == DoseStatus::Pending && d.scheduled_at > now)
        {
            if self
                .db
                .has_live_dose_notification(&dose.id, NotificationType::MedicationReminder)?
            {
                outcome.skipped_existing += 1;
                continue;
            }
            let Some(send_at) = reminder_time(prescription, prefs.quiet_hours.as_ref(), dose.scheduled_at)
            else {
                tracing::debug!(dose_id = %dose.id, "reminder suppressed by quiet hours");
                outcome.suppressed += 1;
                continue;
            };

            let mut notification = Notification::new(
                prescription.patient_id.clone(),
                NotificationType::MedicationReminder,
                "Time for your medication".into(),
                format!(
                    "Take {} (scheduled {}).",
                    prescription.dosage,
                    dose.scheduled_at.format("%H:%M")
                ),
                send_at,
                now,
            );
            notification.prescription_id = Some(prescription.id.clone());
            notification.dose_id = Some(dose.id.clone());
            outcome.record(self.db.insert_notification(&notification)?);
        }

        tracing::debug!(
            prescription_id = %prescription.id,
            scheduled = outcome.scheduled,
            skipped_existing = outcome.skipped_existing,
            suppressed = outcome.suppressed,
            "reminders scheduled"
        );
        Ok(outcome)
    }

    /// One notification for a freshly created alert.
    ///
    /// Severe and contraindicated alerts go out immediately; milder ones wait
    /// out quiet hours.
    pub fn schedule_for_alert(
        &self,
        alert: &InteractionAlert,
        prefs: &NotificationPreference,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        if !prefs.accepts(NotificationType::InteractionAlert) {
            return Ok(outcome);
        }
        if self
            .db
            .has_live_alert_notification(&alert.id, NotificationType::InteractionAlert)?
        {
            outcome.skipped_existing += 1;
            return Ok(outcome);
        }

        let send_at = match &prefs.quiet_hours {
            Some(quiet) if !alert.severity.is_urgent() => quiet.shift_out(now),
            _ => now,
        };
        let mut notification = Notification::new(
            alert.patient_id.clone(),
            NotificationType::InteractionAlert,
            format!("{} medication interaction", capitalize(alert.severity.as_str())),
            format!("{} {}", alert.description, alert.recommendation),
            send_at,
            now,
        );
        notification.alert_id = Some(alert.id.clone());
        outcome.record(self.db.insert_notification(&notification)?);
        Ok(outcome)
    }

    /// One notification per low-stock crossing.
    pub fn schedule_low_stock(
        &self,
        prescription: &Prescription,
        prefs: &NotificationPreference,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        if !prefs.accepts(NotificationType::LowStock) {
            return Ok(outcome);
        }

        let name = self
            .db
            .get_medication(&prescription.medication_id)?
            .map(|m| m.name)
            .unwrap_or_else(|| "your medication".to_string());
        let send_at = prefs
            .quiet_hours
            .as_ref()
            .map_or(now, |quiet| quiet.shift_out(now));

        let mut notification = Notification::new(
            prescription.patient_id.clone(),
            NotificationType::LowStock,
            format!("Running low on {name}"),
            format!(
                "{} doses left. Refill soon to avoid missing doses.",
                prescription.current_stock
            ),
            send_at,
            now,
        );
        notification.prescription_id = Some(prescription.id.clone());
        outcome.record(self.db.insert_notification(&notification)?);
        tracing::info!(prescription_id = %prescription.id, stock = prescription.current_stock, "low-stock notification scheduled");
        Ok(outcome)
    }

    /// Reminders for every active prescription of one patient.
    pub fn schedule_for_patient(
        &self,
        patient_id: &str,
        now: NaiveDateTime,
    ) -> CoreResult<ScheduleOutcome> {
        let prefs = load_preferences(self.db, patient_id, self.settings)?;
        let window = DateWindow::starting(now.date(), self.settings.reminder_window_days);

        let mut outcome = ScheduleOutcome::default();
        for prescription in self.db.list_active_prescriptions(patient_id)? {
            if prescription.has_ended(now.date()) {
                continue;
            }
            match self.schedule_for_prescription(&prescription, &prefs, &window, now) {
                Ok(one) => outcome.merge(one),
                Err(e) => {
                    tracing::warn!(prescription_id = %prescription.id, error = %e, "scheduling failed");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Reminders for up to `budget` patients with active prescriptions.
    pub fn schedule_all(&self, now: NaiveDateTime, budget: usize) -> CoreResult<ScheduleOutcome> {
        let patients = self.db.list_patients_with_active_prescriptions(budget)?;
        let mut outcome = ScheduleOutcome::default();
        for patient_id in &patients {
            match self.schedule_for_patient(patient_id, now) {
                Ok(one) => outcome.merge(one),
                Err(e) => {
                    tracing::warn!(patient_id = %patient_id, error = %e, "scheduling failed");
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            patients = patients.len(),
            scheduled = outcome.scheduled,
            skipped_existing = outcome.skipped_existing,
            suppressed = outcome.suppressed,
            failed = outcome.failed,
            "notification scheduling finished"
        );
        Ok(outcome)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
