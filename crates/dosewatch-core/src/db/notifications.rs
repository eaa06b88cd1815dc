//! Notification and notification preference database operations.

use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{
    is_unique_violation, opt_ts_from_sql, ts_from_sql, ts_to_sql, Database, DbError, DbResult,
    InsertOutcome,
};
use crate::models::{
    Notification, NotificationPreference, NotificationStatus, NotificationType, QuietHours,
};

const NOTIFICATION_COLUMNS: &str = r#"
    id, patient_id, prescription_id, dose_id, alert_id, notification_type,
    title, body, scheduled_for, status, sent_at, read_at, failure_reason, created_at
"#;

const CLOCK_FORMAT: &str = "%H:%M";

impl Database {
    /// Insert a notification. A second live notification for the same dose
    /// or alert is rejected by the partial unique indexes and reported as
    /// `AlreadyExists`.
    pub fn insert_notification(&self, notification: &Notification) -> DbResult<InsertOutcome> {
        let result = self.conn.execute(
            r#"
            INSERT INTO notifications (
                id, patient_id, prescription_id, dose_id, alert_id, notification_type,
                title, body, scheduled_for, status, sent_at, read_at, failure_reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                notification.id,
                notification.patient_id,
                notification.prescription_id,
                notification.dose_id,
                notification.alert_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.body,
                ts_to_sql(&notification.scheduled_for),
                notification.status.as_str(),
                notification.sent_at.as_ref().map(ts_to_sql),
                notification.read_at.as_ref().map(ts_to_sql),
                notification.failure_reason,
                ts_to_sql(&notification.created_at),
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a dose already has a notification of this type that is not
    /// expired or failed.
    pub fn has_live_dose_notification(
        &self,
        dose_id: &str,
        notification_type: NotificationType,
    ) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE dose_id = ?1 AND notification_type = ?2
                  AND status NOT IN ('expired', 'failed')
            )
            "#,
            params![dose_id, notification_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Alert counterpart of [`Database::has_live_dose_notification`].
    pub fn has_live_alert_notification(
        &self,
        alert_id: &str,
        notification_type: NotificationType,
    ) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications
                WHERE alert_id = ?1 AND notification_type = ?2
                  AND status NOT IN ('expired', 'failed')
            )
            "#,
            params![alert_id, notification_type.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get a notification by ID.
    pub fn get_notification(&self, id: &str) -> DbResult<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?");
        self.conn
            .query_row(&sql, [id], NotificationRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Pending notifications due at `now`, earliest first, at most `limit`.
    pub fn list_due_notifications(
        &self,
        now: &NaiveDateTime,
        limit: usize,
    ) -> DbResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE status = 'pending' AND scheduled_for <= ?1 AND sent_at IS NULL
             ORDER BY scheduled_for, id
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![ts_to_sql(now), limit as i64], NotificationRow::from_row)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?.try_into()?);
        }
        Ok(notifications)
    }

    /// Notifications of a patient, newest first.
    pub fn list_notifications_for_patient(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> DbResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE patient_id = ?1
             ORDER BY scheduled_for DESC, id
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![patient_id, limit as i64], NotificationRow::from_row)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?.try_into()?);
        }
        Ok(notifications)
    }

    /// Expire pending notifications scheduled before `cutoff`.
    pub fn expire_stale_notifications(&self, cutoff: &NaiveDateTime) -> DbResult<usize> {
        let expired = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'expired'
            WHERE status = 'pending' AND scheduled_for < ?1
            "#,
            [ts_to_sql(cutoff)],
        )?;
        Ok(expired)
    }

    /// Expire every pending notification of a prescription.
    pub fn expire_pending_for_prescription(&self, prescription_id: &str) -> DbResult<usize> {
        let expired = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'expired'
            WHERE prescription_id = ?1 AND status = 'pending'
            "#,
            [prescription_id],
        )?;
        Ok(expired)
    }

    /// `pending -> sent`. Returns false if the notification was not pending.
    pub fn mark_notification_sent(&self, id: &str, now: &NaiveDateTime) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'sent', sent_at = ?2, failure_reason = NULL
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![id, ts_to_sql(now)],
        )?;
        Ok(rows_affected > 0)
    }

    /// `pending -> failed`, keeping the reason for operators.
    pub fn mark_notification_failed(&self, id: &str, reason: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'failed', failure_reason = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![id, reason],
        )?;
        Ok(rows_affected > 0)
    }

    /// `sent -> read`.
    pub fn mark_notification_read(&self, id: &str, now: &NaiveDateTime) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'read', read_at = ?2
            WHERE id = ?1 AND status = 'sent'
            "#,
            params![id, ts_to_sql(now)],
        )?;
        Ok(rows_affected > 0)
    }

    /// `failed -> pending`, due at `now`.
    ///
    /// Fails with `Constraint` when another live notification already covers
    /// the same dose or alert.
    pub fn requeue_failed_notification(&self, id: &str, now: &NaiveDateTime) -> DbResult<bool> {
        let result = self.conn.execute(
            r#"
            UPDATE notifications SET status = 'pending', scheduled_for = ?2, failure_reason = NULL
            WHERE id = ?1 AND status = 'failed'
            "#,
            params![id, ts_to_sql(now)],
        );
        match result {
            Ok(rows_affected) => Ok(rows_affected > 0),
            Err(e) if is_unique_violation(&e) => Err(DbError::Constraint(format!(
                "Notification {} is superseded by a live notification",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored preferences of a patient, if any.
    pub fn get_notification_preference(
        &self,
        patient_id: &str,
    ) -> DbResult<Option<NotificationPreference>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, medication_reminder, low_stock, interaction_alert, system,
                       push_enabled, whatsapp_enabled, quiet_hours_start, quiet_hours_end
                FROM notification_preferences
                WHERE patient_id = ?
                "#,
                [patient_id],
                |row| {
                    Ok(PreferenceRow {
                        patient_id: row.get(0)?,
                        medication_reminder: row.get(1)?,
                        low_stock: row.get(2)?,
                        interaction_alert: row.get(3)?,
                        system: row.get(4)?,
                        push_enabled: row.get(5)?,
                        whatsapp_enabled: row.get(6)?,
                        quiet_hours_start: row.get(7)?,
                        quiet_hours_end: row.get(8)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert or replace a patient's preferences.
    pub fn upsert_notification_preference(&self, pref: &NotificationPreference) -> DbResult<()> {
        let (quiet_start, quiet_end) = match &pref.quiet_hours {
            Some(quiet) => (
                Some(quiet.start.format(CLOCK_FORMAT).to_string()),
                Some(quiet.end.format(CLOCK_FORMAT).to_string()),
            ),
            None => (None, None),
        };

        self.conn.execute(
            r#"
            INSERT INTO notification_preferences (
                patient_id, medication_reminder, low_stock, interaction_alert, system,
                push_enabled, whatsapp_enabled, quiet_hours_start, quiet_hours_end, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
            ON CONFLICT(patient_id) DO UPDATE SET
                medication_reminder = excluded.medication_reminder,
                low_stock = excluded.low_stock,
                interaction_alert = excluded.interaction_alert,
                system = excluded.system,
                push_enabled = excluded.push_enabled,
                whatsapp_enabled = excluded.whatsapp_enabled,
                quiet_hours_start = excluded.quiet_hours_start,
                quiet_hours_end = excluded.quiet_hours_end,
                updated_at = datetime('now')
            "#,
            params![
                pref.patient_id,
                pref.medication_reminder,
                pref.low_stock,
                pref.interaction_alert,
                pref.system,
                pref.push_enabled,
                pref.whatsapp_enabled,
                quiet_start,
                quiet_end,
            ],
        )?;
        Ok(())
    }
}

/// Intermediate row struct for database mapping.
struct NotificationRow {
    id: String,
    patient_id: String,
    prescription_id: Option<String>,
    dose_id: Option<String>,
    alert_id: Option<String>,
    notification_type: String,
    title: String,
    body: String,
    scheduled_for: String,
    status: String,
    sent_at: Option<String>,
    read_at: Option<String>,
    failure_reason: Option<String>,
    created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            prescription_id: row.get(2)?,
            dose_id: row.get(3)?,
            alert_id: row.get(4)?,
            notification_type: row.get(5)?,
            title: row.get(6)?,
            body: row.get(7)?,
            scheduled_for: row.get(8)?,
            status: row.get(9)?,
            sent_at: row.get(10)?,
            read_at: row.get(11)?,
            failure_reason: row.get(12)?,
            created_at: row.get(13)?,
        })
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let notification_type = NotificationType::parse(&row.notification_type).ok_or_else(|| {
            DbError::Constraint(format!("Unknown notification type: {}", row.notification_type))
        })?;
        let status = NotificationStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown notification status: {}", row.status))
        })?;

        Ok(Notification {
            id: row.id,
            patient_id: row.patient_id,
            prescription_id: row.prescription_id,
            dose_id: row.dose_id,
            alert_id: row.alert_id,
            notification_type,
            title: row.title,
            body: row.body,
            scheduled_for: ts_from_sql(&row.scheduled_for)?,
            status,
            sent_at: opt_ts_from_sql(row.sent_at)?,
            read_at: opt_ts_from_sql(row.read_at)?,
            failure_reason: row.failure_reason,
            created_at: ts_from_sql(&row.created_at)?,
        })
    }
}

struct PreferenceRow {
    patient_id: String,
    medication_reminder: bool,
    low_stock: bool,
    interaction_alert: bool,
    system: bool,
    push_enabled: bool,
    whatsapp_enabled: bool,
    quiet_hours_start: Option<String>,
    quiet_hours_end: Option<String>,
}

impl TryFrom<PreferenceRow> for NotificationPreference {
    type Error = DbError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            NaiveTime::parse_from_str(raw, CLOCK_FORMAT)
                .map_err(|_| DbError::Constraint(format!("Invalid quiet hours time: {}", raw)))
        };
        let quiet_hours = match (row.quiet_hours_start, row.quiet_hours_end) {
            (Some(start), Some(end)) => Some(QuietHours::new(parse(&start)?, parse(&end)?)),
            _ => None,
        };

        Ok(NotificationPreference {
            patient_id: row.patient_id,
            medication_reminder: row.medication_reminder,
            low_stock: row.low_stock,
            interaction_alert: row.interaction_alert,
            system: row.system,
            push_enabled: row.push_enabled,
            whatsapp_enabled: row.whatsapp_enabled,
            quiet_hours,
        })
    }
}
