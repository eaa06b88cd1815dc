//! Notification dispatch.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{load_preferences, DeliveryError, DeliveryProvider};
use crate::config::Settings;
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::Notification;

/// Counters for one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Pending notifications past the expiry horizon
    pub expired: usize,
}

impl DispatchReport {
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

pub struct NotificationDispatcher<'a> {
    db: &'a Database,
    settings: &'a Settings,
    provider: &'a dyn DeliveryProvider,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(
        db: &'a Database,
        settings: &'a Settings,
        provider: &'a dyn DeliveryProvider,
    ) -> Self {
        Self { db, settings, provider }
    }

    /// Expire stale notifications, then send up to one batch of due ones.
    ///
    /// A notification is marked `sent` only after the provider accepted it.
    /// Errors on one notification are counted and logged; the batch goes on.
    pub fn dispatch(&self, now: NaiveDateTime) -> CoreResult<DispatchReport> {
        let mut report = DispatchReport {
            expired: self
                .db
                .expire_stale_notifications(&(now - self.settings.expiry_horizon()))?,
            ..DispatchReport::default()
        };

        let due = self
            .db
            .list_due_notifications(&now, self.settings.dispatch_batch_size)?;
        for notification in &due {
            match self.deliver(notification) {
                Ok(()) => match self.db.mark_notification_sent(&notification.id, &now) {
                    Ok(true) => report.sent += 1,
                    Ok(false) => {
                        tracing::debug!(notification_id = %notification.id, "notification changed state during send");
                    }
                    Err(e) => {
                        tracing::warn!(
                            notification_id = %notification.id,
                            error = %e,
                            "notification delivered but not recorded as sent"
                        );
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        patient_id = %notification.patient_id,
                        error = %e,
                        "notification delivery failed"
                    );
                    if let Err(store) = self.db.mark_notification_failed(&notification.id, &e.to_string()) {
                        tracing::warn!(notification_id = %notification.id, error = %store, "failed to record delivery failure");
                    }
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            due = due.len(),
            sent = report.sent,
            failed = report.failed,
            expired = report.expired,
            "notification dispatch finished"
        );
        Ok(report)
    }

    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let prefs = load_preferences(self.db, &notification.patient_id, self.settings)
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))?;
        let channels = prefs.channels();
        if channels.is_empty() {
            return Err(DeliveryError::NoChannel);
        }
        self.provider.send(notification, &channels)
    }

    /// Put a failed notification back in the queue, due now.
    pub fn requeue_failed(&self, notification_id: &str, now: NaiveDateTime) -> CoreResult<Notification> {
        let notification = self
            .db
            .get_notification(notification_id)?
            .ok_or_else(|| CoreError::NotFound(format!("notification {notification_id}")))?;
        match self.db.requeue_failed_notification(notification_id, &now) {
            Ok(true) => {}
            Ok(false) => {
                return Err(CoreError::InvalidState(format!(
                    "notification {notification_id} is {}, not failed",
                    notification.status.as_str()
                )))
            }
            Err(crate::db::DbError::Constraint(msg)) => return Err(CoreError::Conflict(msg)),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(notification_id, "failed notification requeued");
        self.db
            .get_notification(notification_id)?
            .ok_or_else(|| CoreError::NotFound(format!("notification {notification_id}")))
    }
}
