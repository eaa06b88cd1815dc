//! Notification and notification preference models.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Notification category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    MedicationReminder,
    LowStock,
    InteractionAlert,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::MedicationReminder => "medication_reminder",
            NotificationType::LowStock => "low_stock",
            NotificationType::InteractionAlert => "interaction_alert",
            NotificationType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "medication_reminder" => Some(NotificationType::MedicationReminder),
            "low_stock" => Some(NotificationType::LowStock),
            "interaction_alert" => Some(NotificationType::InteractionAlert),
            "system" => Some(NotificationType::System),
            _ => None,
        }
    }
}

/// Delivery state of a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// Waiting for dispatch
    Pending,
    /// Handed to the delivery provider
    Sent,
    /// Delivery attempt failed; not retried automatically
    Failed,
    /// Opened by the patient
    Read,
    /// Never sent within the dispatch horizon
    Expired,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Read => "read",
            NotificationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            "read" => Some(NotificationStatus::Read),
            "expired" => Some(NotificationStatus::Expired),
            _ => None,
        }
    }

    /// Whether this notification still counts against re-scheduling.
    pub fn blocks_rescheduling(&self) -> bool {
        !matches!(self, NotificationStatus::Expired | NotificationStatus::Failed)
    }
}

/// Outbound delivery channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    WhatsApp,
}

/// A timed message to a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Unique identifier
    pub id: String,
    pub patient_id: String,
    pub prescription_id: Option<String>,
    pub dose_id: Option<String>,
    pub alert_id: Option<String>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub scheduled_for: NaiveDateTime,
    pub status: NotificationStatus,
    pub sent_at: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
    /// Last delivery error, for operators
    pub failure_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Notification {
    /// Create a pending notification.
    pub fn new(
        patient_id: String,
        notification_type: NotificationType,
        title: String,
        body: String,
        scheduled_for: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            prescription_id: None,
            dose_id: None,
            alert_id: None,
            notification_type,
            title,
            body,
            scheduled_for,
            status: NotificationStatus::Pending,
            sent_at: None,
            read_at: None,
            failure_reason: None,
            created_at: now,
        }
    }
}

/// Local time-of-day window during which nothing non-urgent is delivered.
///
/// `[start, end)`; a window with `start > end` wraps around midnight and one
/// with `start == end` is empty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else if self.start > self.end {
            time >= self.start || time < self.end
        } else {
            false
        }
    }

    /// Move `at` to the end of the quiet window it falls in; unchanged otherwise.
    pub fn shift_out(&self, at: NaiveDateTime) -> NaiveDateTime {
        let time = at.time();
        if !self.contains(time) {
            return at;
        }
        let date = at.date();
        // In a wrapping window the late-evening part ends the next morning
        if self.start > self.end && time >= self.start {
            (date + Duration::days(1)).and_time(self.end)
        } else {
            date.and_time(self.end)
        }
    }
}

/// Per-patient notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPreference {
    pub patient_id: String,
    pub medication_reminder: bool,
    pub low_stock: bool,
    pub interaction_alert: bool,
    pub system: bool,
    pub push_enabled: bool,
    pub whatsapp_enabled: bool,
    pub quiet_hours: Option<QuietHours>,
}

impl NotificationPreference {
    /// Preferences for a patient who never saved any.
    pub fn defaults(patient_id: String, quiet_hours: Option<QuietHours>) -> Self {
        Self {
            patient_id,
            medication_reminder: true,
            low_stock: true,
            interaction_alert: true,
            system: true,
            push_enabled: true,
            whatsapp_enabled: false,
            quiet_hours,
        }
    }

    /// Whether the category toggle is on.
    pub fn allows(&self, notification_type: NotificationType) -> bool {
        match notification_type {
            NotificationType::MedicationReminder => self.medication_reminder,
            NotificationType::LowStock => self.low_stock,
            NotificationType::InteractionAlert => self.interaction_alert,
            NotificationType::System => self.system,
        }
    }

    /// Enabled delivery channels.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if self.push_enabled {
            channels.push(Channel::Push);
        }
        if self.whatsapp_enabled {
            channels.push(Channel::WhatsApp);
        }
        channels
    }

    /// Category enabled and at least one channel to deliver on.
    pub fn accepts(&self, notification_type: NotificationType) -> bool {
        self.allows(notification_type) && (self.push_enabled || self.whatsapp_enabled)
    }
}
