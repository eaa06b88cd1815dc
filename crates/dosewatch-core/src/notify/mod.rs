//! Notification scheduling and dispatch.
//!
//! - [`NotificationScheduler`]: turns future doses, alerts and low-stock
//!   crossings into timed notifications, honouring preferences
//! - [`NotificationDispatcher`]: sends due notifications through a
//!   [`DeliveryProvider`] and records the outcome

mod dispatcher;
mod scheduler;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use scheduler::{NotificationScheduler, ScheduleOutcome};

use thiserror::Error;

use crate::config::Settings;
use crate::db::Database;
use crate::error::CoreResult;
use crate::models::{Channel, Notification, NotificationPreference};

/// Delivery failures reported by a provider.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("No delivery channel enabled")]
    NoChannel,

    #[error("Rejected by provider: {0}")]
    Rejected(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Outbound push / WhatsApp gateway.
pub trait DeliveryProvider {
    /// Deliver one notification on the given channels.
    fn send(&self, notification: &Notification, channels: &[Channel]) -> Result<(), DeliveryError>;
}

/// Stored preferences of a patient, or the defaults from settings.
pub fn load_preferences(
    db: &Database,
    patient_id: &str,
    settings: &Settings,
) -> CoreResult<NotificationPreference> {
    match db.get_notification_preference(patient_id)? {
        Some(pref) => Ok(pref),
        None => Ok(NotificationPreference::defaults(
            patient_id.to_string(),
            settings.default_quiet_hours()?,
        )),
    }
}
