//! Domain models for the dosewatch system.

mod alert;
mod caregiver;
mod dose;
mod medication;
mod notification;
mod patient;
mod prescription;

pub use alert::*;
pub use caregiver::*;
pub use dose::*;
pub use medication::*;
pub use notification::*;
pub use patient::*;
pub use prescription::*;
