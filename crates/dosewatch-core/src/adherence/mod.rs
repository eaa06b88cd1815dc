//! Adherence tracking.
//!
//! Dose confirmations, the stock they consume, and period reports.

mod log;
mod report;
mod stock;

pub use log::{AdherenceLog, TakenDose};
pub use report::{build_report, AdherenceCounts, AdherenceReport, PrescriptionAdherence};
pub use stock::{StockChange, StockLedger};
