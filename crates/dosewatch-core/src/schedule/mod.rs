//! Dose schedule derivation and reconciliation.
//!
//! - [`ScheduleExpander`]: prescription time slots to concrete dose instances
//! - [`MissedDoseSweeper`]: periodic `pending -> missed` for stale doses

mod expander;
mod sweeper;

pub use expander::{expand, ExpansionOutcome, ScheduleExpander};
pub use sweeper::{MissedDoseSweeper, SweepReport};
