//! Missed-dose sweeper.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::db::Database;
use crate::error::CoreResult;
use crate::models::DoseStatus;

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
}

impl SweepReport {
    /// Process exit code for the job runner.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// Moves doses still `pending` past the grace period to `missed`.
///
/// Each update is conditioned on the dose still being `pending`, so
/// concurrent sweeps and late confirmations never clobber each other.
pub struct MissedDoseSweeper<'a> {
    db: &'a Database,
    grace: Duration,
}

impl<'a> MissedDoseSweeper<'a> {
    pub fn new(db: &'a Database, settings: &Settings) -> Self {
        Self {
            db,
            grace: settings.missed_grace(),
        }
    }

    /// Sweep at most `budget` stale doses.
    pub fn sweep(&self, now: NaiveDateTime, budget: usize) -> CoreResult<SweepReport> {
        let cutoff = now - self.grace;
        let stale = self.db.list_overdue_pending_doses(&cutoff, budget)?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };
        for dose in stale {
            match self
                .db
                .resolve_pending_dose(&dose.id, DoseStatus::Missed, None, None)
            {
                Ok(true) => report.updated += 1,
                Ok(false) => {
                    tracing::debug!(dose_id = %dose.id, "dose resolved concurrently, skipped");
                }
                Err(e) => {
                    tracing::warn!(dose_id = %dose.id, error = %e, "failed to mark dose missed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            updated = report.updated,
            failed = report.failed,
            "missed-dose sweep finished"
        );
        Ok(report)
    }
}
