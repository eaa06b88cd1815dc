//! Dose instance database operations.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    opt_ts_from_sql, ts_from_sql, ts_to_sql, Database, DbError, DbResult, InsertOutcome,
};
use crate::models::{DoseInstance, DoseStatus};

const DOSE_COLUMNS: &str =
    "d.id, d.prescription_id, d.scheduled_at, d.status, d.taken_at, d.notes, d.created_at";

/// A dose together with the patient that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedDose {
    pub dose: DoseInstance,
    pub patient_id: String,
}

impl Database {
    /// Insert a dose unless its (prescription, slot) already exists.
    pub fn insert_dose_if_absent(&self, dose: &DoseInstance) -> DbResult<InsertOutcome> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO dose_instances (
                id, prescription_id, scheduled_at, status, taken_at, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                dose.id,
                dose.prescription_id,
                ts_to_sql(&dose.scheduled_at),
                dose.status.as_str(),
                dose.taken_at.as_ref().map(ts_to_sql),
                dose.notes,
                ts_to_sql(&dose.created_at),
            ],
        )?;
        Ok(if inserted > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    /// Get a dose by ID, with its owning patient.
    pub fn get_owned_dose(&self, id: &str) -> DbResult<Option<OwnedDose>> {
        let sql = format!(
            "SELECT {DOSE_COLUMNS}, p.patient_id
             FROM dose_instances d JOIN prescriptions p ON p.id = d.prescription_id
             WHERE d.id = ?"
        );
        self.conn
            .query_row(&sql, [id], |row| {
                Ok((DoseRow::from_row(row)?, row.get::<_, String>(7)?))
            })
            .optional()?
            .map(|(row, patient_id)| {
                Ok(OwnedDose {
                    dose: row.try_into()?,
                    patient_id,
                })
            })
            .transpose()
    }

    /// Get a dose by ID.
    pub fn get_dose(&self, id: &str) -> DbResult<Option<DoseInstance>> {
        Ok(self.get_owned_dose(id)?.map(|owned| owned.dose))
    }

    /// Get the dose of a prescription at a given slot.
    pub fn get_dose_at(
        &self,
        prescription_id: &str,
        scheduled_at: &NaiveDateTime,
    ) -> DbResult<Option<DoseInstance>> {
        let sql = format!(
            "SELECT {DOSE_COLUMNS} FROM dose_instances d
             WHERE d.prescription_id = ?1 AND d.scheduled_at = ?2"
        );
        self.conn
            .query_row(&sql, params![prescription_id, ts_to_sql(scheduled_at)], DoseRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Doses of a prescription in `[from, to]`, by slot.
    pub fn list_doses_for_prescription(
        &self,
        prescription_id: &str,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> DbResult<Vec<DoseInstance>> {
        let sql = format!(
            "SELECT {DOSE_COLUMNS} FROM dose_instances d
             WHERE d.prescription_id = ?1 AND d.scheduled_at BETWEEN ?2 AND ?3
             ORDER BY d.scheduled_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![prescription_id, ts_to_sql(from), ts_to_sql(to)],
            DoseRow::from_row,
        )?;
        collect_doses(rows)
    }

    /// All doses of a patient's prescriptions in `[from, to]`, active or not.
    pub fn list_doses_for_patient(
        &self,
        patient_id: &str,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> DbResult<Vec<DoseInstance>> {
        let sql = format!(
            "SELECT {DOSE_COLUMNS}
             FROM dose_instances d JOIN prescriptions p ON p.id = d.prescription_id
             WHERE p.patient_id = ?1 AND d.scheduled_at BETWEEN ?2 AND ?3
             ORDER BY d.prescription_id, d.scheduled_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![patient_id, ts_to_sql(from), ts_to_sql(to)],
            DoseRow::from_row,
        )?;
        collect_doses(rows)
    }

    /// Pending doses scheduled before `cutoff`, oldest first, at most `limit`.
    pub fn list_overdue_pending_doses(
        &self,
        cutoff: &NaiveDateTime,
        limit: usize,
    ) -> DbResult<Vec<DoseInstance>> {
        let sql = format!(
            "SELECT {DOSE_COLUMNS} FROM dose_instances d
             WHERE d.status = 'pending' AND d.scheduled_at < ?1
             ORDER BY d.scheduled_at, d.id
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![ts_to_sql(cutoff), limit as i64], DoseRow::from_row)?;
        collect_doses(rows)
    }

    /// Skip the pending doses of a prescription scheduled after `after`.
    pub fn skip_future_pending_doses(
        &self,
        prescription_id: &str,
        after: &NaiveDateTime,
        note: &str,
    ) -> DbResult<usize> {
        let skipped = self.conn.execute(
            r#"
            UPDATE dose_instances SET status = 'skipped', notes = COALESCE(notes, ?3)
            WHERE prescription_id = ?1 AND status = 'pending' AND scheduled_at > ?2
            "#,
            params![prescription_id, ts_to_sql(after), note],
        )?;
        Ok(skipped)
    }

    /// Move a dose out of `pending`. Returns false if it was not pending.
    pub fn resolve_pending_dose(
        &self,
        id: &str,
        status: DoseStatus,
        taken_at: Option<&NaiveDateTime>,
        notes: Option<&str>,
    ) -> DbResult<bool> {
        resolve_pending_dose(&self.conn, id, status, taken_at, notes)
    }
}

/// Conditional `pending -> status` update on any connection or transaction.
///
/// Notes are only overwritten when given. Returns whether a row changed.
pub(crate) fn resolve_pending_dose(
    conn: &Connection,
    id: &str,
    status: DoseStatus,
    taken_at: Option<&NaiveDateTime>,
    notes: Option<&str>,
) -> DbResult<bool> {
    if !DoseStatus::Pending.can_transition_to(status) {
        return Err(DbError::Constraint(format!(
            "Cannot move dose to {}",
            status.as_str()
        )));
    }
    let rows_affected = conn.execute(
        r#"
        UPDATE dose_instances SET
            status = ?2,
            taken_at = ?3,
            notes = COALESCE(?4, notes)
        WHERE id = ?1 AND status = 'pending'
        "#,
        params![id, status.as_str(), taken_at.map(ts_to_sql), notes],
    )?;
    Ok(rows_affected > 0)
}

fn collect_doses<F>(rows: rusqlite::MappedRows<'_, F>) -> DbResult<Vec<DoseInstance>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<DoseRow>,
{
    let mut doses = Vec::new();
    for row in rows {
        doses.push(row?.try_into()?);
    }
    Ok(doses)
}

/// Intermediate row struct for database mapping.
struct DoseRow {
    id: String,
    prescription_id: String,
    scheduled_at: String,
    status: String,
    taken_at: Option<String>,
    notes: Option<String>,
    created_at: String,
}

impl DoseRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            prescription_id: row.get(1)?,
            scheduled_at: row.get(2)?,
            status: row.get(3)?,
            taken_at: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<DoseRow> for DoseInstance {
    type Error = DbError;

    fn try_from(row: DoseRow) -> Result<Self, Self::Error> {
        let status = DoseStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown dose status: {}", row.status)))?;

        Ok(DoseInstance {
            id: row.id,
            prescription_id: row.prescription_id,
            scheduled_at: ts_from_sql(&row.scheduled_at)?,
            status,
            taken_at: opt_ts_from_sql(row.taken_at)?,
            notes: row.notes,
            created_at: ts_from_sql(&row.created_at)?,
        })
    }
}
