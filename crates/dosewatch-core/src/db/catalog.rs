//! Medication catalog database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::Medication;

impl Database {
    /// Insert or update a catalog medication.
    pub fn upsert_medication(&self, medication: &Medication) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medications (id, name, generic_name, active, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                generic_name = excluded.generic_name,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                medication.id,
                medication.name,
                medication.generic_name,
                medication.active,
            ],
        )?;
        Ok(())
    }

    /// Get a medication by ID.
    pub fn get_medication(&self, id: &str) -> DbResult<Option<Medication>> {
        let medication = self
            .conn
            .query_row(
                "SELECT id, name, generic_name, active FROM medications WHERE id = ?",
                [id],
                |row| {
                    Ok(Medication {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        generic_name: row.get(2)?,
                        active: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(medication)
    }

    /// Distinct medication IDs of a patient's active, not yet ended prescriptions.
    pub fn active_medication_ids(&self, patient_id: &str, today: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT medication_id
            FROM prescriptions
            WHERE patient_id = ?1
              AND active = 1
              AND start_date <= ?2
              AND (end_date IS NULL OR end_date >= ?2)
              AND (duration_days IS NULL OR end_date IS NOT NULL
                   OR date(start_date, '+' || (duration_days - 1) || ' days') >= ?2)
            ORDER BY medication_id
            "#,
        )?;
        let rows = stmt.query_map(params![patient_id, today], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
