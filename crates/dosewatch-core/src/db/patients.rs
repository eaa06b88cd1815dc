//! Patient database operations.

use rusqlite::{params, OptionalExtension};

use super::{ts_from_sql, ts_to_sql, Database, DbResult};
use crate::models::Patient;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO patients (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![patient.id, patient.name, ts_to_sql(&patient.created_at)],
        )?;
        Ok(())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM patients WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, name, created_at)| {
                Ok(Patient {
                    id,
                    name,
                    created_at: ts_from_sql(&created_at)?,
                })
            })
            .transpose()
    }

    /// IDs of patients with at least one active prescription, in stable order.
    pub fn list_patients_with_active_prescriptions(&self, limit: usize) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT patient_id
            FROM prescriptions
            WHERE active = 1
            ORDER BY patient_id
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{now, seed_medication, seed_patient, seed_prescription};

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Ana".into(), now());
        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved, patient);
        assert!(db.get_patient("missing").unwrap().is_none());
    }

    #[test]
    fn test_patients_with_active_prescriptions() {
        let db = Database::open_in_memory().unwrap();
        let with_rx = seed_patient(&db, "Ana");
        let _without_rx = seed_patient(&db, "Ben");
        let med = seed_medication(&db, "Warfarin");
        seed_prescription(&db, &with_rx, &med, &["08:00"], 10, 2);

        let ids = db.list_patients_with_active_prescriptions(10).unwrap();
        assert_eq!(ids, vec![with_rx.id]);
    }
}
