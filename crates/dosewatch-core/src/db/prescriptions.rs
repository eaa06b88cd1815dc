//! Prescription database operations.
//!
//! Prescriptions are soft-deactivated, never deleted. Stock counters are only
//! ever changed by conditional SQL updates; see `adherence::StockLedger` for
//! the decrement path.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{date_from_sql, date_to_sql, ts_from_sql, ts_to_sql, Database, DbError, DbResult};
use crate::models::{Prescription, TimeSlot};

const PRESCRIPTION_COLUMNS: &str = r#"
    id, patient_id, medication_id, dosage, time_slots, route,
    start_date, end_date, duration_days, initial_stock, current_stock,
    low_stock_threshold, low_stock_notified, active, created_at, updated_at
"#;

impl Database {
    /// Insert a new prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        let time_slots_json = serde_json::to_string(&prescription.time_slots)?;

        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, patient_id, medication_id, dosage, time_slots, route,
                start_date, end_date, duration_days, initial_stock, current_stock,
                low_stock_threshold, low_stock_notified, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                prescription.id,
                prescription.patient_id,
                prescription.medication_id,
                prescription.dosage,
                time_slots_json,
                prescription.route,
                date_to_sql(&prescription.start_date),
                prescription.end_date.as_ref().map(date_to_sql),
                prescription.duration_days,
                prescription.initial_stock,
                prescription.current_stock,
                prescription.low_stock_threshold,
                prescription.low_stock_notified,
                prescription.active,
                ts_to_sql(&prescription.created_at),
                ts_to_sql(&prescription.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?");
        self.conn
            .query_row(&sql, [id], PrescriptionRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Active prescriptions of a patient, oldest first.
    pub fn list_active_prescriptions(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
             WHERE patient_id = ? AND active = 1
             ORDER BY created_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// All prescriptions of a patient, discontinued ones included.
    pub fn list_prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
             WHERE patient_id = ?
             ORDER BY created_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// Soft-deactivate a prescription. Returns false if it was already inactive.
    pub fn deactivate_prescription(&self, id: &str, now: &NaiveDateTime) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE prescriptions SET active = 0, updated_at = ?2 WHERE id = ?1 AND active = 1",
            params![id, ts_to_sql(now)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Add units to a prescription's stock.
    ///
    /// The low-stock flag is cleared once stock rises above the threshold so
    /// the next crossing notifies again. Returns the new stock, or `None` if
    /// the prescription does not exist.
    pub fn restock_prescription(
        &self,
        id: &str,
        units: u32,
        now: &NaiveDateTime,
    ) -> DbResult<Option<u32>> {
        let stock = self
            .conn
            .query_row(
                r#"
                UPDATE prescriptions SET
                    current_stock = current_stock + ?2,
                    low_stock_notified = CASE
                        WHEN current_stock + ?2 > low_stock_threshold THEN 0
                        ELSE low_stock_notified
                    END,
                    updated_at = ?3
                WHERE id = ?1
                RETURNING current_stock
                "#,
                params![id, units, ts_to_sql(now)],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(stock)
    }
}

/// Intermediate row struct for database mapping.
struct PrescriptionRow {
    id: String,
    patient_id: String,
    medication_id: String,
    dosage: String,
    time_slots: String,
    route: Option<String>,
    start_date: String,
    end_date: Option<String>,
    duration_days: Option<u32>,
    initial_stock: u32,
    current_stock: u32,
    low_stock_threshold: u32,
    low_stock_notified: bool,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl PrescriptionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            medication_id: row.get(2)?,
            dosage: row.get(3)?,
            time_slots: row.get(4)?,
            route: row.get(5)?,
            start_date: row.get(6)?,
            end_date: row.get(7)?,
            duration_days: row.get(8)?,
            initial_stock: row.get(9)?,
            current_stock: row.get(10)?,
            low_stock_threshold: row.get(11)?,
            low_stock_notified: row.get(12)?,
            active: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        let time_slots: Vec<TimeSlot> = serde_json::from_str(&row.time_slots)?;

        Ok(Prescription {
            id: row.id,
            patient_id: row.patient_id,
            medication_id: row.medication_id,
            dosage: row.dosage,
            time_slots,
            route: row.route,
            start_date: date_from_sql(&row.start_date)?,
            end_date: row.end_date.as_deref().map(date_from_sql).transpose()?,
            duration_days: row.duration_days,
            initial_stock: row.initial_stock,
            current_stock: row.current_stock,
            low_stock_threshold: row.low_stock_threshold,
            low_stock_notified: row.low_stock_notified,
            active: row.active,
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}
