//! Interaction alert database operations.
//!
//! Pair lookups go through the normalized `pair_key` column so (A, B) and
//! (B, A) hit the same open alert; the stored medication order is untouched.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{
    is_unique_violation, opt_ts_from_sql, ts_from_sql, ts_to_sql, Database, DbError, DbResult,
    InsertOutcome,
};
use crate::models::{AlertSeverity, InteractionAlert, PairKey};

const ALERT_COLUMNS: &str = r#"
    id, patient_id, medication_1_id, medication_2_id, severity,
    description, recommendation, detected_at, acknowledged_at
"#;

impl Database {
    /// Insert an alert. A second open alert for the same pair is rejected by
    /// the partial unique index and reported as `AlreadyExists`.
    pub fn insert_interaction_alert(&self, alert: &InteractionAlert) -> DbResult<InsertOutcome> {
        let result = self.conn.execute(
            r#"
            INSERT INTO interaction_alerts (
                id, patient_id, medication_1_id, medication_2_id, pair_key, severity,
                description, recommendation, detected_at, acknowledged_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                alert.id,
                alert.patient_id,
                alert.medication_1_id,
                alert.medication_2_id,
                alert.pair_key().as_storage_key(),
                alert.severity.as_str(),
                alert.description,
                alert.recommendation,
                ts_to_sql(&alert.detected_at),
                alert.acknowledged_at.as_ref().map(ts_to_sql),
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// The open alert for a patient's medication pair, in either order.
    pub fn find_open_interaction_alert(
        &self,
        patient_id: &str,
        pair: &PairKey,
    ) -> DbResult<Option<InteractionAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM interaction_alerts
             WHERE patient_id = ?1 AND pair_key = ?2 AND acknowledged_at IS NULL"
        );
        self.conn
            .query_row(
                &sql,
                params![patient_id, pair.as_storage_key()],
                AlertRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get an alert by ID.
    pub fn get_interaction_alert(&self, id: &str) -> DbResult<Option<InteractionAlert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM interaction_alerts WHERE id = ?");
        self.conn
            .query_row(&sql, [id], AlertRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Close an open alert. Returns false if it was already acknowledged.
    pub fn acknowledge_interaction_alert(&self, id: &str, now: &NaiveDateTime) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE interaction_alerts SET acknowledged_at = ?2
            WHERE id = ?1 AND acknowledged_at IS NULL
            "#,
            params![id, ts_to_sql(now)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Open alerts of a patient, most severe first.
    pub fn list_open_interaction_alerts(&self, patient_id: &str) -> DbResult<Vec<InteractionAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM interaction_alerts
             WHERE patient_id = ? AND acknowledged_at IS NULL
             ORDER BY detected_at DESC, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], AlertRow::from_row)?;

        let mut alerts: Vec<InteractionAlert> = Vec::new();
        for row in rows {
            alerts.push(row?.try_into()?);
        }
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
        Ok(alerts)
    }
}

/// Intermediate row struct for database mapping.
struct AlertRow {
    id: String,
    patient_id: String,
    medication_1_id: String,
    medication_2_id: String,
    severity: String,
    description: String,
    recommendation: String,
    detected_at: String,
    acknowledged_at: Option<String>,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            medication_1_id: row.get(2)?,
            medication_2_id: row.get(3)?,
            severity: row.get(4)?,
            description: row.get(5)?,
            recommendation: row.get(6)?,
            detected_at: row.get(7)?,
            acknowledged_at: row.get(8)?,
        })
    }
}

impl TryFrom<AlertRow> for InteractionAlert {
    type Error = DbError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let severity = AlertSeverity::parse(&row.severity)
            .ok_or_else(|| DbError::Constraint(format!("Unknown severity: {}", row.severity)))?;

        Ok(InteractionAlert {
            id: row.id,
            patient_id: row.patient_id,
            medication_1_id: row.medication_1_id,
            medication_2_id: row.medication_2_id,
            severity,
            description: row.description,
            recommendation: row.recommendation,
            detected_at: ts_from_sql(&row.detected_at)?,
            acknowledged_at: opt_ts_from_sql(row.acknowledged_at)?,
        })
    }
}
