//! Caregiver grant database operations.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{is_unique_violation, ts_from_sql, ts_to_sql, Database, DbError, DbResult, InsertOutcome};
use crate::models::{CaregiverGrant, GrantStatus};

impl Database {
    /// Insert a grant with its permissions. One grant per caregiver and patient.
    pub fn insert_grant(&self, grant: &CaregiverGrant) -> DbResult<InsertOutcome> {
        let tx = self.transaction()?;
        let result = tx.execute(
            r#"
            INSERT INTO caregiver_patients (id, caregiver_id, patient_id, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                grant.id,
                grant.caregiver_id,
                grant.patient_id,
                grant.status.as_str(),
                ts_to_sql(&grant.created_at),
                ts_to_sql(&grant.updated_at),
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(InsertOutcome::AlreadyExists),
            Err(e) => return Err(e.into()),
        }
        for permission in &grant.permissions {
            tx.execute(
                "INSERT INTO caregiver_permissions (grant_id, permission_key) VALUES (?1, ?2)",
                params![grant.id, permission],
            )?;
        }
        tx.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    /// The grant between a caregiver and a patient, whatever its status.
    pub fn find_grant(&self, caregiver_id: &str, patient_id: &str) -> DbResult<Option<CaregiverGrant>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, caregiver_id, patient_id, status, created_at, updated_at
                FROM caregiver_patients
                WHERE caregiver_id = ?1 AND patient_id = ?2
                "#,
                params![caregiver_id, patient_id],
                GrantRow::from_row,
            )
            .optional()?;
        row.map(|row| self.hydrate_grant(row)).transpose()
    }

    /// Get a grant by ID.
    pub fn get_grant(&self, id: &str) -> DbResult<Option<CaregiverGrant>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, caregiver_id, patient_id, status, created_at, updated_at
                FROM caregiver_patients
                WHERE id = ?
                "#,
                [id],
                GrantRow::from_row,
            )
            .optional()?;
        row.map(|row| self.hydrate_grant(row)).transpose()
    }

    /// All grants a patient has issued.
    pub fn list_grants_for_patient(&self, patient_id: &str) -> DbResult<Vec<CaregiverGrant>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, caregiver_id, patient_id, status, created_at, updated_at
            FROM caregiver_patients
            WHERE patient_id = ?
            ORDER BY created_at, id
            "#,
        )?;
        let rows = stmt.query_map([patient_id], GrantRow::from_row)?;

        let mut grants = Vec::new();
        for row in rows {
            grants.push(self.hydrate_grant(row?)?);
        }
        Ok(grants)
    }

    /// Move a grant to `next` if it is currently in `from`.
    pub fn transition_grant(
        &self,
        id: &str,
        from: GrantStatus,
        next: GrantStatus,
        now: &NaiveDateTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE caregiver_patients SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
            params![id, from.as_str(), next.as_str(), ts_to_sql(now)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Replace the permission set of a grant.
    pub fn set_grant_permissions(
        &self,
        id: &str,
        permissions: &BTreeSet<String>,
        now: &NaiveDateTime,
    ) -> DbResult<bool> {
        let tx = self.transaction()?;
        let touched = tx.execute(
            "UPDATE caregiver_patients SET updated_at = ?2 WHERE id = ?1",
            params![id, ts_to_sql(now)],
        )?;
        if touched == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM caregiver_permissions WHERE grant_id = ?", [id])?;
        for permission in permissions {
            tx.execute(
                "INSERT INTO caregiver_permissions (grant_id, permission_key) VALUES (?1, ?2)",
                params![id, permission],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    /// Bring a revoked grant back to `pending` with a fresh permission set.
    pub fn reopen_revoked_grant(
        &self,
        id: &str,
        permissions: &BTreeSet<String>,
        now: &NaiveDateTime,
    ) -> DbResult<bool> {
        let tx = self.transaction()?;
        let reopened = tx.execute(
            r#"
            UPDATE caregiver_patients SET status = 'pending', updated_at = ?2
            WHERE id = ?1 AND status = 'revoked'
            "#,
            params![id, ts_to_sql(now)],
        )?;
        if reopened == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM caregiver_permissions WHERE grant_id = ?", [id])?;
        for permission in permissions {
            tx.execute(
                "INSERT INTO caregiver_permissions (grant_id, permission_key) VALUES (?1, ?2)",
                params![id, permission],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn hydrate_grant(&self, row: GrantRow) -> DbResult<CaregiverGrant> {
        let mut stmt = self
            .conn
            .prepare("SELECT permission_key FROM caregiver_permissions WHERE grant_id = ?")?;
        let keys = stmt.query_map([&row.id], |r| r.get::<_, String>(0))?;

        let mut permissions = BTreeSet::new();
        for key in keys {
            permissions.insert(key?);
        }

        let mut grant: CaregiverGrant = row.try_into()?;
        grant.permissions = permissions;
        Ok(grant)
    }
}

/// Intermediate row struct for database mapping.
struct GrantRow {
    id: String,
    caregiver_id: String,
    patient_id: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl GrantRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            caregiver_id: row.get(1)?,
            patient_id: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl TryFrom<GrantRow> for CaregiverGrant {
    type Error = DbError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        let status = GrantStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown grant status: {}", row.status)))?;

        Ok(CaregiverGrant {
            id: row.id,
            caregiver_id: row.caregiver_id,
            patient_id: row.patient_id,
            status,
            permissions: BTreeSet::new(),
            created_at: ts_from_sql(&row.created_at)?,
            updated_at: ts_from_sql(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permissions;
    use crate::test_support::{now, seed_patient};

    #[test]
    fn test_insert_and_find_grant() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_patient(&db, "Ana");

        let mut grant = CaregiverGrant::invite("cg-1".into(), patient.id.clone(), now());
        grant.permissions.insert(permissions::ADHERENCE_VIEW.to_string());
        assert_eq!(db.insert_grant(&grant).unwrap(), InsertOutcome::Inserted);

        let found = db.find_grant("cg-1", &patient.id).unwrap().unwrap();
        assert_eq!(found, grant);
        assert!(db.find_grant("cg-2", &patient.id).unwrap().is_none());

        let again = CaregiverGrant::invite("cg-1".into(), patient.id.clone(), now());
        assert_eq!(db.insert_grant(&again).unwrap(), InsertOutcome::AlreadyExists);
    }

    #[test]
    fn test_transition_grant() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_patient(&db, "Ana");
        let grant = CaregiverGrant::invite("cg-1".into(), patient.id.clone(), now());
        db.insert_grant(&grant).unwrap();

        assert!(!db
            .transition_grant(&grant.id, GrantStatus::Active, GrantStatus::Revoked, &now())
            .unwrap());
        assert!(db
            .transition_grant(&grant.id, GrantStatus::Pending, GrantStatus::Active, &now())
            .unwrap());
        assert_eq!(
            db.get_grant(&grant.id).unwrap().unwrap().status,
            GrantStatus::Active
        );
    }

    #[test]
    fn test_set_permissions_replaces() {
        let db = Database::open_in_memory().unwrap();
        let patient = seed_patient(&db, "Ana");
        let mut grant = CaregiverGrant::invite("cg-1".into(), patient.id.clone(), now());
        grant.permissions.insert(permissions::ADHERENCE_VIEW.to_string());
        db.insert_grant(&grant).unwrap();

        let next: BTreeSet<String> = [permissions::ADHERENCE_MARK, permissions::ALERTS_MANAGE]
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert!(db.set_grant_permissions(&grant.id, &next, &now()).unwrap());
        assert_eq!(db.get_grant(&grant.id).unwrap().unwrap().permissions, next);

        assert!(!db.set_grant_permissions("missing", &next, &now()).unwrap());
        assert_eq!(db.list_grants_for_patient(&patient.id).unwrap().len(), 1);
    }
}
