//! Caregiver permission gate.
//!
//! Every patient-scoped operation names the acting party. Patients act on
//! their own records; caregivers act through an active grant that carries the
//! required permission key. Grants are re-read on every check, so a revoke
//! takes effect on the next call.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{Database, InsertOutcome};
use crate::error::{CoreError, CoreResult};
use crate::models::{permissions, CaregiverGrant, GrantStatus};

/// The party invoking an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Patient(String),
    Caregiver(String),
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::Patient(id) | Actor::Caregiver(id) => id,
        }
    }
}

pub struct PermissionGate<'a> {
    db: &'a Database,
}

impl<'a> PermissionGate<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Check that `caregiver_id` holds `permission` for `patient_id`.
    pub fn verify(
        &self,
        caregiver_id: &str,
        patient_id: &str,
        permission: &str,
    ) -> CoreResult<CaregiverGrant> {
        let grant = self
            .db
            .find_grant(caregiver_id, patient_id)?
            .ok_or_else(|| {
                CoreError::Unauthorized(format!(
                    "caregiver {caregiver_id} has no relationship with patient {patient_id}"
                ))
            })?;

        if grant.status != GrantStatus::Active {
            return Err(CoreError::Unauthorized(format!(
                "caregiver grant {} is {}",
                grant.id,
                grant.status.as_str()
            )));
        }
        if !grant.allows(permission) {
            return Err(CoreError::Unauthorized(format!(
                "caregiver {caregiver_id} lacks {permission}"
            )));
        }
        Ok(grant)
    }

    /// Authorize `actor` for `permission` on `patient_id`'s records.
    ///
    /// A patient touching another patient's records gets `NotFound`, so
    /// foreign record ids are indistinguishable from missing ones.
    pub fn authorize(&self, actor: &Actor, patient_id: &str, permission: &str) -> CoreResult<()> {
        match actor {
            Actor::Patient(id) if id == patient_id => Ok(()),
            Actor::Patient(_) => Err(CoreError::NotFound(format!("patient {patient_id}"))),
            Actor::Caregiver(caregiver_id) => {
                let grant = self.verify(caregiver_id, patient_id, permission)?;
                tracing::debug!(
                    caregiver_id = %caregiver_id,
                    patient_id = %patient_id,
                    grant_id = %grant.id,
                    permission,
                    "caregiver authorized"
                );
                Ok(())
            }
        }
    }

    /// Invite a caregiver with an initial permission set. The grant starts
    /// `pending` and confers nothing until activated.
    ///
    /// A previously revoked grant for the same pair is reopened in place.
    pub fn invite(
        &self,
        caregiver_id: &str,
        patient_id: &str,
        keys: &[String],
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let mut grant = CaregiverGrant::invite(caregiver_id.to_string(), patient_id.to_string(), now);
        grant.permissions = validate_keys(keys)?;

        match self.db.insert_grant(&grant)? {
            InsertOutcome::Inserted => Ok(grant),
            InsertOutcome::AlreadyExists => {
                let linked = || {
                    CoreError::Conflict(format!(
                        "caregiver {caregiver_id} already linked to patient {patient_id}"
                    ))
                };
                let existing = self
                    .db
                    .find_grant(caregiver_id, patient_id)?
                    .ok_or_else(linked)?;
                if existing.status != GrantStatus::Revoked
                    || !self
                        .db
                        .reopen_revoked_grant(&existing.id, &grant.permissions, &now)?
                {
                    return Err(linked());
                }
                tracing::info!(grant_id = %existing.id, "revoked caregiver grant reopened");
                self.load(&existing.id)
            }
        }
    }

    /// Accept a pending invitation.
    pub fn activate(&self, grant_id: &str, now: NaiveDateTime) -> CoreResult<CaregiverGrant> {
        self.move_grant(grant_id, &[GrantStatus::Pending], GrantStatus::Active, now)
    }

    /// Revoke a pending or active grant.
    pub fn revoke(&self, grant_id: &str, now: NaiveDateTime) -> CoreResult<CaregiverGrant> {
        self.move_grant(
            grant_id,
            &[GrantStatus::Pending, GrantStatus::Active],
            GrantStatus::Revoked,
            now,
        )
    }

    /// Replace the permission set of a grant.
    pub fn set_permissions(
        &self,
        grant_id: &str,
        keys: &[String],
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let keys = validate_keys(keys)?;
        if !self.db.set_grant_permissions(grant_id, &keys, &now)? {
            return Err(CoreError::NotFound(format!("grant {grant_id}")));
        }
        self.load(grant_id)
    }

    /// Get a grant by ID.
    pub fn load(&self, grant_id: &str) -> CoreResult<CaregiverGrant> {
        self.db
            .get_grant(grant_id)?
            .ok_or_else(|| CoreError::NotFound(format!("grant {grant_id}")))
    }

    fn move_grant(
        &self,
        grant_id: &str,
        from: &[GrantStatus],
        next: GrantStatus,
        now: NaiveDateTime,
    ) -> CoreResult<CaregiverGrant> {
        let grant = self.load(grant_id)?;
        if !from.contains(&grant.status)
            || !self.db.transition_grant(grant_id, grant.status, next, &now)?
        {
            return Err(CoreError::InvalidState(format!(
                "grant {grant_id} cannot move from {} to {}",
                grant.status.as_str(),
                next.as_str()
            )));
        }
        tracing::info!(grant_id, status = next.as_str(), "caregiver grant updated");
        self.load(grant_id)
    }
}

fn validate_keys(keys: &[String]) -> CoreResult<BTreeSet<String>> {
    if let Some(unknown) = keys.iter().find(|k| !permissions::is_known(k)) {
        return Err(CoreError::Validation(format!("unknown permission key '{unknown}'")));
    }
    Ok(keys.iter().cloned().collect())
}
