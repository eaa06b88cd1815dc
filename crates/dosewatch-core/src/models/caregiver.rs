//! Caregiver grant models.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Capability keys a patient can grant to a caregiver.
pub mod permissions {
    pub const MEDICATIONS_VIEW: &str = "patient.medications.view";
    pub const MEDICATIONS_EDIT: &str = "patient.medications.edit";
    pub const ADHERENCE_VIEW: &str = "patient.adherence.view";
    pub const ADHERENCE_MARK: &str = "patient.adherence.mark";
    pub const ALERTS_MANAGE: &str = "patient.alerts.manage";
    pub const NOTIFICATIONS_MANAGE: &str = "patient.notifications.manage";

    pub const ALL: &[&str] = &[
        MEDICATIONS_VIEW,
        MEDICATIONS_EDIT,
        ADHERENCE_VIEW,
        ADHERENCE_MARK,
        ALERTS_MANAGE,
        NOTIFICATIONS_MANAGE,
    ];

    pub fn is_known(key: &str) -> bool {
        ALL.contains(&key)
    }
}

/// Relationship state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    /// Invited, not yet accepted
    Pending,
    Active,
    Revoked,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantStatus::Pending => "pending",
            GrantStatus::Active => "active",
            GrantStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GrantStatus::Pending),
            "active" => Some(GrantStatus::Active),
            "revoked" => Some(GrantStatus::Revoked),
            _ => None,
        }
    }
}

/// A caregiver's relationship to one patient (`CaregiverPatient`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaregiverGrant {
    /// Unique identifier
    pub id: String,
    pub caregiver_id: String,
    pub patient_id: String,
    pub status: GrantStatus,
    /// Granted permission keys
    pub permissions: BTreeSet<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CaregiverGrant {
    /// Create a pending invitation.
    pub fn invite(caregiver_id: String, patient_id: String, now: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            caregiver_id,
            patient_id,
            status: GrantStatus::Pending,
            permissions: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the grant currently confers `permission`.
    pub fn allows(&self, permission: &str) -> bool {
        self.status == GrantStatus::Active && self.permissions.contains(permission)
    }
}
