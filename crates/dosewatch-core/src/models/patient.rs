//! Patient models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A patient known to the core.
///
/// Identity and login live with the external auth layer; this row only anchors
/// prescriptions, alerts and notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Creation timestamp
    pub created_at: NaiveDateTime,
}

impl Patient {
    /// Create a new patient.
    pub fn new(name: String, now: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let patient = Patient::new("Ana".into(), now);
        assert_eq!(patient.name, "Ana");
        assert_eq!(patient.id.len(), 36); // UUID format
    }
}
