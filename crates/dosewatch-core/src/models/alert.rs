//! Interaction alert models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Severity of a persisted interaction alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Mild,
    Moderate,
    Severe,
    Contraindicated,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Mild => "mild",
            AlertSeverity::Moderate => "moderate",
            AlertSeverity::Severe => "severe",
            AlertSeverity::Contraindicated => "contraindicated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mild" => Some(AlertSeverity::Mild),
            "moderate" => Some(AlertSeverity::Moderate),
            "severe" => Some(AlertSeverity::Severe),
            "contraindicated" => Some(AlertSeverity::Contraindicated),
            _ => None,
        }
    }

    /// Urgent alerts go out immediately, ignoring quiet hours.
    pub fn is_urgent(&self) -> bool {
        matches!(self, AlertSeverity::Severe | AlertSeverity::Contraindicated)
    }
}

/// Unordered medication pair, normalized by sorting the ids.
///
/// Used for lookups only; alert rows keep the medication order they were
/// created with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { low: a.to_string(), high: b.to_string() }
        } else {
            Self { low: b.to_string(), high: a.to_string() }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    /// Storage form of the key.
    pub fn as_storage_key(&self) -> String {
        format!("{}|{}", self.low, self.high)
    }
}

/// A persisted interaction alert for one patient and medication pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionAlert {
    /// Unique identifier
    pub id: String,
    pub patient_id: String,
    /// First medication, as reported by the detector
    pub medication_1_id: String,
    /// Second medication, as reported by the detector
    pub medication_2_id: String,
    pub severity: AlertSeverity,
    pub description: String,
    pub recommendation: String,
    pub detected_at: NaiveDateTime,
    /// Set when the patient or a caregiver acknowledged the alert
    pub acknowledged_at: Option<NaiveDateTime>,
}

impl InteractionAlert {
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.medication_1_id, &self.medication_2_id)
    }

    /// An alert is open until acknowledged.
    pub fn is_open(&self) -> bool {
        self.acknowledged_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_unordered() {
        assert_eq!(PairKey::new("a", "b"), PairKey::new("b", "a"));
        assert_eq!(PairKey::new("b", "a").as_storage_key(), "a|b");
        assert_eq!(PairKey::new("b", "a").low(), "a");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Contraindicated > AlertSeverity::Severe);
        assert!(AlertSeverity::Moderate > AlertSeverity::Mild);
        assert!(AlertSeverity::Severe.is_urgent());
        assert!(!AlertSeverity::Moderate.is_urgent());
    }
}
