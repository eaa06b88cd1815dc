//! Severity vocabulary normalization.
//!
//! Classifiers report severity in whatever words they were trained or
//! configured with. Everything downstream works on [`Severity`].

use serde::{Deserialize, Serialize};

use crate::Verdict;

/// Normalized interaction severity, ordered from harmless to forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Minor,
    Mild,
    Moderate,
    Severe,
    Contraindicated,
}

impl Severity {
    /// Map a classifier label onto the normalized scale.
    ///
    /// Returns `None` for vocabulary outside the known synonyms, including an
    /// empty label.
    pub fn from_label(label: &str) -> Option<Self> {
        let severity = match label.trim().to_lowercase().as_str() {
            "none" | "no" => Severity::None,
            "minor" => Severity::Minor,
            "mild" | "low" => Severity::Mild,
            "moderate" | "medium" => Severity::Moderate,
            "severe" | "major" | "high" => Severity::Severe,
            "contraindicated" | "x" => Severity::Contraindicated,
            _ => return None,
        };
        Some(severity)
    }

    /// Whether a finding at this level is worth an alert.
    pub fn is_actionable(&self) -> bool {
        *self >= Severity::Mild
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Contraindicated => "contraindicated",
        }
    }
}

impl Verdict {
    /// Normalized severity of this verdict.
    ///
    /// A verdict without an interaction is always `None`, whatever its label.
    /// Unknown labels on a positive verdict yield `Err` with the raw label.
    pub fn normalized_severity(&self) -> Result<Severity, String> {
        if !self.has_interaction {
            return Ok(Severity::None);
        }
        Severity::from_label(&self.severity).ok_or_else(|| self.severity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(has_interaction: bool, severity: &str) -> Verdict {
        Verdict {
            has_interaction,
            severity: severity.into(),
            description: String::new(),
        }
    }

    #[test]
    fn test_synonyms() {
        assert_eq!(Severity::from_label("Major"), Some(Severity::Severe));
        assert_eq!(Severity::from_label("high"), Some(Severity::Severe));
        assert_eq!(Severity::from_label("medium"), Some(Severity::Moderate));
        assert_eq!(Severity::from_label(" low "), Some(Severity::Mild));
        assert_eq!(Severity::from_label("X"), Some(Severity::Contraindicated));
        assert_eq!(Severity::from_label("minor"), Some(Severity::Minor));
        assert_eq!(Severity::from_label("catastrophic"), None);
    }

    #[test]
    fn test_actionable_threshold() {
        assert!(!Severity::None.is_actionable());
        assert!(!Severity::Minor.is_actionable());
        assert!(Severity::Mild.is_actionable());
        assert!(Severity::Contraindicated.is_actionable());
    }

    #[test]
    fn test_negative_verdict_is_none() {
        assert_eq!(verdict(false, "severe").normalized_severity(), Ok(Severity::None));
        assert_eq!(verdict(true, "major").normalized_severity(), Ok(Severity::Severe));
        assert_eq!(
            verdict(true, "weird").normalized_severity(),
            Err("weird".to_string())
        );
    }

    #[test]
    fn test_missing_label_on_positive_verdict_is_unknown() {
        assert_eq!(Severity::from_label(""), None);
        assert_eq!(Severity::from_label("   "), None);
        assert_eq!(verdict(true, "").normalized_severity(), Err(String::new()));
        assert_eq!(verdict(false, "").normalized_severity(), Ok(Severity::None));
    }
}
