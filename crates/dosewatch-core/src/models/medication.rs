//! Medication catalog models.

use serde::{Deserialize, Serialize};

use dosewatch_classifier::DrugRef;

/// A single medication in the catalog.
///
/// The catalog is maintained by an import job; the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    /// Unique identifier
    pub id: String,
    /// Label or brand name
    pub name: String,
    /// Generic (active substance) name, if known
    pub generic_name: Option<String>,
    /// Whether this medication is currently listed
    pub active: bool,
}

impl Medication {
    /// Create a new catalog entry with required fields.
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            generic_name: None,
            active: true,
        }
    }

    /// Set the generic name.
    pub fn with_generic(mut self, generic_name: impl Into<String>) -> Self {
        self.generic_name = Some(generic_name.into());
        self
    }

    /// Reference handed to interaction classifiers.
    pub fn to_drug_ref(&self) -> DrugRef {
        DrugRef {
            id: self.id.clone(),
            name: self.name.clone(),
            generic_name: self.generic_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_medication() {
        let med = Medication::new("Coumadin".into()).with_generic("warfarin");
        assert_eq!(med.id.len(), 36);
        assert!(med.active);
        let drug = med.to_drug_ref();
        assert_eq!(drug.match_name(), "warfarin");
    }
}
