//! Drug-drug interaction classification.
//!
//! This crate provides the classifier seam used by the interaction detector:
//! an LLM-backed classifier with its prompts and tolerant parsing of JSON
//! verdicts, severity normalization, and a rule-table classifier for offline
//! use and tests. The Ollama HTTP backend is behind the `ollama` feature.

pub mod llm;
pub mod prompts;
pub mod rules;
pub mod severity;
pub mod verdict;

pub use llm::*;
pub use prompts::*;
pub use rules::*;
pub use severity::*;
pub use verdict::*;

/// A medication as seen by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DrugRef {
    pub id: String,
    pub name: String,
    pub generic_name: Option<String>,
}

impl DrugRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            generic_name: None,
        }
    }

    pub fn with_generic(mut self, generic_name: impl Into<String>) -> Self {
        self.generic_name = Some(generic_name.into());
        self
    }

    /// Name used for matching: the generic name when known, else the label name.
    pub fn match_name(&self) -> &str {
        self.generic_name.as_deref().unwrap_or(&self.name)
    }
}

/// External clinical judgment for a single pair of medications.
///
/// Implementations may block on I/O and may fail; callers bound the wait.
pub trait InteractionClassifier: Send + Sync {
    fn classify(&self, a: &DrugRef, b: &DrugRef) -> ClassifierResult<Verdict>;
}
