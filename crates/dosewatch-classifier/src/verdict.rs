//! Classifier verdicts and parsing of LLM output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifier errors.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Raw verdict for one medication pair.
///
/// `severity` is the classifier's own vocabulary; the detector normalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(alias = "hasInteraction")]
    pub has_interaction: bool,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
}

impl Verdict {
    pub fn none() -> Self {
        Self {
            has_interaction: false,
            severity: "none".into(),
            description: String::new(),
        }
    }
}

/// Parse LLM output into a verdict.
pub fn parse_verdict(response: &str) -> ClassifierResult<Verdict> {
    // Models sometimes wrap the object in prose or code fences
    let json_start = response.find('{').ok_or_else(|| {
        ClassifierError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = response.rfind('}').ok_or_else(|| {
        ClassifierError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(ClassifierError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let verdict: Verdict = serde_json::from_str(&response[json_start..=json_end])?;
    Ok(verdict)
}
