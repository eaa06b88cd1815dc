//! Rule-table classifier.
//!
//! Looks pairs up in a table of known interactions. Names are matched on the
//! generic name with Jaro-Winkler similarity so common spelling variants
//! ("warfarine", "amiodaron") still hit.

use strsim::jaro_winkler;

use crate::{ClassifierResult, DrugRef, InteractionClassifier, Verdict};

/// Minimum similarity for a fuzzy name match.
const NAME_MATCH_THRESHOLD: f64 = 0.93;

/// A known interaction between two substances.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRule {
    pub first: String,
    pub second: String,
    pub severity: String,
    pub description: String,
}

impl InteractionRule {
    pub fn new(first: &str, second: &str, severity: &str, description: &str) -> Self {
        Self {
            first: first.to_lowercase(),
            second: second.to_lowercase(),
            severity: severity.to_string(),
            description: description.to_string(),
        }
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        (names_match(&self.first, a) && names_match(&self.second, b))
            || (names_match(&self.first, b) && names_match(&self.second, a))
    }
}

/// Classifier backed by a static interaction table.
pub struct RuleTableClassifier {
    rules: Vec<InteractionRule>,
}

impl RuleTableClassifier {
    /// Create an empty classifier.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a classifier with a small table of well-known interactions.
    pub fn with_common_rules() -> Self {
        Self {
            rules: vec![
                InteractionRule::new(
                    "warfarin",
                    "aspirin",
                    "major",
                    "Aspirin increases the anticoagulant effect of warfarin and the risk of bleeding.",
                ),
                InteractionRule::new(
                    "warfarin",
                    "ibuprofen",
                    "major",
                    "NSAIDs combined with warfarin raise the risk of gastrointestinal bleeding.",
                ),
                InteractionRule::new(
                    "sildenafil",
                    "nitroglycerin",
                    "contraindicated",
                    "The combination can cause a dangerous drop in blood pressure.",
                ),
                InteractionRule::new(
                    "simvastatin",
                    "clarithromycin",
                    "contraindicated",
                    "Clarithromycin raises simvastatin levels and the risk of muscle damage.",
                ),
                InteractionRule::new(
                    "lisinopril",
                    "spironolactone",
                    "moderate",
                    "Both drugs raise potassium levels; blood tests may be needed.",
                ),
                InteractionRule::new(
                    "metformin",
                    "furosemide",
                    "mild",
                    "Furosemide may slightly increase metformin levels.",
                ),
                InteractionRule::new(
                    "omeprazole",
                    "levothyroxine",
                    "minor",
                    "Reduced stomach acid may slightly lower levothyroxine absorption.",
                ),
            ],
        }
    }

    /// Add a rule to the table.
    pub fn with_rule(mut self, rule: InteractionRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Look a pair up without going through the trait.
    pub fn lookup(&self, a: &DrugRef, b: &DrugRef) -> Option<&InteractionRule> {
        let a = a.match_name().to_lowercase();
        let b = b.match_name().to_lowercase();
        self.rules.iter().find(|rule| rule.matches(&a, &b))
    }
}

impl Default for RuleTableClassifier {
    fn default() -> Self {
        Self::with_common_rules()
    }
}

impl InteractionClassifier for RuleTableClassifier {
    fn classify(&self, a: &DrugRef, b: &DrugRef) -> ClassifierResult<Verdict> {
        Ok(match self.lookup(a, b) {
            Some(rule) => Verdict {
                has_interaction: true,
                severity: rule.severity.clone(),
                description: rule.description.clone(),
            },
            None => Verdict::none(),
        })
    }
}

fn names_match(rule_name: &str, candidate: &str) -> bool {
    if rule_name == candidate {
        return true;
    }
    // Label names often carry strength or form ("Warfarin 5mg tablets")
    if candidate
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == rule_name)
    {
        return true;
    }
    jaro_winkler(rule_name, candidate) >= NAME_MATCH_THRESHOLD
}
