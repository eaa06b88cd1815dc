//! Prompts for LLM-backed interaction classification.
//!
//! These prompts ask for a single JSON verdict per medication pair.

use crate::DrugRef;

/// System prompt for pairwise interaction classification.
pub const SYSTEM_PROMPT: &str = r#"You are a clinical pharmacology assistant that assesses drug-drug interactions for a patient medication list.

For the two medications given, decide whether they interact and how severe the interaction is.

Use exactly one of these severity values:
- none: no known interaction
- minor: clinically insignificant
- mild: minor effects, monitoring may help
- moderate: may require dosage adjustment or monitoring
- severe: may cause serious adverse effects
- contraindicated: must not be combined

Output a JSON object with "has_interaction", "severity" and "description"."#;

/// Few-shot examples for better classification consistency.
pub const FEW_SHOT_EXAMPLES: &[(&str, &str, &str)] = &[
    (
        "Warfarin",
        "Aspirin",
        r#"{"has_interaction":true,"severity":"severe","description":"Taking aspirin with warfarin greatly increases the risk of bleeding."}"#,
    ),
    (
        "Lisinopril",
        "Paracetamol",
        r#"{"has_interaction":false,"severity":"none","description":""}"#,
    ),
];

/// User prompt for one medication pair.
pub fn make_classification_prompt(a: &DrugRef, b: &DrugRef) -> String {
    format!(
        r#"Assess the interaction between these two medications:

1. {}
2. {}

Return a JSON object with:
- has_interaction: true or false
- severity: one of none, minor, mild, moderate, severe, contraindicated
- description: one or two sentences a patient can understand (empty if none)"#,
        describe(a),
        describe(b)
    )
}

/// System prompt with the few-shot examples appended.
pub fn system_prompt_with_examples() -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\nExamples:");
    for (first, second, output) in FEW_SHOT_EXAMPLES {
        prompt.push_str(&format!("\n\n{first} + {second}:\n{output}"));
    }
    prompt
}

fn describe(drug: &DrugRef) -> String {
    match &drug.generic_name {
        Some(generic) if !generic.eq_ignore_ascii_case(&drug.name) => {
            format!("{} ({})", drug.name, generic)
        }
        _ => drug.name.clone(),
    }
}
