//! Interaction detector.
//!
//! Classifier calls may block on a remote model. Each batch of pairs runs on
//! worker threads and is collected until a shared deadline; pairs without an
//! answer by then are deferred, never read as "no interaction". Workers that
//! overrun are abandoned, not joined.

use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use dosewatch_classifier::{ClassifierResult, DrugRef, InteractionClassifier, Severity, Verdict};

use super::{Finding, MedicationCatalog};
use crate::config::Settings;
use crate::error::CoreResult;
use crate::models::{AlertSeverity, Medication};

/// Counters for one detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Pairs the classifier answered for
    pub pairs_evaluated: usize,
    /// Answered pairs below the alert threshold
    pub discarded: usize,
    /// Pairs that timed out or failed; retry on a later run
    pub deferred: usize,
    pub alerts_created: usize,
    pub notifications_scheduled: usize,
}

/// Findings of a run and its counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub findings: Vec<Finding>,
    pub report: DetectionReport,
}

/// Unordered pairs to classify.
///
/// With a focus medication, only pairs containing it; otherwise every pair.
/// Each pair is listed once with the focus (or earlier medication) first.
pub fn candidate_pairs<'m>(
    medications: &'m [Medication],
    focus_medication_id: Option<&str>,
) -> Vec<(&'m Medication, &'m Medication)> {
    match focus_medication_id {
        Some(focus_id) => {
            let Some(focus) = medications.iter().find(|m| m.id == focus_id) else {
                return Vec::new();
            };
            medications
                .iter()
                .filter(|m| m.id != focus_id)
                .map(|other| (focus, other))
                .collect()
        }
        None => medications
            .iter()
            .enumerate()
            .flat_map(|(i, a)| medications[i + 1..].iter().map(move |b| (a, b)))
            .collect(),
    }
}

pub struct InteractionDetector<'a> {
    catalog: &'a dyn MedicationCatalog,
    classifier: Arc<dyn InteractionClassifier>,
    timeout: Duration,
    batch_size: usize,
}

impl<'a> InteractionDetector<'a> {
    pub fn new(
        catalog: &'a dyn MedicationCatalog,
        classifier: Arc<dyn InteractionClassifier>,
        settings: &Settings,
    ) -> Self {
        Self {
            catalog,
            classifier,
            timeout: settings.classifier_timeout(),
            batch_size: settings.classifier_batch_size.max(1),
        }
    }

    /// Classify the patient's active medication pairs.
    pub fn detect(
        &self,
        patient_id: &str,
        focus_medication_id: Option<&str>,
        today: NaiveDate,
    ) -> CoreResult<Detection> {
        let medications = self
            .catalog
            .find_active_medications_for_patient(patient_id, today)?;
        let pairs = candidate_pairs(&medications, focus_medication_id);

        let mut report = DetectionReport::default();
        let mut findings = Vec::new();
        for batch in pairs.chunks(self.batch_size) {
            let mut verdicts = self.classify_batch(batch);
            for (index, (a, b)) in batch.iter().enumerate() {
                match verdicts.remove(&index) {
                    Some(Ok(verdict)) => {
                        report.pairs_evaluated += 1;
                        match to_finding(a, b, &verdict) {
                            Some(finding) => findings.push(finding),
                            None => report.discarded += 1,
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            patient_id,
                            medication_1_id = %a.id,
                            medication_2_id = %b.id,
                            error = %e,
                            "classifier failed, pair deferred"
                        );
                        report.deferred += 1;
                    }
                    None => {
                        tracing::warn!(
                            patient_id,
                            medication_1_id = %a.id,
                            medication_2_id = %b.id,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "classifier timed out, pair deferred"
                        );
                        report.deferred += 1;
                    }
                }
            }
        }

        tracing::info!(
            patient_id,
            evaluated = report.pairs_evaluated,
            findings = findings.len(),
            deferred = report.deferred,
            "interaction detection finished"
        );
        Ok(Detection { findings, report })
    }

    /// Run one batch concurrently; answers missing from the map timed out.
    fn classify_batch(
        &self,
        batch: &[(&Medication, &Medication)],
    ) -> HashMap<usize, ClassifierResult<Verdict>> {
        let (tx, rx) = mpsc::channel();
        for (index, (a, b)) in batch.iter().enumerate() {
            let classifier = Arc::clone(&self.classifier);
            let tx = tx.clone();
            let (a, b): (DrugRef, DrugRef) = (a.to_drug_ref(), b.to_drug_ref());
            thread::spawn(move || {
                // Receiver may be gone after the deadline
                let _ = tx.send((index, classifier.classify(&a, &b)));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let mut verdicts = HashMap::new();
        while verdicts.len() < batch.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, verdict)) => {
                    verdicts.insert(index, verdict);
                }
                Err(_) => break,
            }
        }
        verdicts
    }
}

/// Shape a verdict into a finding, or `None` if it is below alert level.
fn to_finding(a: &Medication, b: &Medication, verdict: &Verdict) -> Option<Finding> {
    let severity = verdict.normalized_severity().unwrap_or_else(|label| {
        tracing::warn!(label = %label, "unknown severity label, treating as moderate");
        Severity::Moderate
    });
    let severity = AlertSeverity::from_normalized(severity)?;

    let description = if verdict.description.trim().is_empty() {
        format!("{} may interact with {}.", a.name, b.name)
    } else {
        verdict.description.trim().to_string()
    };
    Some(Finding {
        medication_1_id: a.id.clone(),
        medication_2_id: b.id.clone(),
        severity,
        description,
    })
}
