//! Alert deduplication.
//!
//! One open alert per unordered medication pair and patient. A finding for a
//! pair that already has an open alert is dropped; once that alert is
//! acknowledged the same finding raises a fresh alert.

use chrono::NaiveDateTime;

use super::Finding;
use crate::db::{Database, InsertOutcome};
use crate::error::CoreResult;
use crate::models::{AlertSeverity, InteractionAlert, PairKey};

/// Alert storage as seen by the deduplicator.
pub trait AlertRepository {
    /// The open alert for `pair`, whichever order it was stored in.
    fn find_open_alert(
        &self,
        patient_id: &str,
        pair: &PairKey,
    ) -> CoreResult<Option<InteractionAlert>>;

    /// Insert an alert; a concurrent open alert for the pair yields
    /// `AlreadyExists`.
    fn insert_alert(&self, alert: &InteractionAlert) -> CoreResult<InsertOutcome>;
}

impl AlertRepository for Database {
    fn find_open_alert(
        &self,
        patient_id: &str,
        pair: &PairKey,
    ) -> CoreResult<Option<InteractionAlert>> {
        Ok(self.find_open_interaction_alert(patient_id, pair)?)
    }

    fn insert_alert(&self, alert: &InteractionAlert) -> CoreResult<InsertOutcome> {
        Ok(self.insert_interaction_alert(alert)?)
    }
}

/// Patient-facing advice for a severity.
pub fn recommendation_for(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Severe | AlertSeverity::Contraindicated => {
            "Consult your doctor immediately; this combination may cause serious adverse effects."
        }
        AlertSeverity::Moderate => {
            "Inform your doctor about this interaction; dosage adjustment may be required."
        }
        AlertSeverity::Mild => {
            "Monitor for side effects and mention this combination at your next visit."
        }
    }
}

pub struct AlertDeduplicator<'r, R: AlertRepository + ?Sized> {
    repo: &'r R,
}

impl<'r, R: AlertRepository + ?Sized> AlertDeduplicator<'r, R> {
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Persist alerts for findings without an open alert. Returns the alerts
    /// created by this call.
    pub fn process(
        &self,
        patient_id: &str,
        findings: &[Finding],
        now: NaiveDateTime,
    ) -> CoreResult<Vec<InteractionAlert>> {
        let mut created = Vec::new();
        for finding in findings {
            let pair = PairKey::new(&finding.medication_1_id, &finding.medication_2_id);
            if let Some(open) = self.repo.find_open_alert(patient_id, &pair)? {
                tracing::debug!(alert_id = %open.id, pair = %pair.as_storage_key(), "open alert exists");
                continue;
            }

            let alert = InteractionAlert {
                id: uuid::Uuid::new_v4().to_string(),
                patient_id: patient_id.to_string(),
                medication_1_id: finding.medication_1_id.clone(),
                medication_2_id: finding.medication_2_id.clone(),
                severity: finding.severity,
                description: finding.description.clone(),
                recommendation: recommendation_for(finding.severity).to_string(),
                detected_at: now,
                acknowledged_at: None,
            };
            match self.repo.insert_alert(&alert)? {
                InsertOutcome::Inserted => {
                    tracing::info!(
                        alert_id = %alert.id,
                        patient_id,
                        severity = alert.severity.as_str(),
                        "interaction alert created"
                    );
                    created.push(alert);
                }
                InsertOutcome::AlreadyExists => {
                    tracing::debug!(pair = %pair.as_storage_key(), "lost alert insert race");
                }
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::now;
    use proptest::prelude::*;
    use std::cell::RefCell;

    /// In-memory repository enforcing the single-open-alert rule.
    #[derive(Default)]
    struct MemoryAlerts {
        alerts: RefCell<Vec<InteractionAlert>>,
        /// Simulates a concurrent writer winning the next insert
        lose_next_insert: RefCell<bool>,
    }

    impl MemoryAlerts {
        fn open_count(&self, pair: &PairKey) -> usize {
            self.alerts
                .borrow()
                .iter()
                .filter(|a| a.is_open() && &a.pair_key() == pair)
                .count()
        }

        fn acknowledge_all(&self) {
            for alert in self.alerts.borrow_mut().iter_mut() {
                alert.acknowledged_at.get_or_insert(now());
            }
        }
    }

    impl AlertRepository for MemoryAlerts {
        fn find_open_alert(
            &self,
            patient_id: &str,
            pair: &PairKey,
        ) -> CoreResult<Option<InteractionAlert>> {
            Ok(self
                .alerts
                .borrow()
                .iter()
                .find(|a| a.patient_id == patient_id && a.is_open() && &a.pair_key() == pair)
                .cloned())
        }

        fn insert_alert(&self, alert: &InteractionAlert) -> CoreResult<InsertOutcome> {
            if self.lose_next_insert.replace(false) || self.open_count(&alert.pair_key()) > 0 {
                return Ok(InsertOutcome::AlreadyExists);
            }
            self.alerts.borrow_mut().push(alert.clone());
            Ok(InsertOutcome::Inserted)
        }
    }

    fn finding(a: &str, b: &str, severity: AlertSeverity) -> Finding {
        Finding {
            medication_1_id: a.into(),
            medication_2_id: b.into(),
            severity,
            description: "interaction".into(),
        }
    }

    #[test]
    fn test_reversed_pair_is_same_risk() {
        let repo = MemoryAlerts::default();
        let dedup = AlertDeduplicator::new(&repo);

        let created = dedup
            .process("p1", &[finding("a", "b", AlertSeverity::Severe)], now())
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].recommendation, recommendation_for(AlertSeverity::Severe));

        let again = dedup
            .process("p1", &[finding("b", "a", AlertSeverity::Severe)], now())
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_realert_after_acknowledge() {
        let repo = MemoryAlerts::default();
        let dedup = AlertDeduplicator::new(&repo);
        let findings = [finding("a", "b", AlertSeverity::Moderate)];

        assert_eq!(dedup.process("p1", &findings, now()).unwrap().len(), 1);
        repo.acknowledge_all();
        assert_eq!(dedup.process("p1", &findings, now()).unwrap().len(), 1);
        assert_eq!(repo.alerts.borrow().len(), 2);
    }

    #[test]
    fn test_lost_race_is_a_skip() {
        let repo = MemoryAlerts::default();
        *repo.lose_next_insert.borrow_mut() = true;
        let created = AlertDeduplicator::new(&repo)
            .process("p1", &[finding("a", "b", AlertSeverity::Mild)], now())
            .unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn test_patients_are_independent() {
        let repo = MemoryAlerts::default();
        let dedup = AlertDeduplicator::new(&repo);
        let findings = [finding("a", "b", AlertSeverity::Mild)];
        assert_eq!(dedup.process("p1", &findings, now()).unwrap().len(), 1);
        assert_eq!(dedup.process("p2", &findings, now()).unwrap().len(), 1);
    }

    #[test]
    fn test_recommendations_by_severity() {
        assert_eq!(
            recommendation_for(AlertSeverity::Contraindicated),
            recommendation_for(AlertSeverity::Severe)
        );
        assert!(recommendation_for(AlertSeverity::Mild).starts_with("Monitor"));
        assert!(recommendation_for(AlertSeverity::Moderate).starts_with("Inform"));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Detect(Vec<(u8, u8)>),
        AcknowledgeAll,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => prop::collection::vec((0u8..4, 0u8..4), 0..6).prop_map(Step::Detect),
            1 => Just(Step::AcknowledgeAll),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_open_alert_per_pair(steps in prop::collection::vec(step(), 1..20)) {
            let repo = MemoryAlerts::default();
            let dedup = AlertDeduplicator::new(&repo);
            let meds = ["a", "b", "c", "d"];

            for step in steps {
                match step {
                    Step::Detect(pairs) => {
                        let findings: Vec<Finding> = pairs
                            .into_iter()
                            .filter(|(x, y)| x != y)
                            .map(|(x, y)| finding(meds[x as usize], meds[y as usize], AlertSeverity::Moderate))
                            .collect();
                        dedup.process("p1", &findings, now()).unwrap();
                    }
                    Step::AcknowledgeAll => repo.acknowledge_all(),
                }
                for x in meds {
                    for y in meds {
                        prop_assert!(repo.open_count(&PairKey::new(x, y)) <= 1);
                    }
                }
            }
        }
    }
}
