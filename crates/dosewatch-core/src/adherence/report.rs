//! Adherence report aggregation.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::models::{DateWindow, DoseInstance, DoseStatus, Prescription};

/// Dose counts over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdherenceCounts {
    pub scheduled: u32,
    pub taken: u32,
    pub missed: u32,
    pub skipped: u32,
    pub pending: u32,
    /// Taken doses within the punctuality tolerance
    pub punctual: u32,
}

impl AdherenceCounts {
    fn record(&mut self, dose: &DoseInstance, tolerance: Duration) {
        self.scheduled += 1;
        match dose.status {
            DoseStatus::Taken => {
                self.taken += 1;
                if dose.is_punctual(tolerance) {
                    self.punctual += 1;
                }
            }
            DoseStatus::Missed => self.missed += 1,
            DoseStatus::Skipped => self.skipped += 1,
            DoseStatus::Pending => self.pending += 1,
        }
    }

    fn add(&mut self, other: &AdherenceCounts) {
        self.scheduled += other.scheduled;
        self.taken += other.taken;
        self.missed += other.missed;
        self.skipped += other.skipped;
        self.pending += other.pending;
        self.punctual += other.punctual;
    }

    /// Punctual taken doses / taken doses; `None` when nothing was taken.
    pub fn punctuality_rate(&self) -> Option<f64> {
        ratio(self.punctual, self.taken)
    }

    /// Taken doses / resolved doses; `None` when nothing was resolved.
    pub fn adherence_rate(&self) -> Option<f64> {
        ratio(self.taken, self.taken + self.missed + self.skipped)
    }
}

fn ratio(numerator: u32, denominator: u32) -> Option<f64> {
    (denominator > 0).then(|| f64::from(numerator) / f64::from(denominator))
}

/// Adherence of one prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionAdherence {
    pub prescription_id: String,
    pub medication_id: String,
    pub counts: AdherenceCounts,
    pub punctuality_rate: Option<f64>,
    pub adherence_rate: Option<f64>,
}

/// Adherence of a patient over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceReport {
    pub patient_id: String,
    pub period: DateWindow,
    pub tolerance_minutes: i64,
    pub prescriptions: Vec<PrescriptionAdherence>,
    pub totals: AdherenceCounts,
}

/// Aggregate doses per prescription.
///
/// Prescriptions without doses in the period are omitted; doses of unknown
/// prescriptions are ignored.
pub fn build_report(
    patient_id: &str,
    period: DateWindow,
    prescriptions: &[Prescription],
    doses: &[DoseInstance],
    tolerance: Duration,
) -> AdherenceReport {
    let mut per_prescription: BTreeMap<&str, AdherenceCounts> = BTreeMap::new();
    for dose in doses.iter().filter(|d| period.contains(d.scheduled_at.date())) {
        per_prescription
            .entry(dose.prescription_id.as_str())
            .or_default()
            .record(dose, tolerance);
    }

    let mut totals = AdherenceCounts::default();
    let mut rows = Vec::new();
    for prescription in prescriptions {
        let Some(counts) = per_prescription.get(prescription.id.as_str()) else {
            continue;
        };
        totals.add(counts);
        rows.push(PrescriptionAdherence {
            prescription_id: prescription.id.clone(),
            medication_id: prescription.medication_id.clone(),
            counts: *counts,
            punctuality_rate: counts.punctuality_rate(),
            adherence_rate: counts.adherence_rate(),
        });
    }

    AdherenceReport {
        patient_id: patient_id.to_string(),
        period,
        tolerance_minutes: tolerance.num_minutes(),
        prescriptions: rows,
        totals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_time_slots;
    use crate::test_support::{at, day, now};

    fn dose(rx: &str, d: u32, status: DoseStatus, taken_min_late: Option<i64>) -> DoseInstance {
        let mut dose = DoseInstance::new(rx.into(), at(d, 8, 0), now());
        dose.status = status;
        dose.taken_at = taken_min_late.map(|m| dose.scheduled_at + Duration::minutes(m));
        dose
    }

    fn prescription(id: &str) -> Prescription {
        let mut rx = Prescription::new(
            "p1".into(),
            format!("med-{id}"),
            "1 tablet".into(),
            parse_time_slots(&["08:00"]).unwrap(),
            day(1),
            now(),
        );
        rx.id = id.into();
        rx
    }

    #[test]
    fn test_counts_and_rates() {
        let doses = vec![
            dose("rx1", 1, DoseStatus::Taken, Some(10)),
            dose("rx1", 2, DoseStatus::Taken, Some(90)),
            dose("rx1", 3, DoseStatus::Missed, None),
            dose("rx1", 4, DoseStatus::Skipped, None),
            dose("rx1", 5, DoseStatus::Pending, None),
            dose("rx2", 1, DoseStatus::Taken, Some(-30)),
        ];
        let report = build_report(
            "p1",
            DateWindow::new(day(1), day(5)).unwrap(),
            &[prescription("rx1"), prescription("rx2"), prescription("rx3")],
            &doses,
            Duration::minutes(60),
        );

        assert_eq!(report.prescriptions.len(), 2);
        let rx1 = &report.prescriptions[0];
        assert_eq!(
            rx1.counts,
            AdherenceCounts {
                scheduled: 5,
                taken: 2,
                missed: 1,
                skipped: 1,
                pending: 1,
                punctual: 1,
            }
        );
        assert_eq!(rx1.punctuality_rate, Some(0.5));
        assert_eq!(rx1.adherence_rate, Some(0.5));
        assert_eq!(rx1.medication_id, "med-rx1");

        assert_eq!(report.prescriptions[1].punctuality_rate, Some(1.0));
        assert_eq!(report.totals.scheduled, 6);
        assert_eq!(report.totals.taken, 3);
        assert_eq!(report.tolerance_minutes, 60);
    }

    #[test]
    fn test_period_filters_and_empty_rates() {
        let doses = vec![
            dose("rx1", 1, DoseStatus::Pending, None),
            dose("rx1", 9, DoseStatus::Taken, Some(0)),
        ];
        let report = build_report(
            "p1",
            DateWindow::new(day(1), day(2)).unwrap(),
            &[prescription("rx1")],
            &doses,
            Duration::minutes(60),
        );
        let rx1 = &report.prescriptions[0];
        assert_eq!(rx1.counts.scheduled, 1);
        assert_eq!(rx1.punctuality_rate, None);
        assert_eq!(rx1.adherence_rate, None);
    }
}
