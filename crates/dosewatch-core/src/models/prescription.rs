//! Prescription models.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A time-of-day slot at which a dose is due, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    pub fn new(hour: u32, minute: u32) -> CoreResult<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(TimeSlot)
            .ok_or_else(|| CoreError::Validation(format!("invalid time slot {hour:02}:{minute:02}")))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// Timestamp of this slot on the given day.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }
}

impl FromStr for TimeSlot {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("invalid time slot '{s}', expected HH:MM"));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        TimeSlot::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.to_string()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// Parse a list of `HH:MM` strings into a sorted, de-duplicated slot set.
pub fn parse_time_slots<S: AsRef<str>>(raw: &[S]) -> CoreResult<Vec<TimeSlot>> {
    if raw.is_empty() {
        return Err(CoreError::Validation("at least one time slot is required".into()));
    }
    let mut slots = raw
        .iter()
        .map(|s| s.as_ref().parse())
        .collect::<CoreResult<Vec<TimeSlot>>>()?;
    slots.sort();
    slots.dedup();
    Ok(slots)
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::Validation(format!(
                "window start {start} is after window end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `days` days starting at `start` (at least one day).
    pub fn starting(start: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start,
            end: start + Duration::days(span),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A medication prescribed to a patient (`UserMedication`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    /// Unique identifier
    pub id: String,
    /// Patient the prescription belongs to
    pub patient_id: String,
    /// Catalog medication
    pub medication_id: String,
    /// Free-text dosage (e.g., "1 tablet", "5 mL")
    pub dosage: String,
    /// Daily time slots, sorted
    pub time_slots: Vec<TimeSlot>,
    /// Administration route (e.g., "oral")
    pub route: Option<String>,
    /// First day of the course
    pub start_date: NaiveDate,
    /// Last day of the course, inclusive
    pub end_date: Option<NaiveDate>,
    /// Course length in days, used when `end_date` is absent
    pub duration_days: Option<u32>,
    /// Units dispensed at creation
    pub initial_stock: u32,
    /// Units left
    pub current_stock: u32,
    /// Stock level at or below which a low-stock notification is raised
    pub low_stock_threshold: u32,
    /// Set once a low-stock notification was raised for the current crossing
    pub low_stock_notified: bool,
    /// Soft-delete flag; discontinued prescriptions are never removed
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Prescription {
    /// Create a new active prescription.
    pub fn new(
        patient_id: String,
        medication_id: String,
        dosage: String,
        time_slots: Vec<TimeSlot>,
        start_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            medication_id,
            dosage,
            time_slots,
            route: None,
            start_date,
            end_date: None,
            duration_days: None,
            initial_stock: 0,
            current_stock: 0,
            low_stock_threshold: 0,
            low_stock_notified: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the stock counters; current stock starts at the initial stock.
    pub fn with_stock(mut self, initial_stock: u32, low_stock_threshold: u32) -> Self {
        self.initial_stock = initial_stock;
        self.current_stock = initial_stock;
        self.low_stock_threshold = low_stock_threshold;
        self
    }

    /// Last day of the course, from `end_date` or `start_date + duration_days - 1`.
    pub fn effective_end_date(&self) -> Option<NaiveDate> {
        self.end_date.or_else(|| {
            self.duration_days
                .filter(|days| *days > 0)
                .map(|days| self.start_date + Duration::days(i64::from(days) - 1))
        })
    }

    /// Whether doses are due on the given day.
    pub fn is_scheduled_on(&self, date: NaiveDate) -> bool {
        self.active
            && date >= self.start_date
            && self.effective_end_date().map_or(true, |end| date <= end)
    }

    /// Whether the course finished before the given day.
    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.effective_end_date().map_or(false, |end| end < today)
    }

    /// Whether stock is at or below the low-stock threshold.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.low_stock_threshold
    }

    /// Slot following `slot` within the same day, if any.
    pub fn next_slot_after(&self, slot: NaiveTime) -> Option<TimeSlot> {
        self.time_slots.iter().copied().find(|s| s.time() > slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_prescription() -> Prescription {
        Prescription::new(
            "patient-1".into(),
            "med-1".into(),
            "1 tablet".into(),
            parse_time_slots(&["20:00", "08:00"]).unwrap(),
            date(2025, 1, 1),
            date(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_parse_time_slots_sorted_and_deduplicated() {
        let slots = parse_time_slots(&["20:00", "08:00", "08:00"]).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].to_string(), "08:00");
        assert_eq!(slots[1].to_string(), "20:00");
    }

    #[test]
    fn test_invalid_time_slots() {
        assert!("8:00".parse::<TimeSlot>().is_err());
        assert!("25:00".parse::<TimeSlot>().is_err());
        assert!("08:60".parse::<TimeSlot>().is_err());
        assert!("0800".parse::<TimeSlot>().is_err());
        assert!(parse_time_slots::<&str>(&[]).is_err());
    }

    #[test]
    fn test_time_slot_serde() {
        let slot: TimeSlot = serde_json::from_str("\"07:30\"").unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "\"07:30\"");
        assert!(serde_json::from_str::<TimeSlot>("\"7:30\"").is_err());
    }

    #[test]
    fn test_effective_end_date_from_duration() {
        let mut p = make_prescription();
        assert_eq!(p.effective_end_date(), None);

        p.duration_days = Some(10);
        assert_eq!(p.effective_end_date(), Some(date(2025, 1, 10)));

        p.end_date = Some(date(2025, 1, 5));
        assert_eq!(p.effective_end_date(), Some(date(2025, 1, 5)));
    }

    #[test]
    fn test_is_scheduled_on() {
        let mut p = make_prescription();
        p.end_date = Some(date(2025, 1, 3));
        assert!(!p.is_scheduled_on(date(2024, 12, 31)));
        assert!(p.is_scheduled_on(date(2025, 1, 1)));
        assert!(p.is_scheduled_on(date(2025, 1, 3)));
        assert!(!p.is_scheduled_on(date(2025, 1, 4)));
        assert!(p.has_ended(date(2025, 1, 4)));

        p.active = false;
        assert!(!p.is_scheduled_on(date(2025, 1, 2)));
    }

    #[test]
    fn test_date_window() {
        assert!(DateWindow::new(date(2025, 1, 2), date(2025, 1, 1)).is_err());
        let window = DateWindow::starting(date(2025, 1, 1), 7);
        assert_eq!(window.end, date(2025, 1, 7));
        assert!(window.contains(date(2025, 1, 7)));
        assert!(!window.contains(date(2025, 1, 8)));
    }

    #[test]
    fn test_next_slot_after() {
        let p = make_prescription();
        let eight = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(p.next_slot_after(eight).unwrap().to_string(), "20:00");
        let twenty = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        assert!(p.next_slot_after(twenty).is_none());
    }

    #[test]
    fn test_low_stock() {
        let p = make_prescription().with_stock(5, 5);
        assert!(p.is_low_stock());
        let p = make_prescription().with_stock(6, 5);
        assert!(!p.is_low_stock());
    }
}
