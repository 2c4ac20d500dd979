//! Conjunctive filters over mirror contents.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::date_range::DateRange;
use super::stats::PatientMetrics;
use super::{any_contains, needle};
use crate::config::{ComplianceThresholds, StockThresholds};
use crate::models::{
    ActivityLogEntry, ComplianceTier, EventType, MedicationSchedule, ParseEnumError, Patient,
    ScheduleStatus, Severity,
};

/// Stock filter as offered in the schedules view.
///
/// `Low` includes critical stock; use [`crate::models::StockTier`] when the
/// bands must not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockFilter {
    Low,
    Critical,
    Normal,
}

impl StockFilter {
    pub fn matches(&self, stock: u32, thresholds: &StockThresholds) -> bool {
        match self {
            StockFilter::Low => thresholds.is_low(stock),
            StockFilter::Critical => thresholds.is_critical(stock),
            StockFilter::Normal => !thresholds.is_low(stock),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockFilter::Low => "low",
            StockFilter::Critical => "critical",
            StockFilter::Normal => "normal",
        }
    }
}

impl fmt::Display for StockFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(StockFilter::Low),
            "critical" => Ok(StockFilter::Critical),
            "normal" => Ok(StockFilter::Normal),
            other => Err(ParseEnumError::new("stock filter", other)),
        }
    }
}

/// Schedules view filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleFilter {
    /// Matched against medication, patient name and instructions
    pub search: Option<String>,
    pub patient_id: Option<Uuid>,
    pub status: Option<ScheduleStatus>,
    pub stock: Option<StockFilter>,
}

impl ScheduleFilter {
    pub fn matches(&self, schedule: &MedicationSchedule, thresholds: &StockThresholds) -> bool {
        if let Some(needle) = needle(&self.search) {
            let fields = [
                Some(schedule.medication_name.as_str()),
                schedule.patient_name.as_deref(),
                schedule.instructions.as_deref(),
            ];
            if !any_contains(&needle, fields) {
                return false;
            }
        }
        if self.patient_id.is_some_and(|id| id != schedule.patient_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != schedule.status) {
            return false;
        }
        self.stock
            .map_or(true, |stock| stock.matches(schedule.current_stock, thresholds))
    }

    pub fn apply<'a>(
        &self,
        schedules: &'a [MedicationSchedule],
        thresholds: &StockThresholds,
    ) -> Vec<&'a MedicationSchedule> {
        schedules
            .iter()
            .filter(|s| self.matches(s, thresholds))
            .collect()
    }
}

/// Activity view filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityFilter {
    /// Matched against patient name, medication and description
    pub search: Option<String>,
    pub event_type: Option<EventType>,
    pub status: Option<Severity>,
    pub date_range: Option<DateRange>,
}

impl ActivityFilter {
    pub fn matches<Tz: TimeZone>(&self, entry: &ActivityLogEntry, now: &DateTime<Tz>) -> bool {
        if let Some(needle) = needle(&self.search) {
            let fields = [
                entry.patient_name.as_deref(),
                entry.medication_name.as_deref(),
                Some(entry.description.as_str()),
            ];
            if !any_contains(&needle, fields) {
                return false;
            }
        }
        if self.event_type.is_some_and(|t| t != entry.event_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != entry.status) {
            return false;
        }
        self.date_range
            .map_or(true, |range| range.contains(entry.timestamp, now))
    }

    pub fn apply<'a, Tz: TimeZone>(
        &self,
        entries: &'a [ActivityLogEntry],
        now: &DateTime<Tz>,
    ) -> Vec<&'a ActivityLogEntry> {
        entries.iter().filter(|e| self.matches(e, now)).collect()
    }
}

/// Patients view filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientFilter {
    /// Matched against name and condition labels
    pub search: Option<String>,
    /// Exact condition label
    pub condition: Option<String>,
    pub compliance: Option<ComplianceTier>,
}

impl PatientFilter {
    /// A patient without dose history has no compliance figure and never
    /// matches a compliance filter.
    pub fn matches(
        &self,
        patient: &Patient,
        metrics: &PatientMetrics,
        thresholds: &ComplianceThresholds,
    ) -> bool {
        if let Some(needle) = needle(&self.search) {
            let fields = std::iter::once(Some(patient.name.as_str()))
                .chain(patient.medical_conditions.iter().map(|c| Some(c.as_str())));
            if !any_contains(&needle, fields) {
                return false;
            }
        }
        if let Some(condition) = &self.condition {
            if !patient.has_condition(condition) {
                return false;
            }
        }
        match self.compliance {
            None => true,
            Some(tier) => metrics.tier(thresholds) == Some(tier),
        }
    }

    pub fn apply<'a>(
        &self,
        patients: &'a [Patient],
        schedules: &[MedicationSchedule],
        activities: &[ActivityLogEntry],
        thresholds: &ComplianceThresholds,
    ) -> Vec<&'a Patient> {
        patients
            .iter()
            .filter(|p| {
                let metrics = PatientMetrics::compute(p.id, schedules, activities);
                self.matches(p, &metrics, thresholds)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, OwnerId};
    use chrono::{Duration, Utc};

    fn schedule(name: &str, stock: u32, status: ScheduleStatus) -> MedicationSchedule {
        let mut s = MedicationSchedule::new(OwnerId::new(), Uuid::new_v4(), name, "1 tab", Frequency::Daily, stock);
        s.status = status;
        s
    }

    #[test]
    fn test_status_filter_counts() {
        let entries: Vec<_> = [
            ScheduleStatus::Pending,
            ScheduleStatus::Missed,
            ScheduleStatus::Taken,
            ScheduleStatus::Missed,
            ScheduleStatus::Pending,
        ]
        .into_iter()
        .map(|status| schedule("Aspirin", 20, status))
        .collect();

        let filter = ScheduleFilter {
            status: Some(ScheduleStatus::Missed),
            ..Default::default()
        };
        assert_eq!(filter.apply(&entries, &StockThresholds::default()).len(), 2);
    }

    #[test]
    fn test_stock_filters_overlap_as_documented() {
        let t = StockThresholds::default();
        for stock in 0..=20 {
            if StockFilter::Critical.matches(stock, &t) {
                assert!(StockFilter::Low.matches(stock, &t));
            }
            assert!(!(StockFilter::Normal.matches(stock, &t) && StockFilter::Low.matches(stock, &t)));
        }
        assert!(StockFilter::Low.matches(10, &t));
        assert!(StockFilter::Normal.matches(11, &t));
        assert!(StockFilter::Critical.matches(5, &t));
        assert!(!StockFilter::Critical.matches(6, &t));
    }

    #[test]
    fn test_schedule_search_is_case_insensitive_and_conjunctive() {
        let mut metformin = schedule("Metformin", 8, ScheduleStatus::Pending);
        metformin.instructions = Some("Take with FOOD".into());
        let aspirin = schedule("Aspirin", 8, ScheduleStatus::Pending);
        let items = vec![metformin.clone(), aspirin];
        let t = StockThresholds::default();

        let by_instructions = ScheduleFilter {
            search: Some("food".into()),
            ..Default::default()
        };
        assert_eq!(by_instructions.apply(&items, &t), vec![&metformin]);

        let no_match = ScheduleFilter {
            search: Some("food".into()),
            stock: Some(StockFilter::Normal),
            ..Default::default()
        };
        assert!(no_match.apply(&items, &t).is_empty());

        let by_patient = ScheduleFilter {
            patient_id: Some(metformin.patient_id),
            ..Default::default()
        };
        assert_eq!(by_patient.apply(&items, &t).len(), 1);
    }

    #[test]
    fn test_activity_filter() {
        let owner = OwnerId::new();
        let now = Utc::now();
        let mut dispensed = ActivityLogEntry::new(
            owner,
            EventType::MedicationDispensed,
            Severity::Success,
            "Dispensed 1 tab",
        );
        dispensed.patient_name = Some("Mary Smith".into());
        let old = ActivityLogEntry::new(owner, EventType::MedicationMissed, Severity::Error, "Missed dose")
            .at(now - Duration::days(40));
        let entries = vec![dispensed.clone(), old.clone()];

        let search = ActivityFilter {
            search: Some("mary".into()),
            ..Default::default()
        };
        assert_eq!(search.apply(&entries, &now), vec![&dispensed]);

        let errors = ActivityFilter {
            status: Some(Severity::Error),
            ..Default::default()
        };
        assert_eq!(errors.apply(&entries, &now), vec![&old]);

        let recent_errors = ActivityFilter {
            status: Some(Severity::Error),
            date_range: Some(DateRange::Last30Days),
            ..Default::default()
        };
        assert!(recent_errors.apply(&entries, &now).is_empty());
    }

    #[test]
    fn test_patient_filter_by_condition_and_compliance() {
        let owner = OwnerId::new();
        let mut mary = Patient::new(owner, "Mary", 80);
        mary.add_condition("Diabetes");
        let john = Patient::new(owner, "John", 75);
        let patients = vec![mary.clone(), john.clone()];

        let mut activities = Vec::new();
        for _ in 0..9 {
            let mut e = ActivityLogEntry::new(owner, EventType::MedicationDispensed, Severity::Success, "ok");
            e.patient_id = Some(mary.id);
            activities.push(e);
        }
        let mut missed = ActivityLogEntry::new(owner, EventType::MedicationMissed, Severity::Error, "missed");
        missed.patient_id = Some(mary.id);
        activities.push(missed);

        let thresholds = ComplianceThresholds::default();
        let search = PatientFilter {
            search: Some("diab".into()),
            ..Default::default()
        };
        assert_eq!(search.apply(&patients, &[], &activities, &thresholds), vec![&mary]);

        let excellent = PatientFilter {
            compliance: Some(ComplianceTier::Excellent),
            ..Default::default()
        };
        assert_eq!(excellent.apply(&patients, &[], &activities, &thresholds), vec![&mary]);

        let condition = PatientFilter {
            condition: Some("Arthritis".into()),
            ..Default::default()
        };
        assert!(condition.apply(&patients, &[], &activities, &thresholds).is_empty());
    }
}
