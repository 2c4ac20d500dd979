//! Aggregates over mirror contents: O(n) scans, recomputed on every call.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::date_range::DateRange;
use super::sort::newest_first;
use crate::config::{ComplianceThresholds, StockThresholds, SyncConfig};
use crate::models::{
    ActivityLogEntry, ComplianceTier, ConnectivityStatus, Device, EventType, MedicationSchedule,
    Patient, ScheduleStatus, Severity,
};

/// Count items per key.
pub fn count_by<'a, T: 'a, K: Ord>(
    items: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> K,
) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(key(item)).or_insert(0) += 1;
    }
    counts
}

/// Summary cards over a schedules view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub total: usize,
    pub pending: usize,
    pub taken: usize,
    pub missed: usize,
    /// At or below the low threshold, critical included
    pub low_stock: usize,
    pub critical_stock: usize,
    /// Schedules whose dispenser is offline
    pub offline_devices: usize,
}

impl ScheduleStats {
    pub fn compute<'a>(
        schedules: impl IntoIterator<Item = &'a MedicationSchedule>,
        thresholds: &StockThresholds,
    ) -> Self {
        let mut stats = Self::default();
        for schedule in schedules {
            stats.total += 1;
            match schedule.status {
                ScheduleStatus::Pending => stats.pending += 1,
                ScheduleStatus::Taken => stats.taken += 1,
                ScheduleStatus::Missed => stats.missed += 1,
            }
            if thresholds.is_low(schedule.current_stock) {
                stats.low_stock += 1;
            }
            if thresholds.is_critical(schedule.current_stock) {
                stats.critical_stock += 1;
            }
            if schedule.device_status == ConnectivityStatus::Offline {
                stats.offline_devices += 1;
            }
        }
        stats
    }
}

/// Summary cards over an activity view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total: usize,
    pub dispensed: usize,
    pub missed: usize,
    pub low_stock_alerts: usize,
    pub by_type: BTreeMap<EventType, usize>,
    pub by_status: BTreeMap<Severity, usize>,
}

impl ActivityStats {
    pub fn compute<'a>(entries: impl IntoIterator<Item = &'a ActivityLogEntry>) -> Self {
        let entries: Vec<_> = entries.into_iter().collect();
        let by_type = count_by(entries.iter().copied(), |e| e.event_type);
        let by_status = count_by(entries.iter().copied(), |e| e.status);
        let of = |t: EventType| by_type.get(&t).copied().unwrap_or(0);

        Self {
            total: entries.len(),
            dispensed: of(EventType::MedicationDispensed),
            missed: of(EventType::MedicationMissed),
            low_stock_alerts: of(EventType::LowStockAlert),
            by_type,
            by_status,
        }
    }
}

/// Derived per-patient figures shown on patient cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientMetrics {
    pub patient_id: Uuid,
    pub active_schedules: usize,
    pub doses_dispensed: usize,
    pub doses_missed: usize,
}

impl PatientMetrics {
    pub fn compute(
        patient_id: Uuid,
        schedules: &[MedicationSchedule],
        activities: &[ActivityLogEntry],
    ) -> Self {
        let active_schedules = schedules
            .iter()
            .filter(|s| s.patient_id == patient_id)
            .count();

        let mut doses_dispensed = 0;
        let mut doses_missed = 0;
        for entry in activities.iter().filter(|e| e.patient_id == Some(patient_id)) {
            match entry.event_type {
                EventType::MedicationDispensed => doses_dispensed += 1,
                EventType::MedicationMissed => doses_missed += 1,
                _ => {}
            }
        }

        Self {
            patient_id,
            active_schedules,
            doses_dispensed,
            doses_missed,
        }
    }

    /// Dispensed doses as a percentage of dispensed plus missed, or `None`
    /// without dose history.
    pub fn compliance(&self) -> Option<f64> {
        let outcomes = self.doses_dispensed + self.doses_missed;
        (outcomes > 0).then(|| self.doses_dispensed as f64 * 100.0 / outcomes as f64)
    }

    pub fn tier(&self, thresholds: &ComplianceThresholds) -> Option<ComplianceTier> {
        self.compliance()
            .map(|pct| ComplianceTier::classify(pct, thresholds))
    }
}

/// Dashboard summary for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_patients: usize,
    pub total_schedules: usize,
    pub dispensed_today: usize,
    pub low_stock_alerts: usize,
    pub devices_online: usize,
    pub devices_offline: usize,
    /// Newest entries first, capped by configuration
    pub recent_activity: Vec<ActivityLogEntry>,
}

impl DashboardMetrics {
    pub fn compute<Tz: TimeZone>(
        patients: &[Patient],
        schedules: &[MedicationSchedule],
        activities: &[ActivityLogEntry],
        devices: &[Device],
        config: &SyncConfig,
        now: &DateTime<Tz>,
    ) -> Self {
        let dispensed_today = activities
            .iter()
            .filter(|e| e.event_type == EventType::MedicationDispensed)
            .filter(|e| DateRange::Today.contains(e.timestamp, now))
            .count();

        let low_stock_alerts = schedules
            .iter()
            .filter(|s| config.stock.is_low(s.current_stock))
            .count();

        let devices_online = devices.iter().filter(|d| d.is_online()).count();

        let mut recent: Vec<&ActivityLogEntry> = activities.iter().collect();
        newest_first(&mut recent);

        Self {
            total_patients: patients.len(),
            total_schedules: schedules.len(),
            dispensed_today,
            low_stock_alerts,
            devices_online,
            devices_offline: devices.len() - devices_online,
            recent_activity: recent
                .into_iter()
                .take(config.dashboard_recent_limit)
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, OwnerId};
    use chrono::{Duration, FixedOffset, Utc};

    #[test]
    fn test_schedule_stats() {
        let owner = OwnerId::new();
        let patient = Uuid::new_v4();
        let mut schedules = vec![
            MedicationSchedule::new(owner, patient, "A", "1", Frequency::Daily, 3),
            MedicationSchedule::new(owner, patient, "B", "1", Frequency::Daily, 9),
            MedicationSchedule::new(owner, patient, "C", "1", Frequency::Daily, 40),
        ];
        schedules[1].status = ScheduleStatus::Taken;
        schedules[2].device_status = ConnectivityStatus::Offline;

        let stats = ScheduleStats::compute(&schedules, &StockThresholds::default());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.taken, 1);
        assert_eq!(stats.low_stock, 2);
        assert_eq!(stats.critical_stock, 1);
        assert_eq!(stats.offline_devices, 1);
    }

    #[test]
    fn test_activity_stats_counts_by_type_and_status() {
        let owner = OwnerId::new();
        let entries = vec![
            ActivityLogEntry::new(owner, EventType::MedicationDispensed, Severity::Success, "a"),
            ActivityLogEntry::new(owner, EventType::MedicationDispensed, Severity::Success, "b"),
            ActivityLogEntry::new(owner, EventType::LowStockAlert, Severity::Warning, "c"),
            ActivityLogEntry::new(owner, EventType::MedicationMissed, Severity::Error, "d"),
        ];

        let stats = ActivityStats::compute(&entries);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.dispensed, 2);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.low_stock_alerts, 1);
        assert_eq!(stats.by_status[&Severity::Success], 2);
        assert_eq!(stats.by_type.get(&EventType::DeviceStatus), None);
    }

    #[test]
    fn test_compliance_percentage() {
        let owner = OwnerId::new();
        let patient = Uuid::new_v4();
        let mut entries = Vec::new();
        for (event, n) in [(EventType::MedicationDispensed, 3), (EventType::MedicationMissed, 1)] {
            for _ in 0..n {
                let mut e = ActivityLogEntry::new(owner, event, Severity::Info, "x");
                e.patient_id = Some(patient);
                entries.push(e);
            }
        }

        let metrics = PatientMetrics::compute(patient, &[], &entries);
        assert_eq!(metrics.compliance(), Some(75.0));
        assert_eq!(
            metrics.tier(&ComplianceThresholds::default()),
            Some(ComplianceTier::Good)
        );

        let empty = PatientMetrics::compute(Uuid::new_v4(), &[], &entries);
        assert_eq!(empty.compliance(), None);
    }

    #[test]
    fn test_dashboard_metrics() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = tz.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let owner = OwnerId::new();
        let patient = Patient::new(owner, "Mary", 80);
        let schedule = MedicationSchedule::new(owner, patient.id, "A", "1", Frequency::Daily, 4);

        let today = ActivityLogEntry::new(owner, EventType::MedicationDispensed, Severity::Success, "t")
            .at(now.with_timezone(&Utc) - Duration::hours(1));
        let yesterday = ActivityLogEntry::new(owner, EventType::MedicationDispensed, Severity::Success, "y")
            .at(now.with_timezone(&Utc) - Duration::hours(13));
        let mut device = Device::new(owner, "Kitchen", "Kitchen");
        device.status = ConnectivityStatus::Offline;

        let config = SyncConfig {
            dashboard_recent_limit: 1,
            ..Default::default()
        };

        let metrics = DashboardMetrics::compute(
            &[patient],
            &[schedule],
            &[yesterday, today.clone()],
            &[device],
            &config,
            &now,
        );
        assert_eq!(metrics.total_patients, 1);
        assert_eq!(metrics.dispensed_today, 1);
        assert_eq!(metrics.low_stock_alerts, 1);
        assert_eq!(metrics.devices_offline, 1);
        assert_eq!(metrics.recent_activity, vec![today]);
    }
}
