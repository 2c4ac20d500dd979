//! Activity log models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Entity, OrderBy, OwnerId, ParseEnumError, Table};
use super::schedule::{MedicationSchedule, StockTier};
use crate::sync::InsertPolicy;

/// Kind of logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    MedicationDispensed,
    MedicationMissed,
    LowStockAlert,
    DeviceStatus,
    ScheduleUpdated,
    SystemNotification,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::MedicationDispensed,
        EventType::MedicationMissed,
        EventType::LowStockAlert,
        EventType::DeviceStatus,
        EventType::ScheduleUpdated,
        EventType::SystemNotification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MedicationDispensed => "medication-dispensed",
            EventType::MedicationMissed => "medication-missed",
            EventType::LowStockAlert => "low-stock-alert",
            EventType::DeviceStatus => "device-status",
            EventType::ScheduleUpdated => "schedule-updated",
            EventType::SystemNotification => "system-notification",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("event type", s))
    }
}

/// Severity attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Severity::Success),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "info" => Ok(Severity::Info),
            other => Err(ParseEnumError::new("severity", other)),
        }
    }
}

/// An append-only activity log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub event_type: EventType,
    pub status: Severity,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub medication_name: Option<String>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub device_id: Option<Uuid>,
    /// Pill count at the time of the event
    #[serde(default)]
    pub stock_level: Option<u32>,
}

impl ActivityLogEntry {
    pub fn new(
        owner_id: OwnerId,
        event_type: EventType,
        status: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            event_type,
            status,
            patient_id: None,
            patient_name: None,
            medication_name: None,
            description: description.into(),
            timestamp: Utc::now(),
            device_id: None,
            stock_level: None,
        }
    }

    /// Entry about a schedule, carrying its patient, medication and stock.
    pub fn for_schedule(
        schedule: &MedicationSchedule,
        event_type: EventType,
        status: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: Some(schedule.patient_id),
            patient_name: schedule.patient_name.clone(),
            medication_name: Some(schedule.medication_name.clone()),
            stock_level: Some(schedule.current_stock),
            ..Self::new(schedule.owner_id, event_type, status, description)
        }
    }

    /// `medication-dispensed` entry for a schedule just marked taken.
    pub fn dispensed(schedule: &MedicationSchedule) -> Self {
        Self::for_schedule(
            schedule,
            EventType::MedicationDispensed,
            Severity::Success,
            format!("{} {} dispensed", schedule.medication_name, schedule.dosage),
        )
    }

    /// `medication-missed` entry for a schedule just marked missed.
    pub fn missed(schedule: &MedicationSchedule) -> Self {
        Self::for_schedule(
            schedule,
            EventType::MedicationMissed,
            Severity::Error,
            format!("Missed dose of {} {}", schedule.medication_name, schedule.dosage),
        )
    }

    /// `low-stock-alert` entry. Critical stock is logged as an error.
    pub fn stock_alert(schedule: &MedicationSchedule, tier: StockTier) -> Self {
        let (severity, label) = match tier {
            StockTier::Critical => (Severity::Error, "Critical stock"),
            _ => (Severity::Warning, "Low stock"),
        };
        Self::for_schedule(
            schedule,
            EventType::LowStockAlert,
            severity,
            format!(
                "{}: {} has {} pills remaining",
                label, schedule.medication_name, schedule.current_stock
            ),
        )
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

impl Entity for ActivityLogEntry {
    const TABLE: Table = Table::ActivityLog;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn label(&self) -> String {
        format!("{} at {}", self.event_type, self.timestamp.to_rfc3339())
    }

    fn default_order() -> OrderBy {
        OrderBy::desc("timestamp")
    }

    fn insert_policy() -> InsertPolicy<Self> {
        InsertPolicy::Prepend
    }
}
