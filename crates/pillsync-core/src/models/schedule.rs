//! Medication schedule models and the dose status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::device::ConnectivityStatus;
use super::entity::{Entity, OrderBy, OwnerId, ParseEnumError, Table};
use crate::config::StockThresholds;
use crate::sync::InsertPolicy;

/// How often a medication is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Daily,
    TwiceDaily,
    Weekly,
    AsNeeded,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::TwiceDaily => "twice-daily",
            Frequency::Weekly => "weekly",
            Frequency::AsNeeded => "as-needed",
        }
    }
}

impl FromStr for Frequency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "twice-daily" => Ok(Frequency::TwiceDaily),
            "weekly" => Ok(Frequency::Weekly),
            "as-needed" => Ok(Frequency::AsNeeded),
            other => Err(ParseEnumError::new("frequency", other)),
        }
    }
}

/// Dose lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleStatus {
    Pending,
    Taken,
    Missed,
}

/// Inputs to the status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusAction {
    MarkTaken,
    MarkUntaken,
    MarkMissed,
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusAction::MarkTaken => "mark taken",
            StatusAction::MarkUntaken => "mark untaken",
            StatusAction::MarkMissed => "mark missed",
        })
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot {action} a schedule that is {from}")]
pub struct TransitionError {
    pub from: ScheduleStatus,
    pub action: StatusAction,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "pending",
            ScheduleStatus::Taken => "taken",
            ScheduleStatus::Missed => "missed",
        }
    }

    /// Next status for an action. Only `pending -> taken`, `taken -> pending`
    /// and `pending -> missed` exist.
    pub fn transition(self, action: StatusAction) -> Result<ScheduleStatus, TransitionError> {
        match (self, action) {
            (ScheduleStatus::Pending, StatusAction::MarkTaken) => Ok(ScheduleStatus::Taken),
            (ScheduleStatus::Taken, StatusAction::MarkUntaken) => Ok(ScheduleStatus::Pending),
            (ScheduleStatus::Pending, StatusAction::MarkMissed) => Ok(ScheduleStatus::Missed),
            (from, action) => Err(TransitionError { from, action }),
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleStatus::Pending),
            "taken" => Ok(ScheduleStatus::Taken),
            "missed" => Ok(ScheduleStatus::Missed),
            other => Err(ParseEnumError::new("schedule status", other)),
        }
    }
}

/// Mutually exclusive stock band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockTier {
    Critical,
    Low,
    Normal,
}

impl StockTier {
    /// Exclusive classification: critical stock is not reported as low.
    pub fn classify(stock: u32, thresholds: &StockThresholds) -> Self {
        if thresholds.is_critical(stock) {
            StockTier::Critical
        } else if thresholds.is_low(stock) {
            StockTier::Low
        } else {
            StockTier::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockTier::Critical => "critical",
            StockTier::Low => "low",
            StockTier::Normal => "normal",
        }
    }
}

impl FromStr for StockTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(StockTier::Critical),
            "low" => Ok(StockTier::Low),
            "normal" => Ok(StockTier::Normal),
            other => Err(ParseEnumError::new("stock tier", other)),
        }
    }
}

/// A medication schedule loaded into a dispenser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationSchedule {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub patient_id: Uuid,
    /// Patient name at the time the schedule was written
    #[serde(default)]
    pub patient_name: Option<String>,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: Frequency,
    /// Time(s) of day, e.g. "08:00" or "08:00, 20:00"
    pub timing: String,
    #[serde(default)]
    pub instructions: Option<String>,
    pub current_stock: u32,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub last_taken: Option<DateTime<Utc>>,
    pub device_status: ConnectivityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicationSchedule {
    pub fn new(
        owner_id: OwnerId,
        patient_id: Uuid,
        medication_name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: Frequency,
        current_stock: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            patient_id,
            patient_name: None,
            medication_name: medication_name.into(),
            dosage: dosage.into(),
            frequency,
            timing: "08:00".to_string(),
            instructions: None,
            current_stock,
            status: ScheduleStatus::Pending,
            last_taken: None,
            device_status: ConnectivityStatus::Online,
            created_at: now,
            updated_at: now,
        }
    }

    /// `pending -> taken`: one pill out (floored at zero), stamp last_taken.
    pub fn mark_taken(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let status = self.status.transition(StatusAction::MarkTaken)?;
        Ok(Self {
            status,
            current_stock: self.current_stock.saturating_sub(1),
            last_taken: Some(now),
            updated_at: now,
            ..self.clone()
        })
    }

    /// `taken -> pending`: one pill back, nothing else cleared.
    pub fn mark_untaken(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let status = self.status.transition(StatusAction::MarkUntaken)?;
        Ok(Self {
            status,
            current_stock: self.current_stock.saturating_add(1),
            updated_at: now,
            ..self.clone()
        })
    }

    /// `pending -> missed`, driven by the clock or the device.
    pub fn mark_missed(&self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        let status = self.status.transition(StatusAction::MarkMissed)?;
        Ok(Self {
            status,
            updated_at: now,
            ..self.clone()
        })
    }

    pub fn stock_tier(&self, thresholds: &StockThresholds) -> StockTier {
        StockTier::classify(self.current_stock, thresholds)
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Entity for MedicationSchedule {
    const TABLE: Table = Table::MedicationSchedules;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn label(&self) -> String {
        match &self.patient_name {
            Some(patient) => format!("{} for {}", self.medication_name, patient),
            None => self.medication_name.clone(),
        }
    }

    fn delete_prompt(&self) -> String {
        format!(
            "Are you sure you want to delete the {} schedule?",
            self.label()
        )
    }

    fn default_order() -> OrderBy {
        OrderBy::desc("created_at")
    }

    fn insert_policy() -> InsertPolicy<Self> {
        InsertPolicy::Prepend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(stock: u32) -> MedicationSchedule {
        MedicationSchedule::new(
            OwnerId::new(),
            Uuid::new_v4(),
            "Metformin",
            "500mg",
            Frequency::TwiceDaily,
            stock,
        )
    }

    #[test]
    fn test_mark_taken_decrements_and_stamps() {
        let now = Utc::now();
        let s = schedule(15);
        let taken = s.mark_taken(now).unwrap();
        assert_eq!(taken.current_stock, 14);
        assert_eq!(taken.status, ScheduleStatus::Taken);
        assert_eq!(taken.last_taken, Some(now));
    }

    #[test]
    fn test_mark_taken_floors_at_zero() {
        let taken = schedule(0).mark_taken(Utc::now()).unwrap();
        assert_eq!(taken.current_stock, 0);

        let untaken = taken.mark_untaken(Utc::now()).unwrap();
        assert_eq!(untaken.current_stock, 1);
        assert_eq!(untaken.status, ScheduleStatus::Pending);
    }

    #[test]
    fn test_untaken_keeps_last_taken() {
        let now = Utc::now();
        let untaken = schedule(5)
            .mark_taken(now)
            .unwrap()
            .mark_untaken(now)
            .unwrap();
        assert_eq!(untaken.current_stock, 5);
        assert_eq!(untaken.last_taken, Some(now));
    }

    #[test]
    fn test_invalid_transitions() {
        let now = Utc::now();
        let s = schedule(5);
        assert!(s.mark_untaken(now).is_err());

        let taken = s.mark_taken(now).unwrap();
        let err = taken.mark_taken(now).unwrap_err();
        assert_eq!(err.from, ScheduleStatus::Taken);
        assert_eq!(err.action, StatusAction::MarkTaken);
        assert!(taken.mark_missed(now).is_err());

        let missed = s.mark_missed(now).unwrap();
        assert_eq!(missed.status, ScheduleStatus::Missed);
        assert_eq!(missed.current_stock, 5);
        assert!(missed.mark_taken(now).is_err());
    }

    #[test]
    fn test_stock_tiers() {
        let t = StockThresholds::default();
        assert_eq!(StockTier::classify(11, &t), StockTier::Normal);
        assert_eq!(StockTier::classify(10, &t), StockTier::Low);
        assert_eq!(StockTier::classify(6, &t), StockTier::Low);
        assert_eq!(StockTier::classify(5, &t), StockTier::Critical);
        assert_eq!(StockTier::classify(0, &t), StockTier::Critical);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&Frequency::TwiceDaily).unwrap();
        assert_eq!(json, "\"twice-daily\"");
        assert_eq!("as-needed".parse::<Frequency>().unwrap(), Frequency::AsNeeded);
        assert_eq!("missed".parse::<ScheduleStatus>().unwrap(), ScheduleStatus::Missed);
    }
}
