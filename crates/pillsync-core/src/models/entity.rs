//! Shared identity types for synchronized entities.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::sync::InsertPolicy;

/// Identity of the signed-in caregiver. Every read, write and subscription
/// is scoped by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Logical remote tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Patients,
    MedicationSchedules,
    ActivityLog,
    Devices,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Patients,
        Table::MedicationSchedules,
        Table::ActivityLog,
        Table::Devices,
    ];

    /// Name of the table in the store and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Patients => "patients",
            Table::MedicationSchedules => "medication_schedules",
            Table::ActivityLog => "activity_log",
            Table::Devices => "devices",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("table", s))
    }
}

/// Unrecognized enumeration value in a stored row or wire payload.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Ordering requested from the remote source on bulk reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// A row type that can live in a synchronized collection.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const TABLE: Table;

    fn id(&self) -> Uuid;

    fn owner_id(&self) -> OwnerId;

    /// Human-readable name used in confirmation prompts and logs.
    fn label(&self) -> String;

    /// Prompt shown before an irreversible delete.
    fn delete_prompt(&self) -> String {
        format!("Are you sure you want to delete {}?", self.label())
    }

    /// Default ordering for the initial bulk read.
    fn default_order() -> OrderBy;

    /// Where locally unseen rows land in the mirror.
    fn insert_policy() -> InsertPolicy<Self> {
        InsertPolicy::Append
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip_names() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("schedules".parse::<Table>().is_err());
    }

    #[test]
    fn test_owner_id_parse() {
        let owner = OwnerId::new();
        let parsed: OwnerId = owner.to_string().parse().unwrap();
        assert_eq!(parsed, owner);
    }
}
