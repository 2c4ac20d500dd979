//! Patient models.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Entity, OrderBy, OwnerId, ParseEnumError, Table};
use crate::config::ComplianceThresholds;
use crate::sync::InsertPolicy;

/// Who to call when something goes wrong with a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

/// A patient cared for by one owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub name: String,
    pub age: u32,
    /// Medical condition labels, kept free of duplicates
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(owner_id: OwnerId, name: impl Into<String>, age: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            age,
            medical_conditions: Vec::new(),
            emergency_contact: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a condition label unless an equal label (ignoring case) exists.
    pub fn add_condition(&mut self, condition: impl Into<String>) -> bool {
        let condition = condition.into();
        let exists = self
            .medical_conditions
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&condition));
        if !exists {
            self.medical_conditions.push(condition);
        }
        !exists
    }

    pub fn has_condition(&self, condition: &str) -> bool {
        self.medical_conditions
            .iter()
            .any(|c| c.eq_ignore_ascii_case(condition))
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn by_name(a: &Patient, b: &Patient) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

impl Entity for Patient {
    const TABLE: Table = Table::Patients;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn delete_prompt(&self) -> String {
        format!(
            "Delete {}? This permanently removes the patient together with their medication schedules and activity history.",
            self.name
        )
    }

    fn default_order() -> OrderBy {
        OrderBy::asc("name")
    }

    fn insert_policy() -> InsertPolicy<Self> {
        InsertPolicy::SortedBy(by_name)
    }
}

/// Compliance band shown on patient cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceTier {
    Excellent,
    Good,
    NeedsAttention,
}

impl ComplianceTier {
    pub fn classify(percentage: f64, thresholds: &ComplianceThresholds) -> Self {
        if percentage >= thresholds.excellent {
            ComplianceTier::Excellent
        } else if percentage >= thresholds.good {
            ComplianceTier::Good
        } else {
            ComplianceTier::NeedsAttention
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceTier::Excellent => "excellent",
            ComplianceTier::Good => "good",
            ComplianceTier::NeedsAttention => "needs-attention",
        }
    }
}

impl fmt::Display for ComplianceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excellent" => Ok(ComplianceTier::Excellent),
            "good" => Ok(ComplianceTier::Good),
            "needs-attention" => Ok(ComplianceTier::NeedsAttention),
            other => Err(ParseEnumError::new("compliance tier", other)),
        }
    }
}
