//! Change events: the loosely-typed wire payload and its validated form.
//!
//! Remote change feeds deliver JSON rows (`RawChangeEvent`). Nothing reaches
//! the reducer until the payload has been decoded against the entity schema
//! of its table, so a malformed row is rejected here instead of silently
//! corrupting a mirror.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActivityLogEntry, Device, Entity, MedicationSchedule, OwnerId, Patient, Table,
};

/// Boundary validation errors.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Event for table {found} delivered to a {expected} subscriber")]
    TableMismatch { expected: Table, found: String },

    #[error("{operation} event without a {field} row")]
    MissingRow {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Delete event without a usable id")]
    MissingId,

    #[error("Row does not match the {table} schema: {message}")]
    Schema { table: Table, message: String },
}

/// One validated remote change.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<E> {
    Insert { entity: E },
    Update { entity: E, previous: Option<E> },
    Delete { id: Uuid, previous: Option<E> },
    /// An operation this client does not understand
    Unknown { operation: String },
}

impl<E: Entity> ChangeEvent<E> {
    pub fn insert(entity: E) -> Self {
        ChangeEvent::Insert { entity }
    }

    pub fn update(entity: E) -> Self {
        ChangeEvent::Update {
            entity,
            previous: None,
        }
    }

    pub fn delete(id: Uuid) -> Self {
        ChangeEvent::Delete { id, previous: None }
    }

    pub fn operation(&self) -> &str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
            ChangeEvent::Unknown { operation } => operation,
        }
    }

    /// Id of the affected row, if the event names one.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            ChangeEvent::Insert { entity } | ChangeEvent::Update { entity, .. } => {
                Some(entity.id())
            }
            ChangeEvent::Delete { id, .. } => Some(*id),
            ChangeEvent::Unknown { .. } => None,
        }
    }

    /// Owner of the affected row, when the payload carries it.
    pub fn owner_id(&self) -> Option<OwnerId> {
        match self {
            ChangeEvent::Insert { entity } | ChangeEvent::Update { entity, .. } => {
                Some(entity.owner_id())
            }
            ChangeEvent::Delete { previous, .. } => previous.as_ref().map(Entity::owner_id),
            ChangeEvent::Unknown { .. } => None,
        }
    }

    /// The event as `owner` sees it. Rows of other owners disappear, and a
    /// row reassigned away from `owner` becomes a delete.
    pub fn scoped_to(self, owner: OwnerId) -> Option<Self> {
        match self {
            ChangeEvent::Update { entity, previous } if entity.owner_id() != owner => {
                let was_ours = previous.as_ref().map_or(true, |p| p.owner_id() == owner);
                was_ours.then(|| ChangeEvent::Delete {
                    id: entity.id(),
                    previous,
                })
            }
            event => match event.owner_id() {
                Some(row_owner) if row_owner != owner => None,
                _ => Some(event),
            },
        }
    }
}

/// A change as it arrives from the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChangeEvent {
    pub table: String,
    #[serde(alias = "eventType")]
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

impl RawChangeEvent {
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert<E: Entity>(entity: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            table: E::TABLE.as_str().to_string(),
            operation: "INSERT".to_string(),
            new: Some(serde_json::to_value(entity)?),
            old: None,
        })
    }

    pub fn update<E: Entity>(entity: &E, previous: Option<&E>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            table: E::TABLE.as_str().to_string(),
            operation: "UPDATE".to_string(),
            new: Some(serde_json::to_value(entity)?),
            old: previous.map(serde_json::to_value).transpose()?,
        })
    }

    pub fn delete<E: Entity>(previous: &E) -> Result<Self, serde_json::Error> {
        Ok(Self {
            table: E::TABLE.as_str().to_string(),
            operation: "DELETE".to_string(),
            new: None,
            old: Some(serde_json::to_value(previous)?),
        })
    }

    /// Whether this change belongs to `owner`. Id-only deletes carry no owner
    /// and are let through; removing an absent id is a no-op downstream.
    pub fn concerns(&self, owner: OwnerId) -> bool {
        let row_owner = |row: &Option<Value>| {
            row.as_ref()
                .and_then(|r| r.get("owner_id"))
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
        };
        match (row_owner(&self.new), row_owner(&self.old)) {
            (None, None) => self.new.is_none(),
            (new, old) => new == Some(owner.0) || old == Some(owner.0),
        }
    }

    /// Validate against the schema of `E`.
    pub fn decode<E: Entity>(&self) -> Result<ChangeEvent<E>, EventError> {
        if self.table != E::TABLE.as_str() {
            return Err(EventError::TableMismatch {
                expected: E::TABLE,
                found: self.table.clone(),
            });
        }

        match self.operation.to_ascii_lowercase().as_str() {
            "insert" => {
                let new = self.new.as_ref().ok_or(EventError::MissingRow {
                    operation: "insert",
                    field: "new",
                })?;
                Ok(ChangeEvent::Insert {
                    entity: parse_row(new)?,
                })
            }
            "update" => {
                let new = self.new.as_ref().ok_or(EventError::MissingRow {
                    operation: "update",
                    field: "new",
                })?;
                Ok(ChangeEvent::Update {
                    entity: parse_row(new)?,
                    previous: self.old.as_ref().and_then(|old| parse_row(old).ok()),
                })
            }
            "delete" => {
                let old = self.old.as_ref().ok_or(EventError::MissingRow {
                    operation: "delete",
                    field: "old",
                })?;
                let id = old
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or(EventError::MissingId)?;
                Ok(ChangeEvent::Delete {
                    id,
                    previous: parse_row(old).ok(),
                })
            }
            _ => Ok(ChangeEvent::Unknown {
                operation: self.operation.clone(),
            }),
        }
    }
}

fn parse_row<E: Entity>(row: &Value) -> Result<E, EventError> {
    E::deserialize(row).map_err(|e| EventError::Schema {
        table: E::TABLE,
        message: e.to_string(),
    })
}

/// A validated change tagged with its table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    Patients(ChangeEvent<Patient>),
    Schedules(ChangeEvent<MedicationSchedule>),
    Activities(ChangeEvent<ActivityLogEntry>),
    Devices(ChangeEvent<Device>),
}

impl TableEvent {
    pub fn decode(raw: &RawChangeEvent) -> Result<Self, EventError> {
        let table: Table = raw
            .table
            .parse()
            .map_err(|_| EventError::UnknownTable(raw.table.clone()))?;
        Ok(match table {
            Table::Patients => TableEvent::Patients(raw.decode()?),
            Table::MedicationSchedules => TableEvent::Schedules(raw.decode()?),
            Table::ActivityLog => TableEvent::Activities(raw.decode()?),
            Table::Devices => TableEvent::Devices(raw.decode()?),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Self::decode(&RawChangeEvent::from_json(json)?)
    }

    pub fn table(&self) -> Table {
        match self {
            TableEvent::Patients(_) => Table::Patients,
            TableEvent::Schedules(_) => Table::MedicationSchedules,
            TableEvent::Activities(_) => Table::ActivityLog,
            TableEvent::Devices(_) => Table::Devices,
        }
    }
}
