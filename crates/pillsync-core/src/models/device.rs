//! Dispenser device models.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{Entity, OrderBy, OwnerId, ParseEnumError, Table};
use crate::sync::InsertPolicy;

/// Link state of a dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityStatus::Online => "online",
            ConnectivityStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectivityStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(ConnectivityStatus::Online),
            "offline" => Ok(ConnectivityStatus::Offline),
            other => Err(ParseEnumError::new("connectivity status", other)),
        }
    }
}

/// A pill dispenser registered to an owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub name: String,
    pub location: String,
    pub status: ConnectivityStatus,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    pub fn new(owner_id: OwnerId, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            location: location.into(),
            status: ConnectivityStatus::Online,
            last_seen: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ConnectivityStatus::Online
    }

    /// Relative "last seen" label: `Just now`, `12m ago`, `3h ago`, `2d ago`.
    pub fn last_seen_label<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String {
        let minutes = now
            .with_timezone(&Utc)
            .signed_duration_since(self.last_seen)
            .num_minutes();
        if minutes < 1 {
            "Just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

fn by_name(a: &Device, b: &Device) -> Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

impl Entity for Device {
    const TABLE: Table = Table::Devices;

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    fn label(&self) -> String {
        format!("{} ({})", self.name, self.location)
    }

    fn default_order() -> OrderBy {
        OrderBy::asc("name")
    }

    fn insert_policy() -> InsertPolicy<Self> {
        InsertPolicy::SortedBy(by_name)
    }
}
