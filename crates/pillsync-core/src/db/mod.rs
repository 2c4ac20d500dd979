//! SQLite storage behind the reference remote source.

mod activities;
mod devices;
mod patients;
mod schedules;
mod schema;

pub use schema::*;
pub(crate) use patients::dependents;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Entity, OrderBy, OwnerId};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Row belongs to another owner: {0}")]
    OwnerMismatch(String),

    #[error("Invalid stored value: {0}")]
    InvalidRow(String),
}

impl DbError {
    /// Whether SQLite refused the statement on a CHECK, NOT NULL, UNIQUE or
    /// foreign key constraint.
    pub fn is_constraint(&self) -> bool {
        match self {
            DbError::Constraint(_) => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// One SQLite connection holding the four caregiver tables.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens or creates the store file and applies the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::with_schema(Connection::open(path)?)
    }

    /// Throwaway store for tests and the demo run.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Per-table persistence used by the generic source.
pub trait TableRecord: Entity {
    fn list_owned(db: &Database, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Self>>;

    fn get(db: &Database, id: Uuid) -> DbResult<Option<Self>>;

    fn insert(db: &Database, row: &Self) -> DbResult<()>;

    fn update(db: &Database, row: &Self) -> DbResult<bool>;

    fn delete(db: &Database, id: Uuid) -> DbResult<bool>;

    /// Patient this row hangs off, if any. Must belong to the row's owner.
    fn patient_ref(&self) -> Option<Uuid> {
        None
    }
}

/// `ORDER BY` clause for a whitelisted column.
pub(crate) fn order_clause(order: OrderBy, allowed: &[&str]) -> DbResult<String> {
    if !allowed.contains(&order.column) {
        return Err(DbError::Constraint(format!(
            "Cannot order by column: {}",
            order.column
        )));
    }
    let direction = if order.descending { "DESC" } else { "ASC" };
    Ok(format!("ORDER BY {} {}, id ASC", order.column, direction))
}

/// Fixed-width RFC 3339 so text order matches time order.
pub(crate) fn time_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_time(s: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DbError::InvalidRow(format!("timestamp {:?}: {}", s, e)))
}

pub(crate) fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::InvalidRow(format!("id {:?}: {}", s, e)))
}

pub(crate) fn parse_owner(s: &str) -> DbResult<OwnerId> {
    parse_uuid(s).map(OwnerId)
}

pub(crate) fn parse_enum<T>(s: &str) -> DbResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e: T::Err| DbError::InvalidRow(e.to_string()))
}

pub(crate) fn stock_from_sql(value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::InvalidRow(format!("stock level {}", value)))
}
