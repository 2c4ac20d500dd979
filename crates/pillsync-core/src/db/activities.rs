//! Activity log database operations. The log is append-only.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{
    order_clause, parse_enum, parse_owner, parse_time, parse_uuid, stock_from_sql, time_to_sql,
    Database, DbError, DbResult, TableRecord,
};
use crate::models::{ActivityLogEntry, OrderBy, OwnerId};

const COLUMNS: &str = r#"id, owner_id, event_type, status, patient_id, patient_name,
    medication_name, description, timestamp, device_id, stock_level"#;

impl Database {
    /// Append an activity entry.
    pub fn insert_activity(&self, entry: &ActivityLogEntry) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO activity_log (
                id, owner_id, event_type, status, patient_id, patient_name,
                medication_name, description, timestamp, device_id, stock_level
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                entry.id.to_string(),
                entry.owner_id.to_string(),
                entry.event_type.as_str(),
                entry.status.as_str(),
                entry.patient_id.map(|id| id.to_string()),
                entry.patient_name,
                entry.medication_name,
                entry.description,
                time_to_sql(&entry.timestamp),
                entry.device_id.map(|id| id.to_string()),
                entry.stock_level,
            ],
        )?;
        Ok(())
    }

    /// Get an entry by ID.
    pub fn get_activity(&self, id: Uuid) -> DbResult<Option<ActivityLogEntry>> {
        let sql = format!("SELECT {} FROM activity_log WHERE id = ?", COLUMNS);
        self.conn
            .query_row(&sql, [id.to_string()], ActivityRow::read)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List an owner's activity.
    pub fn list_activities(&self, owner: OwnerId, order: OrderBy) -> DbResult<Vec<ActivityLogEntry>> {
        let sql = format!(
            "SELECT {} FROM activity_log WHERE owner_id = ? {}",
            COLUMNS,
            order_clause(order, &["timestamp", "event_type"])?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.to_string()], ActivityRow::read)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Delete an entry.
    pub fn delete_activity(&self, id: Uuid) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM activity_log WHERE id = ?", [id.to_string()])?;
        Ok(rows_affected > 0)
    }
}

impl TableRecord for ActivityLogEntry {
    fn list_owned(db: &Database, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Self>> {
        db.list_activities(owner, order)
    }

    fn get(db: &Database, id: Uuid) -> DbResult<Option<Self>> {
        db.get_activity(id)
    }

    fn insert(db: &Database, row: &Self) -> DbResult<()> {
        db.insert_activity(row)
    }

    fn update(_db: &Database, row: &Self) -> DbResult<bool> {
        Err(DbError::Constraint(format!(
            "Activity log entry {} cannot be edited",
            row.id
        )))
    }

    fn delete(db: &Database, id: Uuid) -> DbResult<bool> {
        db.delete_activity(id)
    }

    fn patient_ref(&self) -> Option<Uuid> {
        self.patient_id
    }
}

/// Intermediate row struct for database mapping.
struct ActivityRow {
    id: String,
    owner_id: String,
    event_type: String,
    status: String,
    patient_id: Option<String>,
    patient_name: Option<String>,
    medication_name: Option<String>,
    description: String,
    timestamp: String,
    device_id: Option<String>,
    stock_level: Option<i64>,
}

impl ActivityRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            event_type: row.get(2)?,
            status: row.get(3)?,
            patient_id: row.get(4)?,
            patient_name: row.get(5)?,
            medication_name: row.get(6)?,
            description: row.get(7)?,
            timestamp: row.get(8)?,
            device_id: row.get(9)?,
            stock_level: row.get(10)?,
        })
    }
}

impl TryFrom<ActivityRow> for ActivityLogEntry {
    type Error = DbError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityLogEntry {
            id: parse_uuid(&row.id)?,
            owner_id: parse_owner(&row.owner_id)?,
            event_type: parse_enum(&row.event_type)?,
            status: parse_enum(&row.status)?,
            patient_id: row.patient_id.as_deref().map(parse_uuid).transpose()?,
            patient_name: row.patient_name,
            medication_name: row.medication_name,
            description: row.description,
            timestamp: parse_time(&row.timestamp)?,
            device_id: row.device_id.as_deref().map(parse_uuid).transpose()?,
            stock_level: row.stock_level.map(stock_from_sql).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, Severity};
    use chrono::{Duration, Utc};

    #[test]
    fn test_insert_and_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let owner = OwnerId::new();
        let now = Utc::now();

        let old = ActivityLogEntry::new(owner, EventType::DeviceStatus, Severity::Info, "Device online")
            .at(now - Duration::hours(2));
        let new = ActivityLogEntry::new(owner, EventType::SystemNotification, Severity::Info, "Backup done")
            .at(now);
        db.insert_activity(&old).unwrap();
        db.insert_activity(&new).unwrap();

        let listed = db.list_activities(owner, OrderBy::desc("timestamp")).unwrap();
        assert_eq!(listed, vec![new, old]);
    }

    #[test]
    fn test_entries_cannot_be_edited() {
        let db = Database::open_in_memory().unwrap();
        let entry = ActivityLogEntry::new(OwnerId::new(), EventType::DeviceStatus, Severity::Info, "x");
        db.insert_activity(&entry).unwrap();

        let err = ActivityLogEntry::update(&db, &entry).unwrap_err();
        assert!(err.is_constraint());
    }
}
