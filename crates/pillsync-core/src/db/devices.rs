//! Device database operations.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{
    order_clause, parse_enum, parse_owner, parse_time, parse_uuid, time_to_sql, Database, DbError,
    DbResult, TableRecord,
};
use crate::models::{Device, OrderBy, OwnerId};

const COLUMNS: &str = "id, owner_id, name, location, status, last_seen";

impl Database {
    /// Register a device.
    pub fn insert_device(&self, device: &Device) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO devices (id, owner_id, name, location, status, last_seen)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                device.id.to_string(),
                device.owner_id.to_string(),
                device.name,
                device.location,
                device.status.as_str(),
                time_to_sql(&device.last_seen),
            ],
        )?;
        Ok(())
    }

    /// Update a device's name, location, status and last contact.
    pub fn update_device(&self, device: &Device) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE devices SET
                name = ?2,
                location = ?3,
                status = ?4,
                last_seen = ?5
            WHERE id = ?1
            "#,
            params![
                device.id.to_string(),
                device.name,
                device.location,
                device.status.as_str(),
                time_to_sql(&device.last_seen),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a device by ID.
    pub fn get_device(&self, id: Uuid) -> DbResult<Option<Device>> {
        let sql = format!("SELECT {} FROM devices WHERE id = ?", COLUMNS);
        self.conn
            .query_row(&sql, [id.to_string()], DeviceRow::read)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List an owner's devices.
    pub fn list_devices(&self, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Device>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE owner_id = ? {}",
            COLUMNS,
            order_clause(order, &["name", "last_seen", "status"])?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.to_string()], DeviceRow::read)?;

        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?.try_into()?);
        }
        Ok(devices)
    }

    /// Remove a device.
    pub fn delete_device(&self, id: Uuid) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM devices WHERE id = ?", [id.to_string()])?;
        Ok(rows_affected > 0)
    }
}

impl TableRecord for Device {
    fn list_owned(db: &Database, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Self>> {
        db.list_devices(owner, order)
    }

    fn get(db: &Database, id: Uuid) -> DbResult<Option<Self>> {
        db.get_device(id)
    }

    fn insert(db: &Database, row: &Self) -> DbResult<()> {
        db.insert_device(row)
    }

    fn update(db: &Database, row: &Self) -> DbResult<bool> {
        db.update_device(row)
    }

    fn delete(db: &Database, id: Uuid) -> DbResult<bool> {
        db.delete_device(id)
    }
}

/// Intermediate row struct for database mapping.
struct DeviceRow {
    id: String,
    owner_id: String,
    name: String,
    location: String,
    status: String,
    last_seen: String,
}

impl DeviceRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            location: row.get(3)?,
            status: row.get(4)?,
            last_seen: row.get(5)?,
        })
    }
}

impl TryFrom<DeviceRow> for Device {
    type Error = DbError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            id: parse_uuid(&row.id)?,
            owner_id: parse_owner(&row.owner_id)?,
            name: row.name,
            location: row.location,
            status: parse_enum(&row.status)?,
            last_seen: parse_time(&row.last_seen)?,
        })
    }
}
