//! Medication schedule database operations.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{
    order_clause, parse_enum, parse_owner, parse_time, parse_uuid, stock_from_sql, time_to_sql,
    Database, DbError, DbResult, TableRecord,
};
use crate::models::{MedicationSchedule, OrderBy, OwnerId};

const COLUMNS: &str = r#"id, owner_id, patient_id, patient_name, medication_name, dosage,
    frequency, timing, instructions, current_stock, status, last_taken,
    device_status, created_at, updated_at"#;

impl Database {
    /// Insert a new schedule.
    pub fn insert_schedule(&self, schedule: &MedicationSchedule) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO medication_schedules (
                id, owner_id, patient_id, patient_name, medication_name, dosage,
                frequency, timing, instructions, current_stock, status, last_taken,
                device_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                schedule.id.to_string(),
                schedule.owner_id.to_string(),
                schedule.patient_id.to_string(),
                schedule.patient_name,
                schedule.medication_name,
                schedule.dosage,
                schedule.frequency.as_str(),
                schedule.timing,
                schedule.instructions,
                schedule.current_stock,
                schedule.status.as_str(),
                schedule.last_taken.as_ref().map(time_to_sql),
                schedule.device_status.as_str(),
                time_to_sql(&schedule.created_at),
                time_to_sql(&schedule.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Update an existing schedule. Ownership and creation time never change.
    pub fn update_schedule(&self, schedule: &MedicationSchedule) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medication_schedules SET
                patient_id = ?2,
                patient_name = ?3,
                medication_name = ?4,
                dosage = ?5,
                frequency = ?6,
                timing = ?7,
                instructions = ?8,
                current_stock = ?9,
                status = ?10,
                last_taken = ?11,
                device_status = ?12,
                updated_at = ?13
            WHERE id = ?1
            "#,
            params![
                schedule.id.to_string(),
                schedule.patient_id.to_string(),
                schedule.patient_name,
                schedule.medication_name,
                schedule.dosage,
                schedule.frequency.as_str(),
                schedule.timing,
                schedule.instructions,
                schedule.current_stock,
                schedule.status.as_str(),
                schedule.last_taken.as_ref().map(time_to_sql),
                schedule.device_status.as_str(),
                time_to_sql(&schedule.updated_at),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a schedule by ID.
    pub fn get_schedule(&self, id: Uuid) -> DbResult<Option<MedicationSchedule>> {
        let sql = format!("SELECT {} FROM medication_schedules WHERE id = ?", COLUMNS);
        self.conn
            .query_row(&sql, [id.to_string()], ScheduleRow::read)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List an owner's schedules.
    pub fn list_schedules(&self, owner: OwnerId, order: OrderBy) -> DbResult<Vec<MedicationSchedule>> {
        let sql = format!(
            "SELECT {} FROM medication_schedules WHERE owner_id = ? {}",
            COLUMNS,
            order_clause(
                order,
                &["created_at", "updated_at", "medication_name", "current_stock"]
            )?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.to_string()], ScheduleRow::read)?;

        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(row?.try_into()?);
        }
        Ok(schedules)
    }

    /// Delete a schedule.
    pub fn delete_schedule(&self, id: Uuid) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM medication_schedules WHERE id = ?", [id.to_string()])?;
        Ok(rows_affected > 0)
    }
}

impl TableRecord for MedicationSchedule {
    fn list_owned(db: &Database, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Self>> {
        db.list_schedules(owner, order)
    }

    fn get(db: &Database, id: Uuid) -> DbResult<Option<Self>> {
        db.get_schedule(id)
    }

    fn insert(db: &Database, row: &Self) -> DbResult<()> {
        db.insert_schedule(row)
    }

    fn update(db: &Database, row: &Self) -> DbResult<bool> {
        db.update_schedule(row)
    }

    fn delete(db: &Database, id: Uuid) -> DbResult<bool> {
        db.delete_schedule(id)
    }

    fn patient_ref(&self) -> Option<Uuid> {
        Some(self.patient_id)
    }
}

/// Intermediate row struct for database mapping.
struct ScheduleRow {
    id: String,
    owner_id: String,
    patient_id: String,
    patient_name: Option<String>,
    medication_name: String,
    dosage: String,
    frequency: String,
    timing: String,
    instructions: Option<String>,
    current_stock: i64,
    status: String,
    last_taken: Option<String>,
    device_status: String,
    created_at: String,
    updated_at: String,
}

impl ScheduleRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            patient_id: row.get(2)?,
            patient_name: row.get(3)?,
            medication_name: row.get(4)?,
            dosage: row.get(5)?,
            frequency: row.get(6)?,
            timing: row.get(7)?,
            instructions: row.get(8)?,
            current_stock: row.get(9)?,
            status: row.get(10)?,
            last_taken: row.get(11)?,
            device_status: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl TryFrom<ScheduleRow> for MedicationSchedule {
    type Error = DbError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(MedicationSchedule {
            id: parse_uuid(&row.id)?,
            owner_id: parse_owner(&row.owner_id)?,
            patient_id: parse_uuid(&row.patient_id)?,
            patient_name: row.patient_name,
            medication_name: row.medication_name,
            dosage: row.dosage,
            frequency: parse_enum(&row.frequency)?,
            timing: row.timing,
            instructions: row.instructions,
            current_stock: stock_from_sql(row.current_stock)?,
            status: parse_enum(&row.status)?,
            last_taken: row.last_taken.as_deref().map(parse_time).transpose()?,
            device_status: parse_enum(&row.device_status)?,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}
