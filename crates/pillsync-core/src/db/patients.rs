//! Patient database operations.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{
    order_clause, parse_owner, parse_time, parse_uuid, time_to_sql, Database, DbError, DbResult,
    TableRecord,
};
use crate::models::{EmergencyContact, OrderBy, OwnerId, Patient, Table};

const COLUMNS: &str = "id, owner_id, name, age, medical_conditions, emergency_contact, created_at, updated_at";

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let conditions = serde_json::to_string(&patient.medical_conditions)?;
        let contact = patient
            .emergency_contact
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, owner_id, name, age, medical_conditions,
                emergency_contact, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                patient.id.to_string(),
                patient.owner_id.to_string(),
                patient.name,
                patient.age,
                conditions,
                contact,
                time_to_sql(&patient.created_at),
                time_to_sql(&patient.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient. Ownership never changes.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let conditions = serde_json::to_string(&patient.medical_conditions)?;
        let contact = patient
            .emergency_contact
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                age = ?3,
                medical_conditions = ?4,
                emergency_contact = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                patient.id.to_string(),
                patient.name,
                patient.age,
                conditions,
                contact,
                time_to_sql(&patient.updated_at),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: Uuid) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE id = ?", COLUMNS);
        self.conn
            .query_row(&sql, [id.to_string()], PatientRow::read)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List an owner's patients.
    pub fn list_patients(&self, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Patient>> {
        let sql = format!(
            "SELECT {} FROM patients WHERE owner_id = ? {}",
            COLUMNS,
            order_clause(order, &["name", "age", "created_at", "updated_at"])?
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.to_string()], PatientRow::read)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Delete a patient. Schedules and activity history go with it.
    pub fn delete_patient(&self, id: Uuid) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?", [id.to_string()])?;
        Ok(rows_affected > 0)
    }
}

impl TableRecord for Patient {
    fn list_owned(db: &Database, owner: OwnerId, order: OrderBy) -> DbResult<Vec<Self>> {
        db.list_patients(owner, order)
    }

    fn get(db: &Database, id: Uuid) -> DbResult<Option<Self>> {
        db.get_patient(id)
    }

    fn insert(db: &Database, row: &Self) -> DbResult<()> {
        db.insert_patient(row)
    }

    fn update(db: &Database, row: &Self) -> DbResult<bool> {
        db.update_patient(row)
    }

    fn delete(db: &Database, id: Uuid) -> DbResult<bool> {
        db.delete_patient(id)
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    owner_id: String,
    name: String,
    age: u32,
    medical_conditions: String,
    emergency_contact: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PatientRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            age: row.get(3)?,
            medical_conditions: row.get(4)?,
            emergency_contact: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let emergency_contact: Option<EmergencyContact> = row
            .emergency_contact
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Patient {
            id: parse_uuid(&row.id)?,
            owner_id: parse_owner(&row.owner_id)?,
            name: row.name,
            age: row.age,
            medical_conditions: serde_json::from_str(&row.medical_conditions)?,
            emergency_contact,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        })
    }
}

/// Rows in `table` that reference a patient, collected before a cascading
/// delete so their removal can be announced.
pub(crate) fn dependents(
    db: &Database,
    table: Table,
    patient_id: Uuid,
) -> DbResult<Vec<(Uuid, OwnerId)>> {
    let sql = format!("SELECT id, owner_id FROM {} WHERE patient_id = ?", table.as_str());
    let mut stmt = db.conn.prepare(&sql)?;
    let rows = stmt.query_map([patient_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, owner) = row?;
        out.push((parse_uuid(&id)?, parse_owner(&owner)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(owner: OwnerId) -> Patient {
        let mut patient = Patient::new(owner, "Mary Smith", 78);
        patient.add_condition("Diabetes");
        patient.emergency_contact = Some(EmergencyContact {
            name: "Tom Smith".into(),
            phone: "555-0101".into(),
            relationship: "Son".into(),
        });
        patient
    }

    #[test]
    fn test_insert_and_get_patient() {
        let db = Database::open_in_memory().unwrap();
        let patient = sample(OwnerId::new());

        db.insert_patient(&patient).unwrap();
        let loaded = db.get_patient(patient.id).unwrap().unwrap();
        assert_eq!(loaded, patient);
    }

    #[test]
    fn test_update_patient() {
        let db = Database::open_in_memory().unwrap();
        let mut patient = sample(OwnerId::new());
        db.insert_patient(&patient).unwrap();

        patient.age = 79;
        patient.add_condition("Arthritis");
        patient.touch();
        assert!(db.update_patient(&patient).unwrap());

        let loaded = db.get_patient(patient.id).unwrap().unwrap();
        assert_eq!(loaded.age, 79);
        assert_eq!(loaded.medical_conditions, vec!["Diabetes", "Arthritis"]);
    }

    #[test]
    fn test_list_is_owner_scoped_and_sorted() {
        let db = Database::open_in_memory().unwrap();
        let owner = OwnerId::new();
        for name in ["carol", "Alice", "Bob"] {
            db.insert_patient(&Patient::new(owner, name, 70)).unwrap();
        }
        db.insert_patient(&Patient::new(OwnerId::new(), "Someone Else", 70))
            .unwrap();

        let names: Vec<_> = db
            .list_patients(owner, OrderBy::asc("name"))
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Alice", "Bob", "carol"]);
    }

    #[test]
    fn test_delete_missing_patient() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.delete_patient(Uuid::new_v4()).unwrap());
    }
}
