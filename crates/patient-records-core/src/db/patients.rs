//! Patient record database operations.
//!
//! Every query that reads or writes an existing record is scoped by both the
//! owning doctor and the record id, so another doctor's row is never loaded.

use rusqlite::{params, OptionalExtension};

use super::{from_db_timestamp, to_db_timestamp, Database, DbError, DbResult};
use crate::models::{DoctorId, PatientFields, PatientPatch, PatientRecord};

impl Database {
    /// Insert a new patient record.
    pub fn insert_patient_record(&self, record: &PatientRecord) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, doctor_id, name, age, blood_pressure, disease,
                prescription, created_at, last_visit_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.doctor_id.as_str(),
                record.fields.name,
                record.fields.age,
                record.fields.blood_pressure,
                record.fields.disease,
                record.fields.prescription,
                to_db_timestamp(&record.created_at),
                to_db_timestamp(&record.last_visit_date),
            ],
        )?;
        Ok(())
    }

    /// Get a record by id, only if it belongs to `doctor_id`.
    pub fn find_owned_patient(
        &self,
        doctor_id: &DoctorId,
        id: &str,
    ) -> DbResult<Option<PatientRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT id, doctor_id, name, age, blood_pressure, disease,
                       prescription, created_at, last_visit_date
                FROM patients
                WHERE doctor_id = ?1 AND id = ?2
                "#,
                params![doctor_id.as_str(), id],
                |row| {
                    Ok(PatientRow {
                        id: row.get(0)?,
                        doctor_id: row.get(1)?,
                        name: row.get(2)?,
                        age: row.get(3)?,
                        blood_pressure: row.get(4)?,
                        disease: row.get(5)?,
                        prescription: row.get(6)?,
                        created_at: row.get(7)?,
                        last_visit_date: row.get(8)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Check whether `doctor_id` owns a record with this id.
    pub fn owns_patient(&self, doctor_id: &DoctorId, id: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id.as_str(), id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Apply a partial update to an owned record.
    ///
    /// Absent patch fields keep their stored value. The visit timestamp never
    /// moves backwards, even if the caller's clock is behind the stored value.
    /// Returns false if no owned record matched.
    pub fn update_patient_record(
        &self,
        doctor_id: &DoctorId,
        id: &str,
        patch: &PatientPatch,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = COALESCE(?3, name),
                age = COALESCE(?4, age),
                blood_pressure = COALESCE(?5, blood_pressure),
                disease = COALESCE(?6, disease),
                prescription = COALESCE(?7, prescription),
                last_visit_date = MAX(last_visit_date, ?8)
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![
                doctor_id.as_str(),
                id,
                patch.name,
                patch.age,
                patch.blood_pressure,
                patch.disease,
                patch.prescription,
                to_db_timestamp(&patch.last_visit_date),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete an owned record.
    pub fn delete_patient_record(&self, doctor_id: &DoctorId, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM patients WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id.as_str(), id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    doctor_id: String,
    name: String,
    age: String,
    blood_pressure: String,
    disease: String,
    prescription: String,
    created_at: String,
    last_visit_date: String,
}

impl TryFrom<PatientRow> for PatientRecord {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(PatientRecord {
            id: row.id,
            doctor_id: DoctorId::new(row.doctor_id),
            fields: PatientFields {
                name: row.name,
                age: row.age,
                blood_pressure: row.blood_pressure,
                disease: row.disease,
                prescription: row.prescription,
            },
            created_at: from_db_timestamp(&row.created_at)?,
            last_visit_date: from_db_timestamp(&row.last_visit_date)?,
        })
    }
}
