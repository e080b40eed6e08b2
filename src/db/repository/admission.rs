use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::AdmittedPatient;

pub fn insert_patient(
    conn: &Connection,
    id: &str,
    mrn: Option<&str>,
    name: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, mrn, name) VALUES (?1, ?2, ?3)",
        params![id, mrn, name],
    )?;
    Ok(())
}

/// Open an admission for a patient. Returns the admission id.
pub fn admit_patient(conn: &Connection, patient_id: &str) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO admissions (id, patient_id, admitted_at) VALUES (?1, ?2, ?3)",
        params![id, patient_id, Utc::now().to_rfc3339()],
    )?;
    Ok(id)
}

/// Close every open admission of a patient.
pub fn discharge_patient(conn: &Connection, patient_id: &str) -> Result<usize, DatabaseError> {
    let closed = conn.execute(
        "UPDATE admissions SET discharged_at = ?2
         WHERE patient_id = ?1 AND discharged_at IS NULL",
        params![patient_id, Utc::now().to_rfc3339()],
    )?;
    Ok(closed)
}

/// Patients with at least one open admission, oldest admission first.
pub fn get_admitted_patients(conn: &Connection) -> Result<Vec<AdmittedPatient>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.mrn, p.name, MIN(a.admitted_at) AS since
         FROM patients p
         JOIN admissions a ON a.patient_id = p.id
         WHERE a.discharged_at IS NULL
         GROUP BY p.id
         ORDER BY since ASC, p.id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(AdmittedPatient {
            id: row.get(0)?,
            mrn: row.get(1)?,
            name: row.get(2)?,
        })
    })?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(row?);
    }
    Ok(patients)
}
