use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{is_unique_violation, DatabaseError};
use crate::models::*;

const INVESTIGATION_COLUMNS: &str = "id, patient_id, author_id, type, category, title, status,
         result, impression, conducted_at, external_id, created_at";

pub fn insert_investigation(
    conn: &Connection,
    inv: &PersistedInvestigation,
) -> Result<(), DatabaseError> {
    let result_json = serde_json::to_string(&inv.result_payload)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO investigations (id, patient_id, author_id, type, category, title, status,
         result, impression, conducted_at, external_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            inv.id.to_string(),
            inv.patient_id,
            inv.author_id,
            inv.kind.as_str(),
            inv.category,
            inv.title,
            inv.status.as_str(),
            result_json,
            inv.impression,
            inv.conducted_at.to_rfc3339(),
            inv.external_id,
            inv.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            DatabaseError::AlreadyExists {
                entity_type: "investigation".into(),
                key: format!("{}/{}/{}", inv.patient_id, inv.external_id, inv.title),
            }
        } else {
            DatabaseError::Sqlite(e)
        }
    })?;
    Ok(())
}

/// Exact identity lookup on (patient, external record, effective title).
pub fn find_investigation(
    conn: &Connection,
    patient_id: &str,
    external_id: &str,
    title: &str,
) -> Result<Option<PersistedInvestigation>, DatabaseError> {
    let sql = format!(
        "SELECT {INVESTIGATION_COLUMNS} FROM investigations
         WHERE patient_id = ?1 AND external_id = ?2 AND title = ?3
         LIMIT 1"
    );
    let row = conn
        .query_row(&sql, params![patient_id, external_id, title], investigation_row_from_rusqlite)
        .optional()?;

    row.map(investigation_from_row).transpose()
}

pub fn get_investigations_for_patient(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<PersistedInvestigation>, DatabaseError> {
    let sql = format!(
        "SELECT {INVESTIGATION_COLUMNS} FROM investigations
         WHERE patient_id = ?1 ORDER BY conducted_at DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id], investigation_row_from_rusqlite)?;

    let mut investigations = Vec::new();
    for row in rows {
        investigations.push(investigation_from_row(row?)?);
    }
    Ok(investigations)
}

pub fn count_investigations(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM investigations", [], |row| row.get(0))?;
    Ok(count)
}

// Internal row type for PersistedInvestigation mapping
struct InvestigationRow {
    id: String,
    patient_id: String,
    author_id: String,
    kind: String,
    category: String,
    title: String,
    status: String,
    result: String,
    impression: Option<String>,
    conducted_at: String,
    external_id: String,
    created_at: String,
}

fn investigation_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<InvestigationRow, rusqlite::Error> {
    Ok(InvestigationRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        author_id: row.get(2)?,
        kind: row.get(3)?,
        category: row.get(4)?,
        title: row.get(5)?,
        status: row.get(6)?,
        result: row.get(7)?,
        impression: row.get(8)?,
        conducted_at: row.get(9)?,
        external_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn investigation_from_row(row: InvestigationRow) -> Result<PersistedInvestigation, DatabaseError> {
    Ok(PersistedInvestigation {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        patient_id: row.patient_id,
        external_id: row.external_id,
        title: row.title,
        kind: ResultKind::from_str(&row.kind)?,
        category: row.category,
        status: InvestigationStatus::from_str(&row.status)?,
        result_payload: serde_json::from_str(&row.result)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        impression: row.impression,
        conducted_at: parse_timestamp(&row.conducted_at)?,
        author_id: row.author_id,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {value}: {e}")))
}
