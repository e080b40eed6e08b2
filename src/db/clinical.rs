//! Clinical record collaborator: the two narrow seams the sync pipeline needs.
//!
//! The pipeline never touches charting tables directly. It reads the admitted
//! patient list through [`AdmissionSource`] and writes results through
//! [`InvestigationStore`]. `SqliteClinicalStore` backs both with the local
//! database; tests can swap in anything implementing the traits.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::{AdmittedPatient, NewInvestigation, PersistedInvestigation};

/// Read side: who is currently admitted.
pub trait AdmissionSource: Send + Sync {
    fn admitted_patients(&self) -> Result<Vec<AdmittedPatient>, DatabaseError>;
}

/// Write side: investigation lookup + create.
pub trait InvestigationStore: Send + Sync {
    fn find_investigation(
        &self,
        patient_id: &str,
        external_id: &str,
        title: &str,
    ) -> Result<Option<PersistedInvestigation>, DatabaseError>;

    fn create_investigation(
        &self,
        request: NewInvestigation,
    ) -> Result<PersistedInvestigation, DatabaseError>;
}

/// SQLite-backed clinical store. One connection, serialized by a mutex.
pub struct SqliteClinicalStore {
    conn: Mutex<Connection>,
}

impl SqliteClinicalStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Direct connection access for seeding and maintenance.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl AdmissionSource for SqliteClinicalStore {
    fn admitted_patients(&self) -> Result<Vec<AdmittedPatient>, DatabaseError> {
        let conn = self.connection()?;
        repository::get_admitted_patients(&conn)
    }
}

impl InvestigationStore for SqliteClinicalStore {
    fn find_investigation(
        &self,
        patient_id: &str,
        external_id: &str,
        title: &str,
    ) -> Result<Option<PersistedInvestigation>, DatabaseError> {
        let conn = self.connection()?;
        repository::find_investigation(&conn, patient_id, external_id, title)
    }

    fn create_investigation(
        &self,
        request: NewInvestigation,
    ) -> Result<PersistedInvestigation, DatabaseError> {
        let investigation = PersistedInvestigation {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            external_id: request.external_id,
            title: request.title,
            kind: request.kind,
            category: request.category,
            status: request.status,
            result_payload: request.result,
            impression: request.impression,
            conducted_at: request.conducted_at,
            author_id: request.author_id,
            created_at: Utc::now(),
        };

        let conn = self.connection()?;
        repository::insert_investigation(&conn, &investigation)?;
        Ok(investigation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvestigationStatus, ResultKind};

    fn request(title: &str) -> NewInvestigation {
        NewInvestigation {
            patient_id: "p-1".into(),
            author_id: "system".into(),
            kind: ResultKind::Lab,
            category: "Hematology".into(),
            title: title.into(),
            status: InvestigationStatus::Completed,
            result: serde_json::json!({"results": {}}),
            impression: None,
            conducted_at: Utc::now(),
            external_id: "ACC-9".into(),
        }
    }

    fn store_with_patient() -> SqliteClinicalStore {
        let store = SqliteClinicalStore::in_memory().unwrap();
        {
            let conn = store.connection().unwrap();
            repository::insert_patient(&conn, "p-1", Some("139494"), "Amina Yusuf").unwrap();
            repository::admit_patient(&conn, "p-1").unwrap();
        }
        store
    }

    #[test]
    fn create_then_find() {
        let store = store_with_patient();
        let created = store.create_investigation(request("CBC")).unwrap();

        let found = store.find_investigation("p-1", "ACC-9", "CBC").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.status, InvestigationStatus::Completed);
    }

    #[test]
    fn second_create_with_same_identity_fails() {
        let store = store_with_patient();
        store.create_investigation(request("CBC")).unwrap();
        let err = store.create_investigation(request("CBC")).unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
    }

    #[test]
    fn admitted_patients_come_from_admissions() {
        let store = store_with_patient();
        let admitted = store.admitted_patients().unwrap();
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].mrn.as_deref(), Some("139494"));
    }
}
