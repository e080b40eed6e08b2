//! Local SQLite storage.
//!
//! `sqlite` opens and migrates connections, `repository` holds the free
//! functions over a `Connection`, and `clinical` wraps both behind the
//! `AdmissionSource` and `InvestigationStore` seams the sync pipeline uses.

pub mod clinical;
pub mod repository;
pub mod sqlite;

pub use clinical::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Lookup by id or MRN found no row.
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    /// Caller-supplied data rejected before reaching SQLite.
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Losing side of a concurrent insert on a unique key.
    #[error("{entity_type} already exists: {key}")]
    AlreadyExists { entity_type: String, key: String },

    #[error("Connection mutex poisoned")]
    LockPoisoned,
}

/// True when a rusqlite error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
