//! Sync orchestration: on-demand patient sync, batch sweeps and the
//! periodic scheduler that drives them.

pub mod background;
pub mod orchestrator;
pub mod sweep_lock;
#[cfg(test)]
pub(crate) mod test_support;

pub use background::{start_sync_scheduler, SyncSchedulerHandle, DEFAULT_SYNC_INTERVAL};
pub use orchestrator::{
    ImportedReport, SweepAck, SweepReport, SyncOrchestrator, SyncSettings,
    DEFAULT_INTER_PATIENT_DELAY,
};
pub use sweep_lock::{ActiveSweep, SweepGuard, SweepKind, SweepLock};

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::capture::CaptureError;
use crate::pipeline::extraction::ExtractionError;
use crate::portal::PortalError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Screenshot storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("A sweep is already running{}", .0.as_ref().map(|a| format!(" ({} since {})", a.kind, a.started_at)).unwrap_or_default())]
    SweepInProgress(Option<ActiveSweep>),
}

impl SyncError {
    /// True when the failure concerns one record and siblings can proceed.
    pub fn is_record_scoped(&self) -> bool {
        match self {
            Self::Portal(e) => !e.is_session_scoped(),
            Self::Extraction(_) | Self::Storage(_) => true,
            Self::Database(e) => matches!(
                e,
                DatabaseError::AlreadyExists { .. } | DatabaseError::ConstraintViolation(_)
            ),
            Self::SweepInProgress(_) => false,
        }
    }
}

impl From<CaptureError> for SyncError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Portal(e) => Self::Portal(e),
            CaptureError::Storage(e) => Self::Storage(e),
        }
    }
}
