//! Sweep exclusivity.
//!
//! At most one batch sweep runs at a time. `try_acquire()` never waits: a
//! second trigger is told which sweep holds the lock and since when.
//! The guard is owned so it can travel into a spawned task.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use super::SyncError;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    /// Periodic timer
    Scheduled,
    /// `sync_all` request
    Manual,
}

impl std::fmt::Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled sweep"),
            Self::Manual => write!(f, "Manual sweep"),
        }
    }
}

/// Snapshot of the running sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSweep {
    pub kind: SweepKind,
    /// ISO 8601.
    pub started_at: String,
}

// ═══════════════════════════════════════════════════════════
// SweepLock
// ═══════════════════════════════════════════════════════════

#[derive(Clone, Default)]
pub struct SweepLock {
    lock: Arc<tokio::sync::Mutex<()>>,
    current: Arc<Mutex<Option<ActiveSweep>>>,
}

impl SweepLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock or report who holds it.
    pub fn try_acquire(&self, kind: SweepKind) -> Result<SweepGuard, SyncError> {
        let guard = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SyncError::SweepInProgress(self.current()))?;

        if let Ok(mut current) = self.current.lock() {
            *current = Some(ActiveSweep {
                kind,
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
        Ok(SweepGuard {
            kind,
            current: self.current.clone(),
            _guard: guard,
        })
    }

    pub fn current(&self) -> Option<ActiveSweep> {
        self.current.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

// ═══════════════════════════════════════════════════════════
// SweepGuard (RAII sweep token)
// ═══════════════════════════════════════════════════════════

/// Dropping the guard clears the active sweep and releases the lock.
pub struct SweepGuard {
    kind: SweepKind,
    current: Arc<Mutex<Option<ActiveSweep>>>,
    _guard: OwnedMutexGuard<()>,
}

impl SweepGuard {
    pub fn kind(&self) -> SweepKind {
        self.kind
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}
