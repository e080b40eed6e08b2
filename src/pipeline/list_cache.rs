//! TTL-guarded cache of the portal's full patient list.
//!
//! A scrape costs a browser login, so the list is memoized for a short TTL
//! and refreshes are single-flight: callers that miss at the same time queue
//! on one refresh lock, and whoever gets it after a refresh has landed takes
//! that snapshot instead of scraping again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::models::CacheSnapshot;
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::portal::{release_session, PortalCredentials, PortalDriver, PortalError};

/// Default snapshot lifetime: 5 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedList {
    snapshot: Arc<CacheSnapshot>,
    fetched_at: Instant,
}

pub struct PatientListCache {
    driver: Arc<dyn PortalDriver>,
    credentials: PortalCredentials,
    diagnostics: DiagnosticDump,
    ttl: Duration,
    slot: RwLock<Option<CachedList>>,
    /// Held for the duration of a scrape.
    refresh_lock: Mutex<()>,
}

impl PatientListCache {
    pub fn new(
        driver: Arc<dyn PortalDriver>,
        credentials: PortalCredentials,
        diagnostics: DiagnosticDump,
        ttl: Duration,
    ) -> Self {
        Self {
            driver,
            credentials,
            diagnostics,
            ttl,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current list. Scrapes when forced, empty or expired.
    pub async fn get(&self, force_refresh: bool) -> Result<Arc<CacheSnapshot>, PortalError> {
        let observed = {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if !force_refresh && cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.snapshot.clone());
                }
            }
            slot.as_ref().map(|c| c.snapshot.clone())
        };

        let _refresh = self.refresh_lock.lock().await;

        if let Some(current) = self.slot.read().await.as_ref() {
            let replaced = match &observed {
                Some(previous) => !Arc::ptr_eq(previous, &current.snapshot),
                None => true,
            };
            if replaced {
                tracing::debug!("Patient list refreshed while waiting, reusing it");
                return Ok(current.snapshot.clone());
            }
        }

        let snapshot = Arc::new(self.scrape().await?);
        *self.slot.write().await = Some(CachedList {
            snapshot: snapshot.clone(),
            fetched_at: Instant::now(),
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot; the next `get` scrapes.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    async fn scrape(&self) -> Result<CacheSnapshot, PortalError> {
        let started = Instant::now();
        let mut session = self.driver.login(&self.credentials).await?;
        let result = session.list_records().await;
        release_session(
            session,
            result.as_ref().err().map(|e| e.to_string()),
            &self.diagnostics,
            "list-scrape",
        )
        .await;

        let entries = result?;
        tracing::info!(
            entries = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Patient list scraped"
        );
        Ok(CacheSnapshot::new(entries))
    }
}
