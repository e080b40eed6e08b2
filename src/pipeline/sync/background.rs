//! Periodic sync scheduler.
//!
//! A tokio task ticks every `interval` (first tick one interval after start)
//! and runs a scheduled sweep. A tick that finds a sweep already running is
//! logged and skipped. Missed ticks are not replayed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::orchestrator::SyncOrchestrator;
use super::sweep_lock::SweepKind;
use super::SyncError;

/// Default sweep interval: 10 minutes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Handle for the scheduler task.
///
/// `shutdown()` lets a running sweep finish but starts no new one. Dropping
/// the handle sends the same signal.
pub struct SyncSchedulerHandle {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SyncSchedulerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Sync scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SyncSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn start_sync_scheduler(
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    author_id: String,
) -> SyncSchedulerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Sync scheduler started");
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => run_scheduled_sweep(&orchestrator, &author_id).await,
            }
        }
        tracing::info!("Sync scheduler shutting down");
    });

    SyncSchedulerHandle {
        shutdown,
        handle: Some(handle),
    }
}

async fn run_scheduled_sweep(orchestrator: &SyncOrchestrator, author_id: &str) {
    match orchestrator.run_sweep(SweepKind::Scheduled, author_id).await {
        Ok(report) => tracing::debug!(imported = report.records_imported, "Scheduled sweep done"),
        Err(SyncError::SweepInProgress(running)) => tracing::info!(
            running = ?running.map(|r| r.kind),
            "Previous sweep still running, skipping tick"
        ),
        Err(e) => tracing::error!(error = %e, "Scheduled sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::get_investigations_for_patient;
    use crate::pipeline::extraction::MockVisionClient;
    use crate::pipeline::sync::test_support::{entry, harness, immediate, CBC};
    use crate::portal::MockPortal;

    #[test]
    fn default_interval_is_ten_minutes() {
        assert_eq!(DEFAULT_SYNC_INTERVAL.as_secs(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn no_sweep_before_first_interval() {
        let h = harness(
            MockPortal::new(vec![entry("139494", "ACC-1", "CBC")]),
            MockVisionClient::new(CBC),
            immediate(),
        );
        let scheduler = start_sync_scheduler(h.orchestrator.clone(), DEFAULT_SYNC_INTERVAL, "system".into());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.portal.login_count(), 0);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tick_runs_a_scheduled_sweep() {
        let h = harness(
            MockPortal::new(vec![entry("139494", "ACC-1", "CBC")]),
            MockVisionClient::new(CBC),
            immediate(),
        );
        let scheduler = start_sync_scheduler(h.orchestrator.clone(), DEFAULT_SYNC_INTERVAL, "system".into());

        tokio::time::sleep(DEFAULT_SYNC_INTERVAL + Duration::from_secs(1)).await;
        for _ in 0..100 {
            if h.portal.login_count() >= 2 && !h.orchestrator.sweep_lock().is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // one login for the fresh scrape, one for the capture session
        assert!(h.portal.login_count() >= 2);
        scheduler.stop().await;

        let stored = get_investigations_for_patient(&h.store.connection().unwrap(), "p-1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].author_id, "system");
    }

    #[tokio::test(start_paused = true)]
    async fn busy_lock_skips_the_tick() {
        let h = harness(
            MockPortal::new(vec![entry("139494", "ACC-1", "CBC")]),
            MockVisionClient::new(CBC),
            immediate(),
        );
        let _manual = h.orchestrator.sweep_lock().try_acquire(SweepKind::Manual).unwrap();
        let scheduler = start_sync_scheduler(h.orchestrator.clone(), DEFAULT_SYNC_INTERVAL, "system".into());

        tokio::time::sleep(DEFAULT_SYNC_INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(h.portal.login_count(), 0);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_ends_the_task() {
        let h = harness(MockPortal::default(), MockVisionClient::new("[]"), immediate());
        let scheduler = start_sync_scheduler(h.orchestrator.clone(), DEFAULT_SYNC_INTERVAL, "system".into());
        tokio::time::timeout(Duration::from_secs(5), scheduler.stop())
            .await
            .unwrap();
    }
}
