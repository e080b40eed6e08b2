//! Top-level sync operations.
//!
//! `sync_patient` is the unit of work: fresh scrape, capture every matching
//! row in one session, then extract and persist the captures concurrently.
//! Failures are isolated per record; only a failure that kills the whole
//! patient (login, scrape) is returned. Sweeps run `sync_patient` for every
//! admitted patient under the sweep lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;

use super::sweep_lock::{ActiveSweep, SweepGuard, SweepKind, SweepLock};
use super::SyncError;
use crate::db::AdmissionSource;
use crate::models::{ExtractedResultItem, PatientListEntry, PersistedInvestigation, ReportCapture};
use crate::pipeline::capture::ReportCaptureService;
use crate::pipeline::extraction::{ExtractionError, StructuredExtractionService};
use crate::pipeline::list_cache::PatientListCache;
use crate::pipeline::persistence::DeduplicationPersistence;

/// Pause between patients in a sweep: 5 seconds.
pub const DEFAULT_INTER_PATIENT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub inter_patient_delay: Duration,
    /// Store a placeholder investigation when the model output is unreadable,
    /// so the screenshot still reaches the chart.
    pub keep_unreadable_reports: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            inter_patient_delay: DEFAULT_INTER_PATIENT_DELAY,
            keep_unreadable_reports: false,
        }
    }
}

/// Result of `import_single_report`: nothing is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedReport {
    pub image_path: PathBuf,
    pub image_url: String,
    pub extracted_items: Vec<ExtractedResultItem>,
}

/// Reply to a `sync_all` request.
#[derive(Debug, Clone, Serialize)]
pub struct SweepAck {
    pub started: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<ActiveSweep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub started_at: DateTime<Utc>,
    pub patients_processed: usize,
    pub patients_failed: usize,
    pub patients_skipped_no_mrn: usize,
    pub records_imported: usize,
    pub duration_ms: u64,
}

pub struct SyncOrchestrator {
    cache: Arc<PatientListCache>,
    capture: ReportCaptureService,
    extraction: StructuredExtractionService,
    persistence: DeduplicationPersistence,
    admissions: Arc<dyn AdmissionSource>,
    sweep_lock: SweepLock,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        cache: Arc<PatientListCache>,
        capture: ReportCaptureService,
        extraction: StructuredExtractionService,
        persistence: DeduplicationPersistence,
        admissions: Arc<dyn AdmissionSource>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            cache,
            capture,
            extraction,
            persistence,
            admissions,
            sweep_lock: SweepLock::new(),
            settings,
        }
    }

    pub fn sweep_lock(&self) -> &SweepLock {
        &self.sweep_lock
    }

    pub fn cache(&self) -> &PatientListCache {
        &self.cache
    }

    // ── On-demand operations ────────────────────────────────

    pub async fn list_patients(&self, force_refresh: bool) -> Result<Vec<PatientListEntry>, SyncError> {
        let snapshot = self.cache.get(force_refresh).await?;
        Ok(snapshot.entries.clone())
    }

    /// Capture and extract one report without storing anything.
    pub async fn import_single_report(&self, entry: &PatientListEntry) -> Result<ImportedReport, SyncError> {
        let capture = self.capture.capture(entry).await?;
        let extracted_items = self.extraction.analyze(&capture.image_path).await?;
        Ok(ImportedReport {
            image_path: capture.image_path,
            image_url: capture.image_url,
            extracted_items,
        })
    }

    /// Pull every portal report for `mrn` into the chart of `patient_id`.
    /// Returns the investigations created by this call.
    pub async fn sync_patient(
        &self,
        mrn: &str,
        patient_id: &str,
        author_id: &str,
    ) -> Result<Vec<PersistedInvestigation>, SyncError> {
        let span = tracing::info_span!("sync_patient", mrn = %mrn, patient_id = %patient_id);
        async {
            let started = Instant::now();

            let snapshot = self.cache.get(true).await?;
            let entries = snapshot.entries_for_mrn(mrn);
            if entries.is_empty() {
                tracing::info!("No portal records for patient");
                return Ok(Vec::new());
            }

            let captures: Vec<ReportCapture> = self
                .capture
                .capture_many(&entries)
                .await?
                .into_iter()
                .filter_map(|(_, outcome)| outcome.ok())
                .collect();

            let results = join_all(
                captures
                    .iter()
                    .map(|capture| self.extract_and_persist(patient_id, author_id, capture)),
            )
            .await;

            let mut created = Vec::new();
            for (capture, result) in captures.iter().zip(results) {
                match result {
                    Ok(records) => created.extend(records),
                    Err(e) => tracing::warn!(
                        external_id = %capture.source_entry.external_id,
                        error = %e,
                        "Record skipped"
                    ),
                }
            }

            tracing::info!(
                matched = entries.len(),
                captured = captures.len(),
                imported = created.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Patient sync complete"
            );
            Ok::<_, SyncError>(created)
        }
        .instrument(span)
        .await
    }

    async fn extract_and_persist(
        &self,
        patient_id: &str,
        author_id: &str,
        capture: &ReportCapture,
    ) -> Result<Vec<PersistedInvestigation>, SyncError> {
        let span = tracing::info_span!(
            "extract_report",
            external_id = %capture.source_entry.external_id,
            row_index = capture.source_entry.row_index
        );
        async {
            let items = match self.extraction.analyze(&capture.image_path).await {
                Ok(items) => items,
                Err(ExtractionError::Parse(reason)) if self.settings.keep_unreadable_reports => {
                    tracing::warn!(reason = %reason, "Unreadable report kept as placeholder");
                    vec![ExtractedResultItem::placeholder(&reason)]
                }
                Err(e) => return Err(e.into()),
            };

            let mut created = Vec::new();
            for item in &items {
                match self.persistence.persist(patient_id, author_id, item, capture) {
                    Ok(Some(record)) => created.push(record),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(title = %item.title, error = %e, "Result item not stored"),
                }
            }
            Ok::<_, SyncError>(created)
        }
        .instrument(span)
        .await
    }

    // ── Sweeps ──────────────────────────────────────────────

    /// Start a manual sweep in the background. Never waits for the sweep.
    pub fn sync_all(self: &Arc<Self>, author_id: &str) -> SweepAck {
        let guard = match self.sweep_lock.try_acquire(SweepKind::Manual) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::info!(error = %e, "Manual sweep not started");
                let running = match e {
                    SyncError::SweepInProgress(running) => running,
                    _ => None,
                };
                return SweepAck {
                    started: false,
                    message: "A sync sweep is already running".into(),
                    running,
                };
            }
        };

        let this = Arc::clone(self);
        let author_id = author_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.sweep(guard, &author_id).await {
                tracing::error!(error = %e, "Manual sweep failed");
            }
        });

        SweepAck {
            started: true,
            message: "Sync of all admitted patients started".into(),
            running: None,
        }
    }

    /// Run a sweep to completion. Rejected if another sweep holds the lock.
    pub async fn run_sweep(&self, kind: SweepKind, author_id: &str) -> Result<SweepReport, SyncError> {
        let guard = self.sweep_lock.try_acquire(kind)?;
        self.sweep(guard, author_id).await
    }

    async fn sweep(&self, guard: SweepGuard, author_id: &str) -> Result<SweepReport, SyncError> {
        let started = Instant::now();
        let mut report = SweepReport {
            kind: guard.kind(),
            started_at: Utc::now(),
            patients_processed: 0,
            patients_failed: 0,
            patients_skipped_no_mrn: 0,
            records_imported: 0,
            duration_ms: 0,
        };

        let patients = self.admissions.admitted_patients()?;
        tracing::info!(kind = %report.kind, patients = patients.len(), "Sweep started");

        let mut first = true;
        for patient in &patients {
            let Some(mrn) = patient.mrn.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
                tracing::debug!(patient_id = %patient.id, "No MRN, skipping");
                report.patients_skipped_no_mrn += 1;
                continue;
            };

            if !first {
                tokio::time::sleep(self.settings.inter_patient_delay).await;
            }
            first = false;

            match self.sync_patient(mrn, &patient.id, author_id).await {
                Ok(records) => {
                    report.patients_processed += 1;
                    report.records_imported += records.len();
                }
                Err(e) => {
                    report.patients_failed += 1;
                    tracing::warn!(mrn = %mrn, patient_id = %patient.id, error = %e, "Patient sync failed");
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            kind = %report.kind,
            processed = report.patients_processed,
            failed = report.patients_failed,
            skipped = report.patients_skipped_no_mrn,
            imported = report.records_imported,
            duration_ms = report.duration_ms,
            "Sweep finished"
        );
        drop(guard);
        Ok(report)
    }
}
