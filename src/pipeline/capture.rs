//! Report capture: relocate a row in a fresh scrape and screenshot its report.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::models::{PatientListEntry, ReportCapture};
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::screenshots::ScreenshotStore;
use crate::portal::{
    relocate_entry, release_session, PortalCredentials, PortalDriver, PortalError, PortalSession,
};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error("Screenshot storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

/// Per-entry outcome of a batch capture.
pub type CaptureOutcome = (PatientListEntry, Result<ReportCapture, CaptureError>);

pub struct ReportCaptureService {
    driver: Arc<dyn PortalDriver>,
    credentials: PortalCredentials,
    store: ScreenshotStore,
    diagnostics: DiagnosticDump,
}

impl ReportCaptureService {
    pub fn new(
        driver: Arc<dyn PortalDriver>,
        credentials: PortalCredentials,
        store: ScreenshotStore,
        diagnostics: DiagnosticDump,
    ) -> Self {
        Self {
            driver,
            credentials,
            store,
            diagnostics,
        }
    }

    pub fn store(&self) -> &ScreenshotStore {
        &self.store
    }

    /// Capture one record in its own session.
    pub async fn capture(&self, entry: &PatientListEntry) -> Result<ReportCapture, CaptureError> {
        let mut session = self.driver.login(&self.credentials).await?;
        let result = self.capture_in_session(session.as_mut(), entry).await;
        release_session(
            session,
            result.as_ref().err().map(|e| e.to_string()),
            &self.diagnostics,
            &capture_scope(entry),
        )
        .await;
        result
    }

    /// Capture several records sequentially in one session.
    ///
    /// Only a login failure is returned as `Err`; every other failure is
    /// reported against its entry and the batch continues.
    pub async fn capture_many(
        &self,
        entries: &[PatientListEntry],
    ) -> Result<Vec<CaptureOutcome>, CaptureError> {
        let mut session = self.driver.login(&self.credentials).await?;

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self.capture_in_session(session.as_mut(), entry).await;
            if let Err(e) = &result {
                tracing::warn!(
                    external_id = %entry.external_id,
                    row_index = entry.row_index,
                    error = %e,
                    "Capture failed, continuing with next record"
                );
                self.dump_failure(session.as_mut(), entry, e).await;
            }
            outcomes.push((entry.clone(), result));
        }

        release_session(session, None, &self.diagnostics, "capture-batch").await;
        Ok(outcomes)
    }

    async fn capture_in_session(
        &self,
        session: &mut dyn PortalSession,
        entry: &PatientListEntry,
    ) -> Result<ReportCapture, CaptureError> {
        let span = tracing::info_span!(
            "capture_report",
            external_id = %entry.external_id,
            mrn = %entry.mrn,
            row_index = entry.row_index
        );

        async {
            let started = Instant::now();

            // Positions from earlier scrapes are never trusted as-is.
            let current = session.list_records().await?;
            let located = relocate_entry(&current, entry)?;
            if located.row_index != entry.row_index {
                tracing::debug!(
                    from = entry.row_index,
                    to = located.row_index,
                    "Record moved since it was listed"
                );
            }

            let png = session.capture_record(located.row_index).await?;
            let capture = self.store.store(entry, &png).await?;

            tracing::info!(
                image = %capture.image_url,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Report captured"
            );
            Ok::<_, CaptureError>(capture)
        }
        .instrument(span)
        .await
    }

    async fn dump_failure(
        &self,
        session: &mut dyn PortalSession,
        entry: &PatientListEntry,
        error: &CaptureError,
    ) {
        if !self.diagnostics.is_enabled() {
            return;
        }
        let scope = capture_scope(entry);
        if let Some(png) = session.diagnostic_screenshot().await {
            self.diagnostics.record_binary(&scope, "failure.png", &png);
        }
        self.diagnostics.record_text(&scope, "failure.txt", &error.to_string());
    }
}

fn capture_scope(entry: &PatientListEntry) -> String {
    format!("capture-{}", entry.external_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::MockPortal;

    fn entry(external_id: &str, mrn: &str, row_index: usize) -> PatientListEntry {
        PatientListEntry {
            external_id: external_id.into(),
            visit_date: "12-03-2026".into(),
            mrn: mrn.into(),
            display_name: format!("Patient {mrn}"),
            scraped_title: "CBC".into(),
            row_index,
        }
    }

    fn service(portal: &MockPortal, dir: &std::path::Path) -> ReportCaptureService {
        ReportCaptureService::new(
            Arc::new(portal.clone()),
            PortalCredentials {
                username: "svc".into(),
                password: "pw".into(),
                category: None,
            },
            ScreenshotStore::new(dir),
            DiagnosticDump::disabled(),
        )
    }

    #[tokio::test]
    async fn capture_follows_record_that_moved() {
        let tmp = tempfile::tempdir().unwrap();
        // Listed at row 0; a newer report for someone else now sits on top.
        let portal = MockPortal::new(vec![entry("NEW-1", "B", 0), entry("OLD-1", "A", 0)]);
        let svc = service(&portal, tmp.path());

        let capture = svc.capture(&entry("OLD-1", "A", 0)).await.unwrap();

        assert_eq!(portal.captured_ids(), vec!["OLD-1".to_string()]);
        assert_eq!(std::fs::read(&capture.image_path).unwrap(), b"PNG:OLD-1:CBC");
        assert_eq!(capture.source_entry.external_id, "OLD-1");
        assert_eq!(portal.open_sessions(), 0);
    }

    fn panel(external_id: &str, title: &str, row_index: usize) -> PatientListEntry {
        PatientListEntry {
            scraped_title: title.into(),
            ..entry(external_id, "A", row_index)
        }
    }

    #[tokio::test]
    async fn capture_keeps_panel_when_accession_siblings_shift() {
        let tmp = tempfile::tempdir().unwrap();
        // Listed as CBC@0, CRP@1; a new report then lands on top.
        let portal = MockPortal::new(vec![
            panel("NEW-1", "Lipids", 0),
            panel("ACC-1", "CBC", 0),
            panel("ACC-1", "CRP", 0),
        ]);
        let svc = service(&portal, tmp.path());

        let capture = svc.capture(&panel("ACC-1", "CRP", 1)).await.unwrap();

        assert_eq!(std::fs::read(&capture.image_path).unwrap(), b"PNG:ACC-1:CRP");
        assert_eq!(portal.open_sessions(), 0);
    }

    #[tokio::test]
    async fn capture_uses_dom_position_below_header_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let portal = MockPortal::new(vec![panel("ACC-1", "CBC", 0), panel("ACC-1", "CRP", 0)])
            .with_header_rows(1);
        let svc = service(&portal, tmp.path());

        let capture = svc.capture(&panel("ACC-1", "CBC", 1)).await.unwrap();

        assert_eq!(std::fs::read(&capture.image_path).unwrap(), b"PNG:ACC-1:CBC");
        assert_eq!(portal.captured_ids(), vec!["ACC-1".to_string()]);
    }

    #[tokio::test]
    async fn missing_record_is_not_found_and_session_released() {
        let tmp = tempfile::tempdir().unwrap();
        let portal = MockPortal::new(vec![entry("X-1", "B", 0)]);
        let svc = service(&portal, tmp.path());

        let err = svc.capture(&entry("GONE", "A", 0)).await.unwrap_err();

        assert!(matches!(
            err,
            CaptureError::Portal(PortalError::RecordNotFound { .. })
        ));
        assert!(portal.captured_ids().is_empty());
        assert_eq!(portal.open_sessions(), 0);
    }

    #[tokio::test]
    async fn capture_many_isolates_failures_in_one_session() {
        let tmp = tempfile::tempdir().unwrap();
        let rows = vec![entry("R-1", "A", 0), entry("R-2", "A", 1), entry("R-3", "A", 2)];
        let portal = MockPortal::new(rows.clone()).fail_capture_for("R-2");
        let svc = service(&portal, tmp.path());

        let outcomes = svc.capture_many(&rows).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].1.is_ok());
        assert!(outcomes[1].1.is_err());
        assert!(outcomes[2].1.is_ok());
        assert_eq!(portal.login_count(), 1);
        // one re-scrape per entry
        assert_eq!(portal.scrape_count(), 3);
        assert_eq!(portal.open_sessions(), 0);
    }

    #[tokio::test]
    async fn capture_many_raises_login_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let portal = MockPortal::new(vec![entry("R-1", "A", 0)]).failing_login();
        let svc = service(&portal, tmp.path());

        let err = svc.capture_many(&[entry("R-1", "A", 0)]).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Portal(PortalError::AuthenticationFailure(_))
        ));
    }
}
