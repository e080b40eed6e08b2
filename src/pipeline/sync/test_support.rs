//! Fully wired orchestrator over mocks and in-memory SQLite.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::{SyncOrchestrator, SyncSettings};
use crate::db::repository::{admit_patient, insert_patient};
use crate::db::SqliteClinicalStore;
use crate::models::PatientListEntry;
use crate::pipeline::capture::ReportCaptureService;
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::extraction::{MockVisionClient, StructuredExtractionService};
use crate::pipeline::list_cache::PatientListCache;
use crate::pipeline::persistence::DeduplicationPersistence;
use crate::pipeline::screenshots::ScreenshotStore;
use crate::portal::{MockPortal, PortalCredentials, PortalDriver};

pub const CBC: &str = r#"[{"kind": "LAB", "category": "Hematology", "title": "CBC",
    "date": "2026-03-12T08:30:00Z", "results": {"Hb": "12.1 g/dL", "WBC": "7.2"}}]"#;

pub struct Harness {
    pub portal: MockPortal,
    pub store: Arc<SqliteClinicalStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub data_dir: TempDir,
}

pub fn entry(mrn: &str, external_id: &str, title: &str) -> PatientListEntry {
    PatientListEntry {
        external_id: external_id.into(),
        visit_date: "12-03-2026 08:30".into(),
        mrn: mrn.into(),
        display_name: "Amina Yusuf".into(),
        scraped_title: title.into(),
        row_index: 0,
    }
}

pub fn immediate() -> SyncSettings {
    SyncSettings {
        inter_patient_delay: Duration::ZERO,
        keep_unreadable_reports: false,
    }
}

/// Patient `p-1` (MRN 139494) is admitted.
pub fn harness(portal: MockPortal, vision: MockVisionClient, settings: SyncSettings) -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteClinicalStore::in_memory().unwrap());
    {
        let conn = store.connection().unwrap();
        insert_patient(&conn, "p-1", Some("139494"), "Amina Yusuf").unwrap();
        admit_patient(&conn, "p-1").unwrap();
    }

    let driver: Arc<dyn PortalDriver> = Arc::new(portal.clone());
    let credentials = PortalCredentials {
        username: "svc".into(),
        password: "pw".into(),
        category: None,
    };
    let diagnostics = DiagnosticDump::disabled();
    let cache = Arc::new(PatientListCache::new(
        driver.clone(),
        credentials.clone(),
        diagnostics.clone(),
        Duration::from_secs(300),
    ));
    let capture = ReportCaptureService::new(
        driver,
        credentials,
        ScreenshotStore::new(data_dir.path()),
        diagnostics.clone(),
    );
    let extraction = StructuredExtractionService::new(Arc::new(vision), "medgemma:4b".into(), diagnostics);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        cache,
        capture,
        extraction,
        DeduplicationPersistence::new(store.clone()),
        store.clone(),
        settings,
    ));

    Harness {
        portal,
        store,
        orchestrator,
        data_dir,
    }
}
