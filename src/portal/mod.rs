//! External results portal automation.
//!
//! The portal has no API, only a human-facing web UI. Everything that touches
//! the browser sits behind [`PortalDriver`] / [`PortalSession`]; the rest of
//! the pipeline only sees `PatientListEntry` rows and PNG bytes.

pub mod error;
pub mod login;
pub mod mock;
pub mod rows;
pub mod traits;
pub mod types;
pub mod webdriver;

pub use error::PortalError;
pub use mock::MockPortal;
pub use rows::{parse_row, relocate_entry};
pub use traits::{PortalDriver, PortalSession};
pub use types::*;
pub use webdriver::WebDriverPortal;

use crate::pipeline::diagnostic::DiagnosticDump;

/// Close a session at the end of an operation.
///
/// When the operation failed, a screenshot of the current page is written to
/// the diagnostic dump first. Close failures are logged, never returned.
pub async fn release_session(
    mut session: Box<dyn PortalSession>,
    failure: Option<String>,
    diagnostics: &DiagnosticDump,
    scope: &str,
) {
    if let Some(reason) = failure {
        if diagnostics.is_enabled() {
            if let Some(png) = session.diagnostic_screenshot().await {
                diagnostics.record_binary(scope, "failure.png", &png);
            }
            diagnostics.record_text(scope, "failure.txt", &reason);
        }
    }

    if let Err(e) = session.close().await {
        tracing::warn!(scope, error = %e, "Failed to close portal session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> PortalCredentials {
        PortalCredentials {
            username: "svc".into(),
            password: "pw".into(),
            category: None,
        }
    }

    #[tokio::test]
    async fn release_closes_and_dumps_on_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let diagnostics = DiagnosticDump::new(Some(tmp.path().to_path_buf()));
        let portal = MockPortal::new(vec![]);

        let session = portal.login(&creds()).await.unwrap();
        release_session(session, Some("grid timeout".into()), &diagnostics, "scrape").await;

        assert_eq!(portal.open_sessions(), 0);
        let files: Vec<_> = std::fs::read_dir(tmp.path().join("scrape"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(files.iter().any(|f| f.ends_with("failure.png")));
        assert!(files.iter().any(|f| f.ends_with("failure.txt")));
    }

    #[tokio::test]
    async fn release_without_failure_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let diagnostics = DiagnosticDump::new(Some(tmp.path().to_path_buf()));
        let portal = MockPortal::new(vec![]);

        let session = portal.login(&creds()).await.unwrap();
        release_session(session, None, &diagnostics, "scrape").await;

        assert_eq!(portal.open_sessions(), 0);
        assert!(!tmp.path().join("scrape").exists());
    }
}
