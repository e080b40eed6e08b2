//! Pipeline diagnostic dump: writes failure artifacts to disk.
//!
//! Captures what the pipeline saw when something went wrong: the browser page
//! at the moment a portal operation failed, and the raw AI response for each
//! analyzed report.
//!
//! Enabled only when `LABSYNC_DUMP_DIR` is set; everything is written under
//! that directory.
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{scope}/
//!   20260312T083012123-failure.png
//!   20260312T083012123-failure.txt
//!   20260312T083015456-vision-response.txt
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::pipeline::screenshots::sanitize_file_component;

// ──────────────────────────────────────────────
// DiagnosticDump
// ──────────────────────────────────────────────

/// Resolved dump destination. `None` base = diagnostics disabled.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticDump {
    base: Option<PathBuf>,
}

impl DiagnosticDump {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    pub fn disabled() -> Self {
        Self { base: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_some()
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// Returns the dump directory for a scope, or `None` if diagnostics are disabled.
    ///
    /// Creates the directory tree on first call. Returns `None` (with a warning) if
    /// directory creation fails.
    pub fn dir_for(&self, scope: &str) -> Option<PathBuf> {
        let base = self.base.as_ref()?;
        let dir = base.join(sanitize_file_component(scope));

        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Diagnostic dump: failed to create directory"
            );
            return None;
        }

        Some(dir)
    }

    pub fn record_binary(&self, scope: &str, name: &str, data: &[u8]) {
        if let Some(dir) = self.dir_for(scope) {
            dump_binary(&dir, &stamped(name), data);
        }
    }

    pub fn record_text(&self, scope: &str, name: &str, text: &str) {
        if let Some(dir) = self.dir_for(scope) {
            dump_text(&dir, &stamped(name), text);
        }
    }

    pub fn record_json<T: serde::Serialize>(&self, scope: &str, name: &str, value: &T) {
        if let Some(dir) = self.dir_for(scope) {
            dump_json(&dir, &stamped(name), value);
        }
    }
}

/// Prefix a filename with a UTC timestamp so repeated failures don't overwrite.
fn stamped(name: &str) -> String {
    format!("{}-{name}", Utc::now().format("%Y%m%dT%H%M%S%3f"))
}

// ──────────────────────────────────────────────
// Dump writers
// ──────────────────────────────────────────────

/// Write a binary artifact (PNG screenshot).
///
/// Logs on success (debug) and failure (warn). Never panics.
pub fn dump_binary(dir: &Path, filename: &str, data: &[u8]) {
    let path = dir.join(filename);
    match std::fs::write(&path, data) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = data.len(),
            "Diagnostic dump: binary written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write binary"
        ),
    }
}

/// Write a JSON artifact. Pretty-printed. Never panics.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => dump_text(dir, filename, &json),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (prompt, raw model response, error message).
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_dump_has_no_dir() {
        let dump = DiagnosticDump::disabled();
        assert!(!dump.is_enabled());
        assert!(dump.dir_for("anything").is_none());
    }

    #[test]
    fn dir_for_creates_sanitized_scope_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = DiagnosticDump::new(Some(tmp.path().to_path_buf()));

        let dir = dump.dir_for("capture/ACC 1").unwrap();
        assert!(dir.exists());
        assert!(dir.starts_with(tmp.path()));
        assert_eq!(dir.parent().unwrap(), tmp.path());
    }

    #[test]
    fn record_text_stamps_filename() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = DiagnosticDump::new(Some(tmp.path().to_path_buf()));

        dump.record_text("extraction", "vision-response.txt", "[]");

        let names: Vec<String> = std::fs::read_dir(tmp.path().join("extraction"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("-vision-response.txt"));
    }

    #[test]
    fn dump_binary_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        dump_binary(tmp.path(), "test.png", b"PNG fake image data");
        let written = std::fs::read(tmp.path().join("test.png")).unwrap();
        assert_eq!(written, b"PNG fake image data");
    }

    #[test]
    fn dump_json_writes_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();
        dump_json(tmp.path(), "info.json", &serde_json::json!({"name": "test", "value": 42}));

        let content = std::fs::read_to_string(tmp.path().join("info.json")).unwrap();
        assert!(content.contains("\"name\": \"test\""));
        assert!(content.contains('\n'));
    }

    #[test]
    fn write_failures_do_not_panic() {
        let bad_dir = Path::new("/nonexistent/path/that/does/not/exist");
        dump_binary(bad_dir, "test.png", b"data");
        dump_json(bad_dir, "test.json", &"data");
        dump_text(bad_dir, "test.txt", "data");
    }
}
