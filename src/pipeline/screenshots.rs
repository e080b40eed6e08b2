//! Durable storage for captured report screenshots.
//!
//! Files live under `{data_dir}/screenshots/` and are served by the HTTP
//! surface under [`SCREENSHOT_URL_PREFIX`]. Names combine the record id, a UTC
//! timestamp and a short content hash, so recaptures never collide.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::{PatientListEntry, ReportCapture};

pub const SCREENSHOT_URL_PREFIX: &str = "/screenshots";
const SCREENSHOT_SUBDIR: &str = "screenshots";
const MAX_COMPONENT_LEN: usize = 64;

/// Reduce arbitrary text to a safe single path component.
pub fn sanitize_file_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_COMPONENT_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "unknown".into()
    } else {
        cleaned
    }
}

/// Short hex SHA-256 prefix of the image bytes.
fn content_tag(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    root: PathBuf,
}

impl ScreenshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join(SCREENSHOT_SUBDIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{SCREENSHOT_URL_PREFIX}/{file_name}")
    }

    /// Persist one capture and describe where it lives.
    pub async fn store(
        &self,
        entry: &PatientListEntry,
        png: &[u8],
    ) -> Result<ReportCapture, std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await?;

        let id = if entry.external_id.trim().is_empty() {
            &entry.mrn
        } else {
            &entry.external_id
        };
        let file_name = format!(
            "{}-{}-{}.png",
            sanitize_file_component(id),
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            content_tag(png),
        );
        let image_path = self.root.join(&file_name);
        tokio::fs::write(&image_path, png).await?;

        tracing::debug!(
            external_id = %entry.external_id,
            path = %image_path.display(),
            size = png.len(),
            "Screenshot stored"
        );

        Ok(ReportCapture {
            image_url: self.url_for(&file_name),
            image_path,
            source_entry: entry.clone(),
        })
    }
}
