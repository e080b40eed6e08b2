use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the portal's results grid.
///
/// `row_index` is the DOM position inside the scrape that produced the entry.
/// It means nothing to any other scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientListEntry {
    /// Accession / order number shown by the portal.
    pub external_id: String,
    /// Raw visit date text, exactly as rendered.
    pub visit_date: String,
    pub mrn: String,
    pub display_name: String,
    pub scraped_title: String,
    pub row_index: usize,
}

/// A full-list scrape and the moment it was taken.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub entries: Vec<PatientListEntry>,
    pub captured_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn new(entries: Vec<PatientListEntry>) -> Self {
        Self {
            entries,
            captured_at: Utc::now(),
        }
    }

    /// Entries belonging to one patient, in scrape order.
    pub fn entries_for_mrn(&self, mrn: &str) -> Vec<PatientListEntry> {
        let mrn = mrn.trim();
        self.entries
            .iter()
            .filter(|e| e.mrn.trim() == mrn)
            .cloned()
            .collect()
    }
}

/// A stored screenshot of one rendered report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportCapture {
    pub image_path: PathBuf,
    /// Path under which the HTTP surface serves the image.
    pub image_url: String,
    pub source_entry: PatientListEntry,
}
