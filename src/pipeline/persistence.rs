//! Deduplicating persistence of extracted result items.
//!
//! Identity of a stored investigation is `(patient_id, external_id,
//! effective_title)`. The existence check and the insert are separate
//! statements; the unique index on that triple turns a lost race into
//! `AlreadyExists`, which is reported here as a skipped duplicate.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::db::{DatabaseError, InvestigationStore};
use crate::models::*;

/// AI titles that say nothing about the panel.
pub const GENERIC_TITLES: &[&str] = &["Lab Report", "Unknown Test"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Portal visit dates are printed day first.
const DAY_FIRST_SEPARATORS: &[char] = &['-', '/', '.'];

/// Title used for dedup: the AI title, unless it is a generic placeholder,
/// in which case the scraped grid title qualified by its row position.
pub fn effective_title(ai_title: &str, entry: &PatientListEntry) -> String {
    let title = ai_title.trim();
    let generic = title.is_empty() || GENERIC_TITLES.iter().any(|g| g.eq_ignore_ascii_case(title));
    if !generic {
        return title.to_string();
    }

    let scraped = entry.scraped_title.trim();
    let base = if scraped.is_empty() { GENERIC_TITLES[0] } else { scraped };
    format!("{base} (row {})", entry.row_index)
}

/// Parse a date as printed on a report or in the grid. ISO forms first, then
/// day-first `DD-MM-YYYY`, `DD/MM/YYYY`, `DD.MM.YYYY` with optional time.
/// Zone-less values are taken as UTC.
pub fn parse_clinical_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ISO_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }

    for sep in DAY_FIRST_SEPARATORS {
        for time in [" %H:%M:%S", " %H:%M"] {
            let fmt = format!("%d{sep}%m{sep}%Y{time}");
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, &fmt) {
                return Some(naive.and_utc());
            }
        }
        let fmt = format!("%d{sep}%m{sep}%Y");
        if let Ok(date) = NaiveDate::parse_from_str(raw, &fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// Extracted date, else visit date, else `now`.
pub fn resolve_conducted_at(
    item_date: Option<&str>,
    visit_date: &str,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    item_date
        .and_then(parse_clinical_date)
        .or_else(|| parse_clinical_date(visit_date))
        .unwrap_or_else(|| {
            tracing::debug!(visit_date, "No parseable report date, using current time");
            now
        })
}

pub struct DeduplicationPersistence {
    store: Arc<dyn InvestigationStore>,
}

impl DeduplicationPersistence {
    pub fn new(store: Arc<dyn InvestigationStore>) -> Self {
        Self { store }
    }

    /// Store `item` unless an investigation with the same identity exists.
    /// `Ok(None)` means skipped as duplicate.
    pub fn persist(
        &self,
        patient_id: &str,
        author_id: &str,
        item: &ExtractedResultItem,
        capture: &ReportCapture,
    ) -> Result<Option<PersistedInvestigation>, DatabaseError> {
        let entry = &capture.source_entry;
        let title = effective_title(&item.title, entry);

        if self
            .store
            .find_investigation(patient_id, &entry.external_id, &title)?
            .is_some()
        {
            tracing::debug!(
                external_id = %entry.external_id,
                title = %title,
                "Investigation already stored, skipping"
            );
            return Ok(None);
        }

        let request = NewInvestigation {
            patient_id: patient_id.to_string(),
            author_id: author_id.to_string(),
            kind: item.kind,
            category: item.category.clone(),
            title: title.clone(),
            status: InvestigationStatus::Completed,
            result: build_payload(item, capture),
            impression: None,
            conducted_at: resolve_conducted_at(item.date.as_deref(), &entry.visit_date, Utc::now()),
            external_id: entry.external_id.clone(),
        };

        match self.store.create_investigation(request) {
            Ok(created) => {
                tracing::info!(
                    external_id = %created.external_id,
                    title = %created.title,
                    kind = %created.kind,
                    "Investigation stored"
                );
                Ok(Some(created))
            }
            Err(DatabaseError::AlreadyExists { key, .. }) => {
                tracing::debug!(key = %key, "Concurrent sync stored this investigation first");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn build_payload(item: &ExtractedResultItem, capture: &ReportCapture) -> Value {
    json!({
        "results": Value::Object(item.results.clone()),
        "image": capture.image_url,
        "sync_source": SyncSource::AutoSync.as_str(),
        "external_id": capture.source_entry.external_id,
        "category": item.category,
        "scraped_title": capture.source_entry.scraped_title,
    })
}
