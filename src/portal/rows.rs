//! Results-grid row parsing and row relocation across scrapes.
//!
//! A row's DOM position is only meaningful inside the scrape that produced
//! it. Anything that wants to act on a row found in an earlier scrape must
//! relocate it in the current one first.

use super::error::PortalError;
use super::types::GridColumns;
use crate::models::PatientListEntry;

/// Build an entry from one row's cell texts. Returns `None` for rows that are
/// too short or carry no identifying data.
pub fn parse_row(cells: &[String], columns: &GridColumns, row_index: usize) -> Option<PatientListEntry> {
    if cells.len() < columns.min_columns {
        return None;
    }

    let cell = |idx: usize| cells.get(idx).map(|c| normalize_cell(c)).unwrap_or_default();

    let entry = PatientListEntry {
        external_id: cell(columns.external_id),
        visit_date: cell(columns.visit_date),
        mrn: cell(columns.mrn),
        display_name: cell(columns.display_name),
        scraped_title: cell(columns.title),
        row_index,
    };

    if entry.external_id.is_empty() && entry.mrn.is_empty() {
        return None;
    }
    Some(entry)
}

/// Collapse internal whitespace (portal cells wrap long names over lines).
fn normalize_cell(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find `target` (from an earlier scrape) inside `current`.
///
/// 1. Positional: the entry whose DOM position is `target.row_index` is
///    accepted only if it holds the same record (MRN, external id and scraped
///    title). Panels of one accession share an external id, so the title is
///    what tells neighbours apart.
/// 2. Full scan by external id within the same MRN, preferring a row with the
///    same scraped title.
/// 3. Full scan by (display name, visit date), never across two known MRNs.
pub fn relocate_entry<'a>(
    current: &'a [PatientListEntry],
    target: &PatientListEntry,
) -> Result<&'a PatientListEntry, PortalError> {
    // Skipped header and spacer rows leave gaps, so positions are not indexes.
    if let Some(candidate) = current.iter().find(|e| e.row_index == target.row_index) {
        if same_record(candidate, target) {
            return Ok(candidate);
        }
        tracing::debug!(
            row_index = target.row_index,
            expected_mrn = %target.mrn,
            found_mrn = %candidate.mrn,
            "Row position is stale, scanning full grid"
        );
    }

    let external_id = target.external_id.trim();
    if !external_id.is_empty() {
        let mut by_id = current
            .iter()
            .filter(|e| e.external_id.trim() == external_id && e.mrn.trim() == target.mrn.trim());
        let first = by_id.next();
        if let Some(first) = first {
            if first.scraped_title == target.scraped_title {
                return Ok(first);
            }
            let titled = by_id.find(|e| e.scraped_title == target.scraped_title);
            return Ok(titled.unwrap_or(first));
        }
    }

    current
        .iter()
        .find(|e| {
            !target.display_name.is_empty()
                && e.display_name.eq_ignore_ascii_case(&target.display_name)
                && e.visit_date == target.visit_date
                && mrn_compatible(&e.mrn, &target.mrn)
        })
        .ok_or_else(|| PortalError::RecordNotFound {
            external_id: target.external_id.clone(),
            mrn: target.mrn.clone(),
        })
}

fn same_record(candidate: &PatientListEntry, target: &PatientListEntry) -> bool {
    candidate.mrn.trim() == target.mrn.trim()
        && candidate.external_id.trim() == target.external_id.trim()
        && candidate.scraped_title == target.scraped_title
}

/// Two MRNs conflict only when both rows actually show one.
fn mrn_compatible(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a.is_empty() || b.is_empty() || a == b
}
