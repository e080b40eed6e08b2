use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{InvestigationStatus, ResultKind};

/// Ordered parameter name → value mapping (insertion order is report order).
pub type ResultValues = serde_json::Map<String, serde_json::Value>;

/// One test panel read off a report image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedResultItem {
    pub kind: ResultKind,
    pub category: String,
    pub title: String,
    /// ISO-8601 when the model managed it, otherwise whatever the report printed.
    pub date: Option<String>,
    pub results: ResultValues,
}

impl ExtractedResultItem {
    /// Stand-in item for callers that choose to keep an unreadable capture.
    pub fn placeholder(reason: &str) -> Self {
        let mut results = ResultValues::new();
        results.insert("note".into(), serde_json::Value::String(reason.to_string()));
        Self {
            kind: ResultKind::Lab,
            category: "Unclassified".into(),
            title: "Lab Report".into(),
            date: None,
            results,
        }
    }

    /// Case-insensitive lookup of a parameter name.
    pub fn has_parameter(&self, name: &str) -> bool {
        self.results
            .keys()
            .any(|k| k.trim().eq_ignore_ascii_case(name))
    }
}

/// Patient with an open admission, as reported by the clinical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmittedPatient {
    pub id: String,
    pub mrn: Option<String>,
    pub name: String,
}

/// Create-investigation request accepted by the clinical record.
#[derive(Debug, Clone, Serialize)]
pub struct NewInvestigation {
    pub patient_id: String,
    pub author_id: String,
    pub kind: ResultKind,
    pub category: String,
    pub title: String,
    pub status: InvestigationStatus,
    pub result: serde_json::Value,
    pub impression: Option<String>,
    pub conducted_at: DateTime<Utc>,
    pub external_id: String,
}

/// A stored investigation. `title` is the effective title used for dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedInvestigation {
    pub id: Uuid,
    pub patient_id: String,
    pub external_id: String,
    pub title: String,
    pub kind: ResultKind,
    pub category: String,
    pub status: InvestigationStatus,
    pub result_payload: serde_json::Value,
    pub impression: Option<String>,
    pub conducted_at: DateTime<Utc>,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}
