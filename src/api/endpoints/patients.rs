//! Portal patient list and single-report import.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::PatientListEntry;
use crate::pipeline::sync::ImportedReport;

#[derive(Debug, Default, Deserialize)]
pub struct PatientsQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Serialize)]
pub struct PatientListResponse {
    pub count: usize,
    pub patients: Vec<PatientListEntry>,
}

/// `GET /api/portal/patients?refresh=bool`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(query): Query<PatientsQuery>,
) -> Result<Json<PatientListResponse>, ApiError> {
    let patients = ctx.orchestrator.list_patients(query.refresh).await?;
    Ok(Json(PatientListResponse {
        count: patients.len(),
        patients,
    }))
}

/// `POST /api/portal/import`: capture and extract one listed report.
/// Nothing is stored in the chart.
pub async fn import(
    State(ctx): State<ApiContext>,
    body: Result<Json<PatientListEntry>, JsonRejection>,
) -> Result<Json<ImportedReport>, ApiError> {
    let Json(entry) = body?;
    if entry.external_id.trim().is_empty() && entry.mrn.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "entry needs an external_id or an mrn".into(),
        ));
    }

    let imported = ctx.orchestrator.import_single_report(&entry).await?;
    Ok(Json(imported))
}
