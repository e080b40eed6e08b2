//! Sync triggers.
//!
//! `POST /api/portal/sync/patient` runs one patient to completion.
//! `POST /api/portal/sync/all` only starts a sweep and answers right away.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::PersistedInvestigation;
use crate::pipeline::sync::SweepAck;

#[derive(Debug, Deserialize)]
pub struct SyncPatientRequest {
    pub mrn: String,
    pub patient_id: String,
    #[serde(default)]
    pub author_id: Option<String>,
}

#[derive(Serialize)]
pub struct SyncPatientResponse {
    pub imported: usize,
    pub records: Vec<PersistedInvestigation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncAllRequest {
    #[serde(default)]
    pub author_id: Option<String>,
}

/// `POST /api/portal/sync/patient`
pub async fn patient(
    State(ctx): State<ApiContext>,
    body: Result<Json<SyncPatientRequest>, JsonRejection>,
) -> Result<Json<SyncPatientResponse>, ApiError> {
    let Json(request) = body?;
    let mrn = request.mrn.trim();
    let patient_id = request.patient_id.trim();
    if mrn.is_empty() || patient_id.is_empty() {
        return Err(ApiError::BadRequest("mrn and patient_id are required".into()));
    }

    let author_id = ctx.author_or_default(request.author_id.as_deref());
    let records = ctx
        .orchestrator
        .sync_patient(mrn, patient_id, &author_id)
        .await?;

    Ok(Json(SyncPatientResponse {
        imported: records.len(),
        records,
    }))
}

/// `POST /api/portal/sync/all`: 202 when a sweep was started, 200 with
/// `started: false` when one is already running. The body is optional.
pub async fn all(
    State(ctx): State<ApiContext>,
    body: Option<Json<SyncAllRequest>>,
) -> (StatusCode, Json<SweepAck>) {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let author_id = ctx.author_or_default(request.author_id.as_deref());

    let ack = ctx.orchestrator.sync_all(&author_id);
    let status = if ack.started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    (status, Json(ack))
}
