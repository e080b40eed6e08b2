//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::pipeline::sync::ActiveSweep;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Sweep holding the lock, if any.
    pub sweep: Option<ActiveSweep>,
    pub cache_ttl_secs: u64,
}

/// `GET /api/health`
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        sweep: ctx.orchestrator.sweep_lock().current(),
        cache_ttl_secs: ctx.orchestrator.cache().ttl().as_secs(),
    })
}
