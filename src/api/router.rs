//! HTTP router.
//!
//! JSON routes are nested under `/api/`. Stored report screenshots are served
//! as static files under `/screenshots/`.

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::pipeline::screenshots::SCREENSHOT_URL_PREFIX;

/// Build the sync API router.
///
/// `screenshot_root` is the directory the screenshot store writes into.
pub fn sync_api_router(ctx: ApiContext, screenshot_root: &Path) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/portal/patients", get(endpoints::patients::list))
        .route("/portal/import", post(endpoints::patients::import))
        .route("/portal/sync/patient", post(endpoints::sync::patient))
        .route("/portal/sync/all", post(endpoints::sync::all))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .nest_service(SCREENSHOT_URL_PREFIX, ServeDir::new(screenshot_root))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::pipeline::extraction::MockVisionClient;
    use crate::pipeline::screenshots::ScreenshotStore;
    use crate::pipeline::sync::test_support::{entry, harness, immediate, Harness, CBC};
    use crate::pipeline::sync::SweepKind;
    use crate::portal::MockPortal;

    fn setup(portal: MockPortal) -> (Harness, Router) {
        let h = harness(portal, MockVisionClient::new(CBC), immediate());
        let root = ScreenshotStore::new(h.data_dir.path()).root().to_path_buf();
        let app = sync_api_router(ApiContext::new(h.orchestrator.clone(), "system"), &root);
        (h, app)
    }

    fn cbc_portal() -> MockPortal {
        MockPortal::new(vec![entry("139494", "ACC-1", "CBC")])
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_response_shape() {
        let (_h, app) = setup(cbc_portal());
        let response = app.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
        assert!(json["sweep"].is_null());
        assert_eq!(json["cache_ttl_secs"], 300);
    }

    #[tokio::test]
    async fn patients_lists_cached_grid() {
        let (h, app) = setup(cbc_portal());

        let response = app.clone().oneshot(get_req("/api/portal/patients")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["patients"][0]["mrn"], "139494");

        app.clone().oneshot(get_req("/api/portal/patients")).await.unwrap();
        assert_eq!(h.portal.scrape_count(), 1);

        app.oneshot(get_req("/api/portal/patients?refresh=true")).await.unwrap();
        assert_eq!(h.portal.scrape_count(), 2);
    }

    #[tokio::test]
    async fn sync_patient_imports_then_dedups() {
        let (_h, app) = setup(cbc_portal());
        let body = r#"{"mrn": "139494", "patient_id": "p-1"}"#;

        let response = app.clone().oneshot(post_json("/api/portal/sync/patient", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["imported"], 1);
        assert_eq!(json["records"][0]["title"], "CBC");
        assert_eq!(json["records"][0]["author_id"], "system");

        let response = app.oneshot(post_json("/api/portal/sync/patient", body)).await.unwrap();
        assert_eq!(response_json(response).await["imported"], 0);
    }

    #[tokio::test]
    async fn sync_patient_uses_requested_author() {
        let (_h, app) = setup(cbc_portal());
        let body = r#"{"mrn": "139494", "patient_id": "p-1", "author_id": "dr-okafor"}"#;
        let response = app.oneshot(post_json("/api/portal/sync/patient", body)).await.unwrap();
        assert_eq!(response_json(response).await["records"][0]["author_id"], "dr-okafor");
    }

    #[tokio::test]
    async fn sync_patient_validates_fields() {
        let (_h, app) = setup(cbc_portal());

        let response = app
            .clone()
            .oneshot(post_json("/api/portal/sync/patient", r#"{"mrn": " ", "patient_id": "p-1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["error"]["code"], "BAD_REQUEST");

        let response = app
            .oneshot(post_json("/api/portal/sync/patient", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn portal_login_failure_is_bad_gateway() {
        let (_h, app) = setup(cbc_portal().failing_login());
        let response = app
            .oneshot(post_json("/api/portal/sync/patient", r#"{"mrn": "139494", "patient_id": "p-1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response_json(response).await["error"]["code"], "PORTAL_AUTH_FAILED");
    }

    #[tokio::test]
    async fn import_returns_items_and_serves_screenshot() {
        let (_h, app) = setup(cbc_portal());
        let body = serde_json::to_string(&entry("139494", "ACC-1", "CBC")).unwrap();

        let response = app.clone().oneshot(post_json("/api/portal/import", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["extracted_items"][0]["title"], "CBC");

        let url = json["image_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/screenshots/"));
        let response = app.oneshot(get_req(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        assert_eq!(&bytes[..], b"PNG:ACC-1:CBC");
    }

    #[tokio::test]
    async fn import_of_vanished_record_is_404() {
        let (_h, app) = setup(cbc_portal());
        let body = serde_json::to_string(&entry("555", "GONE-1", "CBC")).unwrap();
        let response = app.oneshot(post_json("/api/portal/import", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sync_all_is_accepted() {
        let (h, app) = setup(cbc_portal());
        let response = app.oneshot(post_json("/api/portal/sync/all", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response_json(response).await["started"], true);

        for _ in 0..200 {
            if !h.orchestrator.sweep_lock().is_busy() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn sync_all_without_body_is_accepted() {
        let (_h, app) = setup(cbc_portal());
        let req = Request::builder()
            .method("POST")
            .uri("/api/portal/sync/all")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn sync_all_while_running_is_not_started() {
        let (h, app) = setup(cbc_portal());
        let _running = h.orchestrator.sweep_lock().try_acquire(SweepKind::Scheduled).unwrap();

        let response = app.oneshot(post_json("/api/portal/sync/all", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["started"], false);
        assert_eq!(json["running"]["kind"], "scheduled");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let (_h, app) = setup(cbc_portal());
        let req = Request::builder()
            .uri("/api/health")
            .header("origin", "http://ward-station.local")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let (_h, app) = setup(cbc_portal());
        let response = app.oneshot(get_req("/api/nonexistent")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
