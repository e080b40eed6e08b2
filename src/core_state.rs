//! Application state: configuration plus the wired service graph.
//!
//! `CoreState` is built once at startup from `SyncConfig` and shared via
//! `Arc`. It owns the background scheduler and HTTP server handles so that
//! `shutdown()` can stop both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{self, ApiContext, ApiServerInfo, SyncApiServer};
use crate::config::SyncConfig;
use crate::db::{self, SqliteClinicalStore};
use crate::pipeline::capture::ReportCaptureService;
use crate::pipeline::diagnostic::DiagnosticDump;
use crate::pipeline::extraction::{
    ExtractionError, OllamaVisionClient, StructuredExtractionService, VisionClient,
};
use crate::pipeline::list_cache::PatientListCache;
use crate::pipeline::persistence::DeduplicationPersistence;
use crate::pipeline::screenshots::ScreenshotStore;
use crate::pipeline::sync::{start_sync_scheduler, SyncOrchestrator, SyncSchedulerHandle};
use crate::portal::{PortalDriver, WebDriverPortal};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: SyncConfig,
    store: Arc<SqliteClinicalStore>,
    orchestrator: Arc<SyncOrchestrator>,
    screenshots_dir: PathBuf,
    /// Periodic sweep task. Uses tokio Mutex for async.
    scheduler: tokio::sync::Mutex<Option<SyncSchedulerHandle>>,
    /// HTTP server handle. Uses tokio Mutex for async.
    api_server: tokio::sync::Mutex<Option<SyncApiServer>>,
}

impl CoreState {
    /// Wire the production services: WebDriver portal, Ollama vision client,
    /// SQLite store under `config.data_dir`.
    pub fn build(config: SyncConfig) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(SqliteClinicalStore::open(&config.database_path())?);

        let diagnostics = DiagnosticDump::new(config.dump_dir.clone());
        let driver: Arc<dyn PortalDriver> =
            Arc::new(WebDriverPortal::new(config.portal.clone(), diagnostics));
        let vision: Arc<dyn VisionClient> =
            Arc::new(OllamaVisionClient::new(&config.ollama_url, config.vision_timeout)?);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            portal = %config.portal.base_url,
            model = %config.vision_model,
            "Services wired"
        );
        Ok(Self::assemble(config, driver, vision, store))
    }

    /// Wire the pipeline over the given collaborators.
    pub fn assemble(
        config: SyncConfig,
        driver: Arc<dyn PortalDriver>,
        vision: Arc<dyn VisionClient>,
        store: Arc<SqliteClinicalStore>,
    ) -> Self {
        let diagnostics = DiagnosticDump::new(config.dump_dir.clone());
        let screenshots = ScreenshotStore::new(&config.data_dir);
        let screenshots_dir = screenshots.root().to_path_buf();

        let cache = Arc::new(PatientListCache::new(
            driver.clone(),
            config.credentials.clone(),
            diagnostics.clone(),
            config.cache_ttl,
        ));
        let capture = ReportCaptureService::new(
            driver,
            config.credentials.clone(),
            screenshots,
            diagnostics.clone(),
        );
        let extraction =
            StructuredExtractionService::new(vision, config.vision_model.clone(), diagnostics);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            cache,
            capture,
            extraction,
            DeduplicationPersistence::new(store.clone()),
            store.clone(),
            config.sync_settings(),
        ));

        Self {
            config,
            store,
            orchestrator,
            screenshots_dir,
            scheduler: tokio::sync::Mutex::new(None),
            api_server: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SqliteClinicalStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn screenshots_dir(&self) -> &Path {
        &self.screenshots_dir
    }

    // ── Background services ─────────────────────────────────

    /// Start the periodic sweep unless disabled. Returns whether it runs.
    pub async fn start_scheduler(&self) -> bool {
        if !self.config.scheduler_enabled {
            tracing::info!("Sync scheduler disabled by configuration");
            return false;
        }
        let mut slot = self.scheduler.lock().await;
        if slot.is_none() {
            *slot = Some(start_sync_scheduler(
                self.orchestrator.clone(),
                self.config.sync_interval,
                self.config.system_author_id.clone(),
            ));
        }
        true
    }

    /// Bind the HTTP API on `config.api_addr`.
    pub async fn start_api(&self) -> Result<ApiServerInfo, CoreError> {
        let mut slot = self.api_server.lock().await;
        if let Some(server) = slot.as_ref() {
            return Ok(server.info.clone());
        }

        let router = api::sync_api_router(ApiContext::from_core(self), &self.screenshots_dir);
        let server = api::start_api_server(router, self.config.api_addr).await?;
        let info = server.info.clone();
        *slot = Some(server);
        Ok(info)
    }

    /// Stop the HTTP server, then the scheduler. A running sweep finishes.
    pub async fn shutdown(&self) {
        if let Some(server) = self.api_server.lock().await.take() {
            server.stop().await;
        }
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
        tracing::info!("Shutdown complete");
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Vision client error: {0}")]
    Vision(#[from] ExtractionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
