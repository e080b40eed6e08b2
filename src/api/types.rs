//! Shared state for the HTTP layer.

use std::sync::Arc;

use crate::core_state::CoreState;
use crate::pipeline::sync::SyncOrchestrator;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Author recorded on investigations when a request names none.
    pub system_author_id: Arc<str>,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, system_author_id: &str) -> Self {
        Self {
            orchestrator,
            system_author_id: Arc::from(system_author_id),
        }
    }

    pub fn from_core(core: &CoreState) -> Self {
        Self::new(core.orchestrator().clone(), &core.config().system_author_id)
    }

    /// `requested` when present and non-blank, else the system author.
    pub fn author_or_default(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(self.system_author_id.as_ref())
            .to_string()
    }
}
