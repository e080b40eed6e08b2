use async_trait::async_trait;

use super::error::PortalError;
use super::types::PortalCredentials;
use crate::models::PatientListEntry;

/// Opens authenticated portal sessions.
#[async_trait]
pub trait PortalDriver: Send + Sync {
    async fn login(
        &self,
        credentials: &PortalCredentials,
    ) -> Result<Box<dyn PortalSession>, PortalError>;
}

/// One authenticated browser session. Not shared between tasks.
#[async_trait]
pub trait PortalSession: Send {
    /// Scrape the results grid in render order.
    async fn list_records(&mut self) -> Result<Vec<PatientListEntry>, PortalError>;

    /// Open the report behind `row_index` of the latest scrape and return a
    /// full-page PNG. Leaves the session back on the results grid.
    async fn capture_record(&mut self, row_index: usize) -> Result<Vec<u8>, PortalError>;

    /// Best-effort screenshot of whatever is on screen.
    async fn diagnostic_screenshot(&mut self) -> Option<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<(), PortalError>;
}
