use fantoccini::error::{CmdError, NewSessionError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    /// Every login strategy was tried and none reached the results page.
    #[error("Portal authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Timeout or transport fault inside an authenticated session.
    #[error("Portal session error: {0}")]
    Session(String),

    #[error("Record {external_id} (MRN {mrn}) not found on re-scrape")]
    RecordNotFound { external_id: String, mrn: String },

    #[error("Report capture failed: {0}")]
    CaptureFailure(String),
}

impl PortalError {
    /// Errors that invalidate the whole session rather than one record.
    pub fn is_session_scoped(&self) -> bool {
        matches!(self, Self::AuthenticationFailure(_) | Self::Session(_))
    }
}

impl From<CmdError> for PortalError {
    fn from(err: CmdError) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<NewSessionError> for PortalError {
    fn from(err: NewSessionError) -> Self {
        Self::Session(format!("WebDriver session could not be created: {err}"))
    }
}
