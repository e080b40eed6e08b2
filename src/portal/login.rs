//! Login fallback sequencing.
//!
//! The portal's submit button is frequently rendered disabled and its inputs
//! ignore synthetic keystrokes, so a single "click submit" is not enough.
//! Strategies are tried in a fixed order until one lands on the results page.

use std::future::Future;

use serde::Serialize;

use super::error::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStrategy {
    /// Focus the password field and send Enter.
    PressEnter,
    /// Remove `disabled` from the submit control and click it.
    ForceClickSubmit,
    /// Call `submit()` on the form element.
    SubmitForm,
}

impl LoginStrategy {
    pub const ORDER: [LoginStrategy; 3] = [
        LoginStrategy::PressEnter,
        LoginStrategy::ForceClickSubmit,
        LoginStrategy::SubmitForm,
    ];
}

impl std::fmt::Display for LoginStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PressEnter => write!(f, "press Enter"),
            Self::ForceClickSubmit => write!(f, "force-click submit"),
            Self::SubmitForm => write!(f, "submit form"),
        }
    }
}

/// Run `attempt` for each strategy in order.
///
/// `attempt` returns `Ok(true)` when the session is logged in afterwards.
/// A strategy that errors is logged and the next one is tried.
pub async fn run_login_fallbacks<F, Fut>(mut attempt: F) -> Result<LoginStrategy, PortalError>
where
    F: FnMut(LoginStrategy) -> Fut,
    Fut: Future<Output = Result<bool, PortalError>>,
{
    let mut last_error: Option<String> = None;

    for strategy in LoginStrategy::ORDER {
        match attempt(strategy).await {
            Ok(true) => {
                tracing::info!(strategy = %strategy, "Portal login succeeded");
                return Ok(strategy);
            }
            Ok(false) => {
                tracing::debug!(strategy = %strategy, "Login strategy did not leave the login page");
            }
            Err(e) => {
                tracing::warn!(strategy = %strategy, error = %e, "Login strategy failed");
                last_error = Some(e.to_string());
            }
        }
    }

    Err(PortalError::AuthenticationFailure(match last_error {
        Some(e) => format!("all login strategies exhausted (last error: {e})"),
        None => "all login strategies exhausted".into(),
    }))
}
