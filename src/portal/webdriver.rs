//! WebDriver-backed portal automation (`fantoccini`).
//!
//! One `WebDriverSession` maps to one WebDriver browser session. Every wait
//! is bounded by `PortalTimeouts`: element and grid waits fail the operation,
//! settling waits only log.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use tokio::time::Instant;

use super::error::PortalError;
use super::login::{run_login_fallbacks, LoginStrategy};
use super::rows::parse_row;
use super::traits::{PortalDriver, PortalSession};
use super::types::{PortalCredentials, PortalSettings};
use crate::models::PatientListEntry;
use crate::pipeline::diagnostic::DiagnosticDump;

// ──────────────────────────────────────────────
// Constants
// ──────────────────────────────────────────────

const DEFAULT_WIDTH: u32 = 1366;
const DEFAULT_HEIGHT: u32 = 900;

/// Cap for full-page resizing. Very long reports are clipped, not rejected.
const MAX_CAPTURE_DIMENSION: u64 = 16_000;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a click gets to open a new window before we assume in-place render.
const NEW_WINDOW_GRACE: Duration = Duration::from_secs(3);

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{E007}";

/// Sets an input's value through the native setter and dispatches the events
/// the portal's form framework listens for.
const SET_VALUE_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
if (desc && desc.set) { desc.set.call(el, arguments[1]); } else { el.value = arguments[1]; }
el.focus();
for (const type of ['input', 'change', 'blur']) {
  el.dispatchEvent(new Event(type, { bubbles: true }));
}
return true;
"#;

const FORCE_CLICK_SCRIPT: &str = r#"
const btn = document.querySelector(arguments[0]);
if (!btn) { return false; }
btn.disabled = false;
btn.removeAttribute('disabled');
btn.click();
return true;
"#;

const SUBMIT_FORM_SCRIPT: &str = r#"
const pw = document.querySelector(arguments[1]);
const form = (pw && pw.form) || document.querySelector(arguments[0]);
if (!form) { return false; }
HTMLFormElement.prototype.submit.call(form);
return true;
"#;

const SETTLE_PROBE_SCRIPT: &str = r#"
return {
  ready: document.readyState === 'complete',
  resources: performance.getEntriesByType('resource').length
};
"#;

const PAGE_SIZE_SCRIPT: &str = r#"
const d = document.documentElement;
const b = document.body || d;
return [Math.max(d.scrollWidth, b.scrollWidth), Math.max(d.scrollHeight, b.scrollHeight)];
"#;

// ──────────────────────────────────────────────
// WebDriverPortal
// ──────────────────────────────────────────────

/// Production `PortalDriver`. Each `login` opens a new browser session.
pub struct WebDriverPortal {
    settings: PortalSettings,
    diagnostics: DiagnosticDump,
}

impl WebDriverPortal {
    pub fn new(settings: PortalSettings, diagnostics: DiagnosticDump) -> Self {
        Self {
            settings,
            diagnostics,
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut chrome_args = vec![
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            format!("--window-size={DEFAULT_WIDTH},{DEFAULT_HEIGHT}"),
        ];
        let mut firefox_args: Vec<String> = Vec::new();
        if self.settings.headless {
            chrome_args.push("--headless=new".into());
            firefox_args.push("-headless".into());
        }

        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".into(), json!({ "args": chrome_args }));
        caps.insert("moz:firefoxOptions".into(), json!({ "args": firefox_args }));
        caps
    }
}

#[async_trait]
impl PortalDriver for WebDriverPortal {
    async fn login(
        &self,
        credentials: &PortalCredentials,
    ) -> Result<Box<dyn PortalSession>, PortalError> {
        let started = Instant::now();
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());
        let client = builder.connect(&self.settings.webdriver_url).await?;

        let mut session = WebDriverSession {
            client,
            settings: self.settings.clone(),
            scraped: false,
        };

        if let Err(e) = session.authenticate(credentials).await {
            if let Some(png) = session.diagnostic_screenshot().await {
                self.diagnostics.record_binary("portal-login", "login-failure.png", &png);
            }
            if let Err(close_err) = session.client.close().await {
                tracing::warn!(error = %close_err, "Failed to close WebDriver session after login failure");
            }
            return Err(e);
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Portal session authenticated"
        );
        Ok(Box::new(session))
    }
}

// ──────────────────────────────────────────────
// WebDriverSession
// ──────────────────────────────────────────────

pub struct WebDriverSession {
    client: Client,
    settings: PortalSettings,
    /// Whether the grid has been scraped once; later scrapes reload the page.
    scraped: bool,
}

impl WebDriverSession {
    async fn authenticate(&self, credentials: &PortalCredentials) -> Result<(), PortalError> {
        let selectors = &self.settings.selectors;
        let timeouts = self.settings.timeouts;

        self.client.goto(&self.settings.base_url).await?;
        self.select_category(credentials.category.as_deref()).await?;

        self.client
            .wait()
            .at_most(timeouts.element)
            .for_element(Locator::Css(&selectors.username_field))
            .await
            .map_err(|e| {
                PortalError::AuthenticationFailure(format!("login form did not appear: {e}"))
            })?;

        let strategy = run_login_fallbacks(|s| self.attempt_login(s, credentials)).await?;
        tracing::debug!(strategy = %strategy, "Login strategy accepted");
        Ok(())
    }

    async fn select_category(&self, category: Option<&str>) -> Result<(), PortalError> {
        let selectors = &self.settings.selectors;
        let timeout = self.settings.timeouts.element;

        let Some(trigger) = selectors.category_trigger.as_deref() else {
            return Ok(());
        };
        let trigger = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(trigger))
            .await
            .map_err(|e| {
                PortalError::AuthenticationFailure(format!("category selector not found: {e}"))
            })?;
        trigger.click().await?;

        let Some(option_selector) = selectors.category_option.as_deref() else {
            return Ok(());
        };
        self.client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(option_selector))
            .await
            .map_err(|e| {
                PortalError::AuthenticationFailure(format!("category options not shown: {e}"))
            })?;

        let options = self.client.find_all(Locator::Css(option_selector)).await?;
        let mut chosen = None;
        for option in options {
            let matches = match category {
                None => true,
                Some(wanted) => option
                    .text()
                    .await
                    .map(|t| t.trim().eq_ignore_ascii_case(wanted.trim()))
                    .unwrap_or(false),
            };
            if matches {
                chosen = Some(option);
                break;
            }
        }

        let option = chosen.ok_or_else(|| {
            PortalError::AuthenticationFailure(format!(
                "login category {:?} is not offered",
                category.unwrap_or_default()
            ))
        })?;
        option.click().await?;
        Ok(())
    }

    async fn attempt_login(
        &self,
        strategy: LoginStrategy,
        credentials: &PortalCredentials,
    ) -> Result<bool, PortalError> {
        let selectors = &self.settings.selectors;

        // A failed strategy may have reloaded the form empty.
        if self.probe(&selectors.password_field).await == Some(true) {
            self.set_input_value(&selectors.username_field, &credentials.username)
                .await?;
            self.set_input_value(&selectors.password_field, &credentials.password)
                .await?;
        }

        match strategy {
            LoginStrategy::PressEnter => {
                let field = self
                    .client
                    .find(Locator::Css(&selectors.password_field))
                    .await?;
                field.send_keys(ENTER_KEY).await?;
            }
            LoginStrategy::ForceClickSubmit => {
                let clicked = self
                    .client
                    .execute(FORCE_CLICK_SCRIPT, vec![json!(selectors.submit_button)])
                    .await?;
                if clicked.as_bool() != Some(true) {
                    return Err(PortalError::Session("submit control not found".into()));
                }
            }
            LoginStrategy::SubmitForm => {
                let submitted = self
                    .client
                    .execute(
                        SUBMIT_FORM_SCRIPT,
                        vec![json!(selectors.login_form), json!(selectors.password_field)],
                    )
                    .await?;
                if submitted.as_bool() != Some(true) {
                    return Err(PortalError::Session("login form not found".into()));
                }
            }
        }

        Ok(self.wait_logged_in(self.settings.timeouts.login_settle).await)
    }

    async fn set_input_value(&self, selector: &str, value: &str) -> Result<(), PortalError> {
        let found = self
            .client
            .execute(SET_VALUE_SCRIPT, vec![json!(selector), json!(value)])
            .await?;
        if found.as_bool() != Some(true) {
            return Err(PortalError::AuthenticationFailure(format!(
                "input {selector} not found"
            )));
        }
        Ok(())
    }

    /// Logged in = results grid visible, or the password field is gone.
    async fn wait_logged_in(&self, timeout: Duration) -> bool {
        let selectors = &self.settings.selectors;
        let deadline = Instant::now() + timeout;
        loop {
            if self.probe(&selectors.results_grid).await == Some(true)
                || self.probe(&selectors.password_field).await == Some(false)
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Presence probe. `None` when the page could not be queried (mid-navigation).
    async fn probe(&self, selector: &str) -> Option<bool> {
        match self.client.find_all(Locator::Css(selector)).await {
            Ok(found) => Some(!found.is_empty()),
            Err(e) => {
                tracing::trace!(selector, error = %e, "Presence probe failed");
                None
            }
        }
    }

    async fn detect_new_window(
        &self,
        before: &[WindowHandle],
    ) -> Result<Option<WindowHandle>, PortalError> {
        let deadline = Instant::now() + NEW_WINDOW_GRACE;
        loop {
            let now_open = self.client.windows().await?;
            if let Some(handle) = now_open.into_iter().find(|h| !before.contains(h)) {
                return Ok(Some(handle));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Soft wait: document complete and resource count stable across polls.
    async fn wait_for_settle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut last_resources: Option<u64> = None;
        loop {
            match self.client.execute(SETTLE_PROBE_SCRIPT, vec![]).await {
                Ok(probe) => {
                    let ready = probe["ready"].as_bool().unwrap_or(false);
                    let resources = probe["resources"].as_u64();
                    if ready && resources.is_some() && resources == last_resources {
                        return;
                    }
                    last_resources = resources;
                }
                Err(e) => tracing::trace!(error = %e, "Settle probe failed"),
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Report page did not settle, capturing anyway"
                );
                return;
            }
            tokio::time::sleep(POLL_INTERVAL * 2).await;
        }
    }

    async fn full_page_screenshot(&self) -> Result<Vec<u8>, PortalError> {
        let size = self.client.execute(PAGE_SIZE_SCRIPT, vec![]).await?;
        let width = size[0]
            .as_u64()
            .unwrap_or(DEFAULT_WIDTH as u64)
            .clamp(DEFAULT_WIDTH as u64, MAX_CAPTURE_DIMENSION) as u32;
        let height = size[1]
            .as_u64()
            .unwrap_or(DEFAULT_HEIGHT as u64)
            .clamp(DEFAULT_HEIGHT as u64, MAX_CAPTURE_DIMENSION) as u32;

        if let Err(e) = self.client.set_window_size(width, height).await {
            tracing::debug!(error = %e, "Window resize refused, capturing viewport only");
        }
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| PortalError::CaptureFailure(format!("screenshot failed: {e}")));
        if let Err(e) = self.client.set_window_size(DEFAULT_WIDTH, DEFAULT_HEIGHT).await {
            tracing::debug!(error = %e, "Window size restore failed");
        }
        png
    }

    async fn return_to_grid(&self, origin: WindowHandle, opened_new: bool) -> Result<(), PortalError> {
        if opened_new {
            self.client.close_window().await?;
            self.client.switch_to_window(origin).await?;
        } else {
            self.client.back().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PortalSession for WebDriverSession {
    async fn list_records(&mut self) -> Result<Vec<PatientListEntry>, PortalError> {
        let selectors = &self.settings.selectors;

        if self.scraped {
            self.client.refresh().await?;
        }

        let grid = self
            .client
            .wait()
            .at_most(self.settings.timeouts.grid)
            .for_element(Locator::Css(&selectors.results_grid))
            .await
            .map_err(|e| PortalError::Session(format!("results grid did not appear: {e}")))?;

        let rows = grid.find_all(Locator::Css(&selectors.grid_row)).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let cells = row.find_all(Locator::Css(&selectors.grid_cell)).await?;
            let mut texts = Vec::with_capacity(cells.len());
            for cell in &cells {
                texts.push(cell.text().await?);
            }
            match parse_row(&texts, &self.settings.columns, row_index) {
                Some(entry) => entries.push(entry),
                None => tracing::trace!(row_index, cells = texts.len(), "Skipping grid row"),
            }
        }

        self.scraped = true;
        tracing::debug!(rows = rows.len(), entries = entries.len(), "Results grid scraped");
        Ok(entries)
    }

    async fn capture_record(&mut self, row_index: usize) -> Result<Vec<u8>, PortalError> {
        let selectors = &self.settings.selectors;

        let grid = self
            .client
            .wait()
            .at_most(self.settings.timeouts.grid)
            .for_element(Locator::Css(&selectors.results_grid))
            .await
            .map_err(|e| PortalError::Session(format!("results grid did not appear: {e}")))?;
        let rows = grid.find_all(Locator::Css(&selectors.grid_row)).await?;
        let row = rows.get(row_index).ok_or_else(|| {
            PortalError::CaptureFailure(format!("row {row_index} is no longer in the grid"))
        })?;
        let action = row
            .find(Locator::Css(&selectors.view_action))
            .await
            .map_err(|e| {
                PortalError::CaptureFailure(format!("row {row_index} has no view control: {e}"))
            })?;

        let origin = self.client.window().await?;
        let before = self.client.windows().await?;
        action
            .click()
            .await
            .map_err(|e| PortalError::CaptureFailure(format!("view click failed: {e}")))?;

        let opened = self.detect_new_window(&before).await?;
        if let Some(handle) = &opened {
            tracing::debug!(row_index, "Report opened in a new window");
            self.client.switch_to_window(handle.clone()).await?;
        } else {
            tracing::debug!(row_index, "Report rendered in place");
        }

        self.wait_for_settle(self.settings.timeouts.report_settle).await;
        let png = self.full_page_screenshot().await;

        if let Err(e) = self.return_to_grid(origin, opened.is_some()).await {
            tracing::warn!(row_index, error = %e, "Could not return to results grid");
        }
        png
    }

    async fn diagnostic_screenshot(&mut self) -> Option<Vec<u8>> {
        match self.client.screenshot().await {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::debug!(error = %e, "Diagnostic screenshot unavailable");
                None
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), PortalError> {
        let WebDriverSession { client, .. } = *self;
        client.close().await?;
        Ok(())
    }
}
