//! Scripted in-memory portal for tests and offline runs.
//!
//! The grid is a plain list of entries; `row_index` is assigned from list
//! position on every scrape, exactly like a DOM walk would. Leading header
//! rows that a real scrape skips can be simulated, which shifts every DOM
//! position. Scripted scrapes let a test change the grid between page loads.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::error::PortalError;
use super::traits::{PortalDriver, PortalSession};
use super::types::PortalCredentials;
use crate::models::PatientListEntry;

#[derive(Default)]
struct MockState {
    grid: Vec<PatientListEntry>,
    /// Grids served by the next scrapes, one per scrape. Then `grid` repeats.
    scripted: VecDeque<Vec<PatientListEntry>>,
    failing_captures: HashSet<String>,
    fail_login: bool,
    scrape_delay: Duration,
    /// Non-data rows above the grid; they occupy DOM positions but never parse.
    header_rows: usize,
    captured: Vec<String>,
}

#[derive(Default)]
struct MockInner {
    state: Mutex<MockState>,
    logins: AtomicUsize,
    scrapes: AtomicUsize,
    open_sessions: AtomicUsize,
}

/// Mock portal driver. Clones share state, so a test can keep a handle
/// for assertions after handing one to the pipeline.
#[derive(Clone, Default)]
pub struct MockPortal {
    inner: Arc<MockInner>,
}

impl MockPortal {
    pub fn new(grid: Vec<PatientListEntry>) -> Self {
        let portal = Self::default();
        portal.set_grid(grid);
        portal
    }

    /// Serve `scrapes` in order to the next scrapes, then keep the last one.
    pub fn with_scrapes(self, scrapes: Vec<Vec<PatientListEntry>>) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(last) = scrapes.last() {
                state.grid = last.clone();
            }
            state.scripted = scrapes.into();
        }
        self
    }

    pub fn fail_capture_for(self, external_id: &str) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.failing_captures.insert(external_id.to_string());
        }
        self
    }

    pub fn failing_login(self) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.fail_login = true;
        }
        self
    }

    /// Render `rows` unparseable header rows above the data rows.
    pub fn with_header_rows(self, rows: usize) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.header_rows = rows;
        }
        self
    }

    pub fn with_scrape_delay(self, delay: Duration) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.scrape_delay = delay;
        }
        self
    }

    /// Replace the grid for all following scrapes.
    pub fn set_grid(&self, grid: Vec<PatientListEntry>) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.grid = grid;
            state.scripted.clear();
        }
    }

    pub fn login_count(&self) -> usize {
        self.inner.logins.load(Ordering::SeqCst)
    }

    pub fn scrape_count(&self) -> usize {
        self.inner.scrapes.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// External ids of every successful capture, in order.
    pub fn captured_ids(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .map(|s| s.captured.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PortalDriver for MockPortal {
    async fn login(
        &self,
        _credentials: &PortalCredentials,
    ) -> Result<Box<dyn PortalSession>, PortalError> {
        self.inner.logins.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .inner
            .state
            .lock()
            .map(|s| s.fail_login)
            .unwrap_or(false);
        if fail {
            return Err(PortalError::AuthenticationFailure(
                "all login strategies exhausted".into(),
            ));
        }

        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            inner: self.inner.clone(),
            last_scrape: Vec::new(),
        }))
    }
}

pub struct MockSession {
    inner: Arc<MockInner>,
    last_scrape: Vec<PatientListEntry>,
}

#[async_trait]
impl PortalSession for MockSession {
    async fn list_records(&mut self) -> Result<Vec<PatientListEntry>, PortalError> {
        self.inner.scrapes.fetch_add(1, Ordering::SeqCst);

        let (grid, delay, header_rows) = {
            let mut state = self
                .inner
                .state
                .lock()
                .map_err(|_| PortalError::Session("mock state poisoned".into()))?;
            if let Some(next) = state.scripted.pop_front() {
                state.grid = next;
            }
            (state.grid.clone(), state.scrape_delay, state.header_rows)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let entries: Vec<PatientListEntry> = grid
            .into_iter()
            .enumerate()
            .map(|(position, entry)| PatientListEntry {
                row_index: header_rows + position,
                ..entry
            })
            .collect();
        self.last_scrape = entries.clone();
        Ok(entries)
    }

    async fn capture_record(&mut self, row_index: usize) -> Result<Vec<u8>, PortalError> {
        let entry = self
            .last_scrape
            .iter()
            .find(|e| e.row_index == row_index)
            .ok_or_else(|| {
                PortalError::CaptureFailure(format!("row {row_index} is no longer in the grid"))
            })?;

        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| PortalError::Session("mock state poisoned".into()))?;
        if state.failing_captures.contains(&entry.external_id) {
            return Err(PortalError::CaptureFailure(format!(
                "report viewer crashed for {}",
                entry.external_id
            )));
        }
        state.captured.push(entry.external_id.clone());
        Ok(format!("PNG:{}:{}", entry.external_id, entry.scraped_title).into_bytes())
    }

    async fn diagnostic_screenshot(&mut self) -> Option<Vec<u8>> {
        Some(b"PNG:diagnostic".to_vec())
    }

    async fn close(self: Box<Self>) -> Result<(), PortalError> {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> PortalCredentials {
        PortalCredentials {
            username: "svc".into(),
            password: "pw".into(),
            category: None,
        }
    }

    fn entry(external_id: &str) -> PatientListEntry {
        PatientListEntry {
            external_id: external_id.into(),
            visit_date: "12-03-2026".into(),
            mrn: "139494".into(),
            display_name: "Amina Yusuf".into(),
            scraped_title: "CBC".into(),
            row_index: 99,
        }
    }

    #[tokio::test]
    async fn scrape_assigns_positions_and_counts() {
        let portal = MockPortal::new(vec![entry("A"), entry("B")]);
        let mut session = portal.login(&creds()).await.unwrap();
        let rows = session.list_records().await.unwrap();

        assert_eq!(rows[0].row_index, 0);
        assert_eq!(rows[1].row_index, 1);
        assert_eq!(portal.scrape_count(), 1);
        assert_eq!(portal.open_sessions(), 1);

        session.close().await.unwrap();
        assert_eq!(portal.open_sessions(), 0);
    }

    #[tokio::test]
    async fn scripted_scrapes_then_last_repeats() {
        let portal = MockPortal::default()
            .with_scrapes(vec![vec![entry("A")], vec![entry("N"), entry("A")]]);
        let mut session = portal.login(&creds()).await.unwrap();

        assert_eq!(session.list_records().await.unwrap().len(), 1);
        assert_eq!(session.list_records().await.unwrap().len(), 2);
        assert_eq!(session.list_records().await.unwrap().len(), 2);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn capture_uses_latest_scrape_positions() {
        let portal = MockPortal::new(vec![entry("A"), entry("B")]).fail_capture_for("B");
        let mut session = portal.login(&creds()).await.unwrap();
        session.list_records().await.unwrap();

        assert_eq!(session.capture_record(0).await.unwrap(), b"PNG:A:CBC".to_vec());
        assert!(matches!(
            session.capture_record(1).await,
            Err(PortalError::CaptureFailure(_))
        ));
        assert!(session.capture_record(7).await.is_err());
        assert_eq!(portal.captured_ids(), vec!["A".to_string()]);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn header_rows_shift_dom_positions() {
        let portal = MockPortal::new(vec![entry("A"), entry("B")]).with_header_rows(1);
        let mut session = portal.login(&creds()).await.unwrap();
        let rows = session.list_records().await.unwrap();

        assert_eq!(rows[0].row_index, 1);
        assert_eq!(rows[1].row_index, 2);
        assert!(session.capture_record(0).await.is_err());
        assert_eq!(session.capture_record(2).await.unwrap(), b"PNG:B:CBC".to_vec());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn failing_login_opens_no_session() {
        let portal = MockPortal::new(vec![]).failing_login();
        assert!(portal.login(&creds()).await.is_err());
        assert_eq!(portal.login_count(), 1);
        assert_eq!(portal.open_sessions(), 0);
    }
}
