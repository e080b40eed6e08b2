use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The single service account the sync pipeline logs in with.
#[derive(Clone, Deserialize)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
    /// Login category (e.g. "Laboratory") picked in the pre-login modal.
    pub category: Option<String>,
}

impl std::fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("category", &self.category)
            .finish()
    }
}

/// CSS selectors for the portal's login page and results grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    /// Opens the category modal. Absent when the portal shows the form directly.
    pub category_trigger: Option<String>,
    /// Options inside the category modal.
    pub category_option: Option<String>,
    pub username_field: String,
    pub password_field: String,
    pub submit_button: String,
    pub login_form: String,
    pub results_grid: String,
    /// Row selector, relative to the grid.
    pub grid_row: String,
    /// Cell selector, relative to a row.
    pub grid_cell: String,
    /// "View report" control, relative to a row.
    pub view_action: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            category_trigger: Some("[data-toggle='modal'][data-target='#loginCategory']".into()),
            category_option: Some("#loginCategory .category-option".into()),
            username_field: "input[name='username']".into(),
            password_field: "input[type='password']".into(),
            submit_button: "button[type='submit']".into(),
            login_form: "form".into(),
            results_grid: "table.results-grid".into(),
            grid_row: "tbody tr".into(),
            grid_cell: "td".into(),
            view_action: "a.view-report, button.view-report".into(),
        }
    }
}

/// Column positions inside a results grid row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridColumns {
    pub external_id: usize,
    pub visit_date: usize,
    pub mrn: usize,
    pub display_name: usize,
    pub title: usize,
    /// Rows with fewer cells are headers, spacers or group labels.
    pub min_columns: usize,
}

impl Default for GridColumns {
    fn default() -> Self {
        Self {
            external_id: 0,
            visit_date: 1,
            mrn: 2,
            display_name: 3,
            title: 4,
            min_columns: 5,
        }
    }
}

/// Bounds on every wait the driver performs.
#[derive(Debug, Clone, Copy)]
pub struct PortalTimeouts {
    /// Hard wait for login fields, modal options and the view control.
    pub element: Duration,
    /// Hard wait for the results grid.
    pub grid: Duration,
    /// Soft wait after each login strategy.
    pub login_settle: Duration,
    /// Soft wait for a report page to finish loading.
    pub report_settle: Duration,
}

impl Default for PortalTimeouts {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(15),
            grid: Duration::from_secs(30),
            login_settle: Duration::from_secs(8),
            report_settle: Duration::from_secs(20),
        }
    }
}

/// Everything needed to reach and drive the portal.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub base_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub selectors: PortalSelectors,
    pub columns: GridColumns,
    pub timeouts: PortalTimeouts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = PortalCredentials {
            username: "svc-labsync".into(),
            password: "hunter2".into(),
            category: None,
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("svc-labsync"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn default_columns_fit_minimum() {
        let cols = GridColumns::default();
        let highest = [cols.external_id, cols.visit_date, cols.mrn, cols.display_name, cols.title]
            .into_iter()
            .max()
            .unwrap();
        assert!(highest < cols.min_columns);
    }
}
