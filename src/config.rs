use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::extraction::DEFAULT_VISION_MODEL;
use crate::pipeline::list_cache::DEFAULT_CACHE_TTL;
use crate::pipeline::sync::{SyncSettings, DEFAULT_INTER_PATIENT_DELAY, DEFAULT_SYNC_INTERVAL};
use crate::portal::{GridColumns, PortalCredentials, PortalSelectors, PortalSettings, PortalTimeouts};

/// Application-level constants
pub const APP_NAME: &str = "LabSync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of every environment variable read by [`SyncConfig::from_env`].
pub const ENV_PREFIX: &str = "LABSYNC_";

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_SYSTEM_AUTHOR: &str = "system";
/// Vision calls on a CPU-only host can take minutes.
const DEFAULT_VISION_TIMEOUT: Duration = Duration::from_secs(300);

pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "labsync_lib=debug,labsync=debug,tower_http=info,info"
    } else {
        "labsync_lib=info,labsync=info,warn"
    }
}

/// Platform local data dir (e.g. ~/.local/share/LabSync), else ~/LabSync.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Cannot read portal layout file {}: {reason}", path.display())]
    Layout { path: PathBuf, reason: String },
}

/// Optional JSON override for portal selectors and grid columns.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PortalLayout {
    selectors: PortalSelectors,
    columns: GridColumns,
}

/// Everything the service needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub portal: PortalSettings,
    pub credentials: PortalCredentials,
    pub ollama_url: String,
    pub vision_model: String,
    pub vision_timeout: Duration,
    pub data_dir: PathBuf,
    /// Failure screenshots and raw model output. `None` disables dumps.
    pub dump_dir: Option<PathBuf>,
    pub api_addr: SocketAddr,
    pub sync_interval: Duration,
    pub inter_patient_delay: Duration,
    pub cache_ttl: Duration,
    pub system_author_id: String,
    pub scheduler_enabled: bool,
    pub keep_unreadable_reports: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve from any key → value source. Keys carry the `LABSYNC_` prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let layout = match env.get("PORTAL_LAYOUT") {
            Some(path) => load_layout(Path::new(&path))?,
            None => PortalLayout::default(),
        };

        let portal = PortalSettings {
            base_url: env.require("PORTAL_URL")?,
            webdriver_url: env.get("WEBDRIVER_URL").unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.into()),
            headless: env.parse_bool("HEADLESS", true)?,
            selectors: layout.selectors,
            columns: layout.columns,
            timeouts: PortalTimeouts::default(),
        };
        let credentials = PortalCredentials {
            username: env.require("PORTAL_USERNAME")?,
            password: env.require("PORTAL_PASSWORD")?,
            category: env.get("PORTAL_CATEGORY"),
        };

        let api_addr_raw = env.get("API_ADDR").unwrap_or_else(|| DEFAULT_API_ADDR.into());
        let api_addr = api_addr_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: env.key("API_ADDR"),
                value: api_addr_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            portal,
            credentials,
            ollama_url: env.get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.into()),
            vision_model: env.get("VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.into()),
            vision_timeout: env.parse_secs("VISION_TIMEOUT_SECS", DEFAULT_VISION_TIMEOUT)?,
            data_dir: env.get("DATA_DIR").map(PathBuf::from).unwrap_or_else(default_data_dir),
            dump_dir: env.get("DUMP_DIR").map(PathBuf::from),
            api_addr,
            sync_interval: Duration::from_secs(
                env.parse_u64("SYNC_INTERVAL_MINS", DEFAULT_SYNC_INTERVAL.as_secs() / 60)? * 60,
            ),
            inter_patient_delay: env.parse_secs("INTER_PATIENT_DELAY_SECS", DEFAULT_INTER_PATIENT_DELAY)?,
            cache_ttl: env.parse_secs("CACHE_TTL_SECS", DEFAULT_CACHE_TTL)?,
            system_author_id: env
                .get("SYSTEM_AUTHOR_ID")
                .unwrap_or_else(|| DEFAULT_SYSTEM_AUTHOR.into()),
            scheduler_enabled: env.parse_bool("SCHEDULER_ENABLED", true)?,
            keep_unreadable_reports: env.parse_bool("KEEP_UNREADABLE", false)?,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("labsync.db")
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            inter_patient_delay: self.inter_patient_delay,
            keep_unreadable_reports: self.keep_unreadable_reports,
        }
    }
}

fn load_layout(path: &Path) -> Result<PortalLayout, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Layout {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Layout {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ── Lookup helpers ──────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn key(&self, name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    /// Set and non-blank.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.key(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::Missing(self.key(name)))
    }

    fn parse_bool(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(self.invalid(name, v, "expected true or false")),
            },
        }
    }

    fn parse_u64(&self, name: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|e: std::num::ParseIntError| self.invalid(name, v.clone(), &e.to_string())),
        }
    }

    fn parse_secs(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_u64(name, default.as_secs()).map(Duration::from_secs)
    }

    fn invalid(&self, name: &str, value: String, reason: &str) -> ConfigError {
        ConfigError::Invalid {
            key: self.key(name),
            value,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("PORTAL_URL", "https://portal.example.test"),
        ("PORTAL_USERNAME", "svc-labsync"),
        ("PORTAL_PASSWORD", "secret"),
    ];

    #[test]
    fn defaults_fill_everything_optional() {
        let config = SyncConfig::from_lookup(lookup(REQUIRED)).unwrap();

        assert_eq!(config.portal.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert!(config.portal.headless);
        assert_eq!(config.vision_model, DEFAULT_VISION_MODEL);
        assert_eq!(config.sync_interval, Duration::from_secs(600));
        assert_eq!(config.inter_patient_delay, Duration::from_secs(5));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.system_author_id, "system");
        assert!(config.scheduler_enabled);
        assert!(config.dump_dir.is_none());
        assert!(config.credentials.category.is_none());
        assert!(config.data_dir.ends_with(APP_NAME));
    }

    #[test]
    fn missing_credentials_are_reported_by_full_key() {
        let err = SyncConfig::from_lookup(lookup(&[("PORTAL_URL", "https://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(key) if key == "LABSYNC_PORTAL_USERNAME"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("PORTAL_PASSWORD", "   ");
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[
            ("HEADLESS", "false"),
            ("SYNC_INTERVAL_MINS", "15"),
            ("INTER_PATIENT_DELAY_SECS", "0"),
            ("API_ADDR", "0.0.0.0:9000"),
            ("DUMP_DIR", "/tmp/labsync-dump"),
            ("PORTAL_CATEGORY", "Laboratory"),
            ("SCHEDULER_ENABLED", "no"),
        ]);
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();

        assert!(!config.portal.headless);
        assert_eq!(config.sync_interval, Duration::from_secs(900));
        assert_eq!(config.inter_patient_delay, Duration::ZERO);
        assert_eq!(config.api_addr.port(), 9000);
        assert_eq!(config.dump_dir.as_deref(), Some(Path::new("/tmp/labsync-dump")));
        assert_eq!(config.credentials.category.as_deref(), Some("Laboratory"));
        assert!(!config.scheduler_enabled);
    }

    #[test]
    fn malformed_numbers_and_flags_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CACHE_TTL_SECS", "five"));
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key, .. }) if key == "LABSYNC_CACHE_TTL_SECS"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("HEADLESS", "maybe"));
        assert!(SyncConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("API_ADDR", "localhost"));
        assert!(SyncConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn layout_file_overrides_selected_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("layout.json");
        std::fs::write(
            &path,
            r#"{"selectors": {"results_grid": "table.reports"}, "columns": {"mrn": 4, "title": 2}}"#,
        )
        .unwrap();

        let path_str = path.to_string_lossy().to_string();
        let mut pairs: Vec<(&str, &str)> = REQUIRED.to_vec();
        pairs.push(("PORTAL_LAYOUT", &path_str));
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.portal.selectors.results_grid, "table.reports");
        assert_eq!(config.portal.selectors.username_field, PortalSelectors::default().username_field);
        assert_eq!(config.portal.columns.mrn, 4);
        assert_eq!(config.portal.columns.external_id, GridColumns::default().external_id);
    }

    #[test]
    fn unreadable_layout_file_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORTAL_LAYOUT", "/nonexistent/layout.json"));
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Layout { .. })
        ));
    }

    #[test]
    fn database_lives_in_data_dir() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DATA_DIR", "/var/lib/labsync"));
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/labsync/labsync.db"));
    }

    #[test]
    fn app_name_is_labsync() {
        assert_eq!(APP_NAME, "LabSync");
    }
}
