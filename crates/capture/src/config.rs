//! Capture configuration
//!
//! The configuration is read fresh at the start of every capture cycle, so
//! edits to `capture.json` take effect without restarting the worker.
//! Sources (in order of priority):
//! 1. JSON file in the stockwatch config directory
//! 2. Built-in defaults
//!
//! Credentials can additionally be seeded from environment variables.

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::AuthCache;

/// Config filename in the stockwatch config directory
pub const CONFIG_FILE: &str = "capture.json";

/// Server-side filters applied to the catalogue listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureFilter {
    /// Restrict to these product types (empty = all)
    pub product_types: Vec<String>,
    /// Free-text search passed to the listing endpoint
    pub search: Option<String>,
    pub include_out_of_stock: bool,
}

impl Default for CaptureFilter {
    fn default() -> Self {
        Self {
            product_types: Vec::new(),
            search: None,
            include_out_of_stock: true,
        }
    }
}

/// Per-cycle capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base delay between capture cycles
    pub interval_seconds: f64,
    /// Extra fetch attempts within one cycle after a transient failure
    pub retry_attempts: i64,
    /// Base wait between attempts; non-positive falls back to `post_nav_wait_seconds`
    pub retry_wait_seconds: f64,
    /// Cap on the backoff multiplier
    pub retry_backoff_max: f64,
    pub post_nav_wait_seconds: f64,
    /// Pause between page requests
    pub page_wait_seconds: f64,
    pub page_size: usize,
    pub quiet_hours_enabled: bool,
    /// Local "HH:MM", inclusive
    pub quiet_hours_start: String,
    /// Local "HH:MM", exclusive
    pub quiet_hours_end: String,
    pub quiet_hours_interval_seconds: f64,
    /// Most recent change-log records to keep
    pub change_log_limit: usize,
    /// Page opened for interactive sign-in
    pub login_url: Option<String>,
    /// Path on the API host for token refresh
    pub refresh_path: String,
    pub filter: CaptureFilter,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 600.0,
            retry_attempts: 2,
            retry_wait_seconds: 0.0,
            retry_backoff_max: 4.0,
            post_nav_wait_seconds: 5.0,
            page_wait_seconds: 0.5,
            page_size: 50,
            quiet_hours_enabled: false,
            quiet_hours_start: "22:00".to_string(),
            quiet_hours_end: "07:00".to_string(),
            quiet_hours_interval_seconds: 3600.0,
            change_log_limit: 500,
            login_url: None,
            refresh_path: "/auth/refresh".to_string(),
            filter: CaptureFilter::default(),
        }
    }
}

impl CaptureConfig {
    /// Get the default config file path (~/.config/stockwatch/capture.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    /// Page size actually used for pagination (never zero)
    pub fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

/// Provides the configuration snapshot for each cycle
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> CaptureConfig;
}

/// A fixed configuration, mostly for tests and one-shot runs
impl ConfigSource for CaptureConfig {
    fn current(&self) -> CaptureConfig {
        self.clone()
    }
}

/// Re-reads a JSON file on every call
///
/// A missing file yields defaults; an unreadable or invalid file keeps the
/// last configuration that loaded successfully.
pub struct FileConfigSource {
    path: PathBuf,
    last_good: Mutex<CaptureConfig>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(CaptureConfig::default()),
        }
    }

    /// Source backed by ~/.config/stockwatch/capture.json
    pub fn default_location() -> Result<Self> {
        let path = CaptureConfig::default_config_path()
            .context("Could not determine config directory")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn current(&self) -> CaptureConfig {
        let mut last_good = match self.last_good.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match config::load_json_file_opt::<CaptureConfig>(&self.path) {
            Ok(Some(cfg)) => {
                *last_good = cfg.clone();
                cfg
            }
            Ok(None) => CaptureConfig::default(),
            Err(e) => {
                warn!("Using previous capture config: {:#}", e);
                last_good.clone()
            }
        }
    }
}

/// Build an auth record from environment variables, if a token is set
///
/// Reads STOCKWATCH_TOKEN, STOCKWATCH_REFRESH_TOKEN, STOCKWATCH_RPC_HOST,
/// STOCKWATCH_PATIENT_ID, STOCKWATCH_PHARMACY_ID and STOCKWATCH_USER_AGENT.
pub fn auth_from_env() -> Option<AuthCache> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    let token = var("STOCKWATCH_TOKEN");
    let refresh_token = var("STOCKWATCH_REFRESH_TOKEN");
    if token.is_none() && refresh_token.is_none() {
        return None;
    }
    Some(AuthCache {
        token,
        refresh_token,
        rpc_host: var("STOCKWATCH_RPC_HOST"),
        patient_id: var("STOCKWATCH_PATIENT_ID"),
        pharmacy_id: var("STOCKWATCH_PHARMACY_ID"),
        user_agent: var("STOCKWATCH_USER_AGENT"),
    })
}
