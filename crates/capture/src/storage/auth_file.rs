//! File-backed auth cache (~/.config/stockwatch/auth-cache.json)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::AuthStore;
use crate::models::AuthCache;

/// Auth cache filename in the stockwatch config directory
pub const AUTH_CACHE_FILE: &str = "auth-cache.json";

/// Stores the auth record as pretty JSON on disk
///
/// The file is re-read on every `load`, so a host that deletes it (sign out)
/// is picked up on the next capture cycle.
pub struct FileAuthStore {
    path: PathBuf,
}

impl FileAuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location in the config directory
    pub fn default_location() -> Result<Self> {
        let path = config::config_path(AUTH_CACHE_FILE)
            .context("Could not determine config directory")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuthStore for FileAuthStore {
    fn load(&self) -> Result<Option<AuthCache>> {
        config::load_json_file_opt(&self.path)
    }

    fn save(&self, cache: &AuthCache) -> Result<()> {
        config::save_json_file(&self.path, cache)
    }

    fn clear(&self) -> Result<()> {
        config::remove_file(&self.path)
    }
}
