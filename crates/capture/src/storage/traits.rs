//! Storage trait definitions

use crate::models::{AuthCache, ChangeRecord, Item};
use anyhow::Result;

/// Persistence for the last good snapshot and the change log
///
/// Only the last successful snapshot and an append-only, capped change log
/// are kept; there are no stronger durability guarantees.
pub trait SnapshotStore: Send + Sync {
    /// Load the items of the last successful capture (empty if none)
    fn load_last_parse(&self) -> Result<Vec<Item>>;

    /// Replace the stored snapshot wholesale
    fn save_last_parse(&self, items: &[Item]) -> Result<()>;

    /// Append a change record, keeping only the `limit` most recent entries
    fn append_change_log(&self, record: &ChangeRecord, limit: usize) -> Result<()>;

    /// Most recent change records, newest first
    fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>>;

    /// Clear the snapshot and change log (for testing)
    fn clear(&self) -> Result<()>;
}

/// Persistence for cached API credentials
///
/// The cache may be cleared by someone else at any time (e.g. a "sign out"
/// button in the host); readers must treat `None` as "log in again".
pub trait AuthStore: Send + Sync {
    fn load(&self) -> Result<Option<AuthCache>>;

    fn save(&self, cache: &AuthCache) -> Result<()>;

    fn clear(&self) -> Result<()>;
}
