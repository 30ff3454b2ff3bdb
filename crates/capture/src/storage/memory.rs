//! In-memory storage implementations
//!
//! Used for tests and for hosts that don't want anything on disk.

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::RwLock;

use super::{AuthStore, SnapshotStore};
use crate::models::{AuthCache, ChangeRecord, Item};

/// In-memory implementation of SnapshotStore
///
/// Snapshot and change log are kept behind RwLocks for thread-safe access.
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Vec<Item>>,
    /// Oldest first
    change_log: RwLock<VecDeque<ChangeRecord>>,
}

impl InMemorySnapshotStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Vec::new()),
            change_log: RwLock::new(VecDeque::new()),
        }
    }

    /// Create a store pre-seeded with a snapshot
    pub fn with_snapshot(items: Vec<Item>) -> Self {
        let store = Self::new();
        *store.snapshot.write().unwrap() = items;
        store
    }

    /// Number of change records currently held
    pub fn change_log_len(&self) -> usize {
        self.change_log.read().unwrap().len()
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load_last_parse(&self) -> Result<Vec<Item>> {
        Ok(self.snapshot.read().unwrap().clone())
    }

    fn save_last_parse(&self, items: &[Item]) -> Result<()> {
        *self.snapshot.write().unwrap() = items.to_vec();
        Ok(())
    }

    fn append_change_log(&self, record: &ChangeRecord, limit: usize) -> Result<()> {
        let mut log = self.change_log.write().unwrap();
        log.push_back(record.clone());
        while log.len() > limit {
            log.pop_front();
        }
        Ok(())
    }

    fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let log = self.change_log.read().unwrap();
        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.snapshot.write().unwrap().clear();
        self.change_log.write().unwrap().clear();
        Ok(())
    }
}

/// In-memory implementation of AuthStore
#[derive(Default)]
pub struct InMemoryAuthStore {
    cache: RwLock<Option<AuthCache>>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: AuthCache) -> Self {
        Self {
            cache: RwLock::new(Some(cache)),
        }
    }
}

impl AuthStore for InMemoryAuthStore {
    fn load(&self) -> Result<Option<AuthCache>> {
        Ok(self.cache.read().unwrap().clone())
    }

    fn save(&self, cache: &AuthCache) -> Result<()> {
        *self.cache.write().unwrap() = Some(cache.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.cache.write().unwrap() = None;
        Ok(())
    }
}
