//! Storage traits and implementations
//!
//! This module defines the persistence collaborators of the capture worker.
//! The trait-based design allows swapping between in-memory and on-disk
//! implementations.

mod auth_file;
mod memory;
mod sqlite;
mod traits;

pub use auth_file::{AUTH_CACHE_FILE, FileAuthStore};
pub use memory::{InMemoryAuthStore, InMemorySnapshotStore};
pub use sqlite::SqliteSnapshotStore;
pub use traits::{AuthStore, SnapshotStore};
