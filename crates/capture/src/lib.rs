//! Capture crate - Business logic for catalogue stock watching
//!
//! This crate provides platform-independent capture functionality including:
//! - Domain models (Item, IdentityKey, ChangeRecord, AuthCache)
//! - Catalogue API client, token lifecycle and record normalization
//! - Snapshot diffing (new, removed, price and stock changes)
//! - Storage trait abstractions with in-memory and SQLite backends
//! - The periodic capture worker, its scheduler, retry policy and state machine
//!
//! This crate has zero UI dependencies. Hosts plug in through
//! [`CaptureHost`].

pub mod catalog;
pub mod config;
pub mod diff;
pub mod host;
pub mod models;
pub mod storage;
pub mod sync;

pub use catalog::{
    AuthStatus, Authenticator, FetchClient, FetchError, HttpFetchClient, HttpTokenRefresher,
    ItemParser, JsonItemParser, ParseError, TokenRefresher,
};
pub use config::{CaptureConfig, CaptureFilter, ConfigSource, FileConfigSource, auth_from_env};
pub use diff::{DiffResult, compute_diffs};
pub use host::{CancellationToken, CaptureHost};
pub use models::{
    AnnotatedItem, AuthCache, ChangeEntry, ChangeKind, ChangeRecord, IdentityKey, Item,
    ItemBuilder,
};
pub use storage::{
    AuthStore, FileAuthStore, InMemoryAuthStore, InMemorySnapshotStore, SnapshotStore,
    SqliteSnapshotStore,
};
pub use sync::{
    CaptureError, CapturePayload, CaptureState, CaptureStateMachine, CaptureWorker,
    CycleOutcome, IntervalScheduler, RetryPolicy,
};
