//! Domain models for captured catalogue data

mod auth_cache;
mod change;
mod item;

pub use auth_cache::AuthCache;
pub use change::{AnnotatedItem, ChangeEntry, ChangeKind, ChangeRecord};
pub use item::{IdentityKey, Item, ItemBuilder};
