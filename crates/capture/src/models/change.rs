//! Change annotations produced by the diff, and the change-log record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{IdentityKey, Item};

/// Working copy of an item carrying derived diff annotations
///
/// The wrapped `item` is a copy of the canonical snapshot record; the
/// snapshot itself is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedItem {
    pub item: Item,
    pub key: IdentityKey,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_removed: bool,
    #[serde(default)]
    pub is_restock: bool,
    /// current price - prior price, only present when it changed
    #[serde(default)]
    pub price_delta: Option<f64>,
    #[serde(default)]
    pub price_before: Option<f64>,
    #[serde(default)]
    pub stock_delta: Option<f64>,
    #[serde(default)]
    pub stock_before: Option<String>,
    #[serde(default)]
    pub stock_after: Option<String>,
}

impl AnnotatedItem {
    /// Wrap an item with no annotations
    pub fn new(item: Item, key: IdentityKey) -> Self {
        Self {
            item,
            key,
            is_new: false,
            is_removed: false,
            is_restock: false,
            price_delta: None,
            price_before: None,
            stock_delta: None,
            stock_before: None,
            stock_after: None,
        }
    }
}

/// What kind of change a log entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Removed,
    PriceUp,
    PriceDown,
    Restock,
    OutOfStock,
    Stock,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "new",
            ChangeKind::Removed => "removed",
            ChangeKind::PriceUp => "price_up",
            ChangeKind::PriceDown => "price_down",
            ChangeKind::Restock => "restock",
            ChangeKind::OutOfStock => "out_of_stock",
            ChangeKind::Stock => "stock",
        }
    }
}

/// One item-level line in a change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub key: IdentityKey,
    pub label: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub price_delta: Option<f64>,
    #[serde(default)]
    pub stock_delta: Option<f64>,
    #[serde(default)]
    pub stock_before: Option<String>,
    #[serde(default)]
    pub stock_after: Option<String>,
}

impl ChangeEntry {
    pub fn from_annotated(kind: ChangeKind, annotated: &AnnotatedItem) -> Self {
        Self {
            kind,
            key: annotated.key.clone(),
            label: annotated.item.display_label(),
            price: annotated.item.price,
            price_delta: annotated.price_delta,
            stock_delta: annotated.stock_delta,
            stock_before: annotated.stock_before.clone(),
            stock_after: annotated.stock_after.clone(),
        }
    }
}

/// Append-only change log entry, one per capture that changed something
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub recorded_at: DateTime<Utc>,
    pub item_count: usize,
    pub new_count: usize,
    pub removed_count: usize,
    pub price_up: usize,
    pub price_down: usize,
    pub stock_change_count: usize,
    pub entries: Vec<ChangeEntry>,
}

impl ChangeRecord {
    /// Whether the record carries any item-level change
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
