//! Snapshot diffing
//!
//! Pure comparison of two item snapshots. Items are matched by
//! [`IdentityKey`], so a repriced product is a price change rather than a
//! removal plus an addition.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{AnnotatedItem, ChangeEntry, ChangeKind, ChangeRecord, IdentityKey, Item};

/// Price differences at or below this are noise from float parsing
pub const PRICE_EPSILON: f64 = 1e-9;

/// Stock deltas below this snap to exactly zero
pub const STOCK_EPSILON: f64 = 1e-6;

/// Classified changes between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub new_items: Vec<AnnotatedItem>,
    /// Copies of previous items tagged `is_removed`
    pub removed_items: Vec<AnnotatedItem>,
    pub price_changes: Vec<AnnotatedItem>,
    /// Generic stock changes (neither restock nor sell-out)
    pub stock_changes: Vec<AnnotatedItem>,
    pub restock_changes: Vec<AnnotatedItem>,
    pub out_of_stock_changes: Vec<AnnotatedItem>,
    pub price_up: usize,
    pub price_down: usize,
    /// Restocks + sell-outs + generic stock changes
    pub stock_change_count: usize,
    /// Keys of the current snapshot, in item order
    pub current_keys: Vec<IdentityKey>,
    /// Keys of the previous snapshot, in item order
    pub prev_keys: Vec<IdentityKey>,
}

impl DiffResult {
    /// Whether anything changed at all
    pub fn has_changes(&self) -> bool {
        !self.new_items.is_empty()
            || !self.removed_items.is_empty()
            || !self.price_changes.is_empty()
            || self.stock_change_count > 0
    }

    /// Build the change-log record for this diff
    pub fn to_change_record(&self, item_count: usize) -> ChangeRecord {
        let mut entries = Vec::new();
        entries.extend(
            self.new_items
                .iter()
                .map(|a| ChangeEntry::from_annotated(ChangeKind::New, a)),
        );
        entries.extend(
            self.removed_items
                .iter()
                .map(|a| ChangeEntry::from_annotated(ChangeKind::Removed, a)),
        );
        entries.extend(self.price_changes.iter().map(|a| {
            let kind = if a.price_delta.unwrap_or(0.0) > 0.0 {
                ChangeKind::PriceUp
            } else {
                ChangeKind::PriceDown
            };
            ChangeEntry::from_annotated(kind, a)
        }));
        entries.extend(
            self.restock_changes
                .iter()
                .map(|a| ChangeEntry::from_annotated(ChangeKind::Restock, a)),
        );
        entries.extend(
            self.out_of_stock_changes
                .iter()
                .map(|a| ChangeEntry::from_annotated(ChangeKind::OutOfStock, a)),
        );
        entries.extend(
            self.stock_changes
                .iter()
                .map(|a| ChangeEntry::from_annotated(ChangeKind::Stock, a)),
        );

        ChangeRecord {
            recorded_at: chrono::Utc::now(),
            item_count,
            new_count: self.new_items.len(),
            removed_count: self.removed_items.len(),
            price_up: self.price_up,
            price_down: self.price_down,
            stock_change_count: self.stock_change_count,
            entries,
        }
    }

    /// One-line summary for logs ("3 new, 1 removed, 2 price (1↑ 1↓), 4 stock")
    pub fn summary(&self) -> String {
        format!(
            "{} new, {} removed, {} price ({}↑ {}↓), {} stock ({} restocked, {} sold out)",
            self.new_items.len(),
            self.removed_items.len(),
            self.price_changes.len(),
            self.price_up,
            self.price_down,
            self.stock_change_count,
            self.restock_changes.len(),
            self.out_of_stock_changes.len(),
        )
    }
}

/// Stock bucket for a matched item
enum StockChange {
    Restock,
    OutOfStock,
    Other,
}

/// Compare `current` against `previous`
///
/// Identity keys are computed once per item per call. When a snapshot holds
/// duplicate keys, the first occurrence is the one matched against.
pub fn compute_diffs(current: &[Item], previous: &[Item]) -> DiffResult {
    let current_keys: Vec<IdentityKey> = current.iter().map(Item::identity_key).collect();
    let prev_keys: Vec<IdentityKey> = previous.iter().map(Item::identity_key).collect();

    let mut prev_by_key: HashMap<&IdentityKey, &Item> = HashMap::with_capacity(previous.len());
    for (key, item) in prev_keys.iter().zip(previous) {
        prev_by_key.entry(key).or_insert(item);
    }
    let current_key_set: HashSet<&IdentityKey> = current_keys.iter().collect();

    let mut result = DiffResult::default();

    for (key, item) in current_keys.iter().zip(current) {
        let Some(prior) = prev_by_key.get(key).copied() else {
            let mut annotated = AnnotatedItem::new(item.clone(), key.clone());
            annotated.is_new = true;
            result.new_items.push(annotated);
            continue;
        };

        // One working copy per matched item carries every annotation
        let mut annotated = AnnotatedItem::new(item.clone(), key.clone());
        let mut price_moved = false;

        // Price: only when both sides are numeric and the change is real
        if let (Some(now), Some(before)) = (item.price, prior.price) {
            let delta = now - before;
            if delta.abs() > PRICE_EPSILON {
                if delta > 0.0 {
                    result.price_up += 1;
                } else {
                    result.price_down += 1;
                }
                annotated.price_delta = Some(delta);
                annotated.price_before = Some(before);
                price_moved = true;
            }
        }

        let bucket = classify_stock(prior, item);
        if bucket.is_some() {
            annotated.stock_before = prior.stock_label();
            annotated.stock_after = item.stock_label();
            annotated.stock_delta = numeric_stock_delta(prior, item);
        }
        match bucket {
            Some(StockChange::Restock) => {
                annotated.is_restock = true;
                annotated.stock_delta.get_or_insert(1.0);
            }
            Some(StockChange::OutOfStock) => {
                annotated.stock_delta.get_or_insert(-1.0);
            }
            Some(StockChange::Other) | None => {}
        }

        if price_moved {
            result.price_changes.push(annotated.clone());
        }
        let Some(bucket) = bucket else {
            continue;
        };
        match bucket {
            StockChange::Restock => result.restock_changes.push(annotated),
            StockChange::OutOfStock => result.out_of_stock_changes.push(annotated),
            StockChange::Other => result.stock_changes.push(annotated),
        }
        result.stock_change_count += 1;
    }

    for (key, item) in prev_keys.iter().zip(previous) {
        if !current_key_set.contains(key) {
            let mut annotated = AnnotatedItem::new(item.clone(), key.clone());
            annotated.is_removed = true;
            result.removed_items.push(annotated);
        }
    }

    result.current_keys = current_keys;
    result.prev_keys = prev_keys;
    result
}

/// Classify the stock transition of a matched item
///
/// Priority order matters: an item lands in exactly one bucket.
fn classify_stock(prior: &Item, current: &Item) -> Option<StockChange> {
    let was_out = prior.is_out_of_stock();
    let was_in = prior.is_in_stock();
    let now_out = current.is_out_of_stock();
    let now_in = current.is_in_stock();

    if was_out && now_in {
        return Some(StockChange::Restock);
    }
    if was_in && now_out {
        return Some(StockChange::OutOfStock);
    }
    if stock_differs(prior, current) {
        return Some(StockChange::Other);
    }
    None
}

fn stock_differs(prior: &Item, current: &Item) -> bool {
    let status = |i: &Item| i.stock_status.as_deref().map(str::trim).map(str::to_string);
    if status(prior) != status(current) {
        return true;
    }
    match (prior.stock_remaining, current.stock_remaining) {
        (Some(a), Some(b)) => (b - a).abs() >= STOCK_EPSILON,
        (None, None) => false,
        _ => true,
    }
}

/// `current - prior` remaining units, snapped to 0.0 under [`STOCK_EPSILON`]
fn numeric_stock_delta(prior: &Item, current: &Item) -> Option<f64> {
    let delta = current.stock_remaining? - prior.stock_remaining?;
    Some(if delta.abs() < STOCK_EPSILON { 0.0 } else { delta })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: f64, remaining: f64) -> Item {
        Item::builder(name)
            .brand("Acme")
            .product_type("Flower")
            .thc(20.0)
            .size_grams(10.0)
            .price(price)
            .stock_remaining(remaining)
            .build()
    }

    fn keys(items: &[AnnotatedItem]) -> Vec<&str> {
        items.iter().map(|a| a.item.name.as_str()).collect()
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let items = vec![product("A", 10.0, 5.0), product("B", 20.0, 0.0)];
        let diff = compute_diffs(&items, &items);

        assert!(diff.new_items.is_empty());
        assert!(diff.removed_items.is_empty());
        assert!(diff.price_changes.is_empty());
        assert!(diff.stock_changes.is_empty());
        assert!(diff.restock_changes.is_empty());
        assert!(diff.out_of_stock_changes.is_empty());
        assert_eq!(diff.price_up, 0);
        assert_eq!(diff.price_down, 0);
        assert_eq!(diff.stock_change_count, 0);
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_empty_previous_makes_everything_new() {
        let items = vec![product("A", 10.0, 5.0), product("B", 20.0, 1.0)];
        let diff = compute_diffs(&items, &[]);

        let new: Vec<Item> = diff.new_items.iter().map(|a| a.item.clone()).collect();
        assert_eq!(new, items);
        assert!(diff.new_items.iter().all(|a| a.is_new));
        assert!(diff.removed_items.is_empty());
        assert_eq!(diff.current_keys.len(), 2);
        assert!(diff.prev_keys.is_empty());
    }

    #[test]
    fn test_removed_items_are_tagged_copies() {
        let previous = vec![product("A", 10.0, 5.0), product("Gone", 30.0, 2.0)];
        let current = vec![product("A", 10.0, 5.0)];
        let diff = compute_diffs(&current, &previous);

        assert_eq!(keys(&diff.removed_items), vec!["Gone"]);
        assert!(diff.removed_items[0].is_removed);
        // The previous snapshot itself is untouched
        assert_eq!(previous[1].name, "Gone");
    }

    #[test]
    fn test_price_change_matches_same_product() {
        let previous = vec![product("A", 10.0, 5.0), product("B", 20.0, 5.0)];
        let current = vec![product("A", 12.5, 5.0), product("B", 18.0, 5.0)];
        let diff = compute_diffs(&current, &previous);

        assert!(diff.new_items.is_empty());
        assert!(diff.removed_items.is_empty());
        assert_eq!(diff.price_up, 1);
        assert_eq!(diff.price_down, 1);
        assert_eq!(diff.price_changes.len(), 2);
        assert_eq!(diff.price_changes[0].price_delta, Some(2.5));
        assert_eq!(diff.price_changes[0].price_before, Some(10.0));
        assert_eq!(diff.price_changes[1].price_delta, Some(-2.0));
    }

    #[test]
    fn test_tiny_price_change_ignored() {
        let previous = vec![product("A", 10.0, 5.0)];
        let current = vec![product("A", 10.0 + 1e-12, 5.0)];
        let diff = compute_diffs(&current, &previous);
        assert!(diff.price_changes.is_empty());
        assert_eq!(diff.price_up, 0);
    }

    #[test]
    fn test_missing_price_excluded_from_delta() {
        let mut no_price = product("A", 0.0, 5.0);
        no_price.price = None;
        let diff = compute_diffs(&[product("A", 10.0, 5.0)], &[no_price.clone()]);
        assert!(diff.price_changes.is_empty());

        let diff = compute_diffs(&[no_price], &[product("A", 10.0, 5.0)]);
        assert!(diff.price_changes.is_empty());
    }

    #[test]
    fn test_restock_not_counted_as_generic_change() {
        let previous = vec![product("A", 10.0, 0.0)];
        let current = vec![product("A", 10.0, 5.0)];
        let diff = compute_diffs(&current, &previous);

        assert_eq!(diff.restock_changes.len(), 1);
        let restock = &diff.restock_changes[0];
        assert!(restock.is_restock);
        assert_eq!(restock.stock_delta, Some(5.0));
        assert!(restock.stock_delta.unwrap() > 0.0);
        assert_eq!(restock.stock_before.as_deref(), Some("0"));
        assert_eq!(restock.stock_after.as_deref(), Some("5"));
        assert!(diff.stock_changes.is_empty());
        assert!(diff.out_of_stock_changes.is_empty());
        assert_eq!(diff.stock_change_count, 1);
    }

    #[test]
    fn test_text_only_restock_defaults_delta() {
        let previous = vec![Item::builder("A").stock_status("Out of stock").build()];
        let current = vec![Item::builder("A").stock_status("Low stock").build()];
        let diff = compute_diffs(&current, &previous);

        assert_eq!(diff.restock_changes.len(), 1);
        assert_eq!(diff.restock_changes[0].stock_delta, Some(1.0));
    }

    #[test]
    fn test_sell_out_defaults_delta() {
        let previous = vec![Item::builder("A").stock_status("In stock").build()];
        let current = vec![Item::builder("A").stock_status("OUT OF STOCK").build()];
        let diff = compute_diffs(&current, &previous);

        assert_eq!(diff.out_of_stock_changes.len(), 1);
        assert_eq!(diff.out_of_stock_changes[0].stock_delta, Some(-1.0));
        assert!(diff.restock_changes.is_empty());
        assert!(diff.stock_changes.is_empty());
    }

    #[test]
    fn test_numeric_sell_out_keeps_real_delta() {
        let diff = compute_diffs(&[product("A", 10.0, 0.0)], &[product("A", 10.0, 4.0)]);
        assert_eq!(diff.out_of_stock_changes.len(), 1);
        assert_eq!(diff.out_of_stock_changes[0].stock_delta, Some(-4.0));
    }

    #[test]
    fn test_generic_stock_change() {
        let diff = compute_diffs(&[product("A", 10.0, 3.0)], &[product("A", 10.0, 7.0)]);
        assert_eq!(diff.stock_changes.len(), 1);
        assert_eq!(diff.stock_changes[0].stock_delta, Some(-4.0));
        assert!(diff.restock_changes.is_empty());
        assert!(diff.out_of_stock_changes.is_empty());
    }

    #[test]
    fn test_status_text_change_is_generic() {
        let previous = vec![Item::builder("A").stock_status("In stock").build()];
        let current = vec![Item::builder("A").stock_status("Low stock").build()];
        let diff = compute_diffs(&current, &previous);
        assert_eq!(diff.stock_changes.len(), 1);
        assert_eq!(diff.stock_changes[0].stock_delta, None);
    }

    #[test]
    fn test_tiny_stock_delta_is_ignored() {
        let diff = compute_diffs(&[product("A", 10.0, 5.0 + 1e-9)], &[product("A", 10.0, 5.0)]);
        assert!(diff.stock_changes.is_empty());
        assert_eq!(diff.stock_change_count, 0);
    }

    #[test]
    fn test_stock_delta_snaps_to_zero() {
        // Status text changes, numeric remaining wobbles below the threshold
        let mut previous = product("A", 10.0, 5.0);
        previous.stock_status = Some("In stock".to_string());
        let mut current = product("A", 10.0, 5.0 + 1e-8);
        current.stock_status = Some("Limited".to_string());

        let diff = compute_diffs(&[current], &[previous]);
        assert_eq!(diff.stock_changes.len(), 1);
        let delta = diff.stock_changes[0].stock_delta.unwrap();
        assert_eq!(delta, 0.0);
        assert!(delta.is_sign_positive());
    }

    #[test]
    fn test_price_and_stock_change_together() {
        let diff = compute_diffs(&[product("A", 8.0, 0.0)], &[product("A", 10.0, 2.0)]);
        assert_eq!(diff.price_changes.len(), 1);
        assert_eq!(diff.out_of_stock_changes.len(), 1);
        assert!(diff.has_changes());

        let sold_out = &diff.out_of_stock_changes[0];
        assert_eq!(sold_out.price_delta, Some(-2.0));
        assert_eq!(sold_out, &diff.price_changes[0]);
    }

    #[test]
    fn test_restock_with_price_change_shares_annotations() {
        let diff = compute_diffs(&[product("A", 12.0, 5.0)], &[product("A", 10.0, 0.0)]);
        assert_eq!(diff.restock_changes.len(), 1);
        assert_eq!(diff.price_changes.len(), 1);

        let restock = &diff.restock_changes[0];
        assert_eq!(restock.price_delta, Some(2.0));
        assert_eq!(restock.price_before, Some(10.0));

        let price = &diff.price_changes[0];
        assert!(price.is_restock);
        assert_eq!(price.stock_delta, Some(5.0));
        assert_eq!(price, restock);
    }

    #[test]
    fn test_price_only_change_has_no_stock_annotations() {
        let diff = compute_diffs(&[product("A", 12.0, 5.0)], &[product("A", 10.0, 5.0)]);
        let price = &diff.price_changes[0];
        assert!(!price.is_restock);
        assert_eq!(price.stock_delta, None);
        assert_eq!(price.stock_before, None);
        assert_eq!(diff.stock_change_count, 0);
    }

    #[test]
    fn test_duplicate_keys_match_first_previous() {
        let previous = vec![product("A", 10.0, 5.0), product("A", 99.0, 5.0)];
        let current = vec![product("A", 10.0, 5.0)];
        let diff = compute_diffs(&current, &previous);
        assert!(diff.price_changes.is_empty());
        assert!(diff.removed_items.is_empty());
    }

    #[test]
    fn test_change_record_entries() {
        let previous = vec![product("A", 10.0, 0.0), product("Gone", 5.0, 1.0)];
        let current = vec![product("A", 12.0, 3.0), product("Fresh", 7.0, 2.0)];
        let diff = compute_diffs(&current, &previous);
        let record = diff.to_change_record(current.len());

        assert_eq!(record.item_count, 2);
        assert_eq!(record.new_count, 1);
        assert_eq!(record.removed_count, 1);
        assert_eq!(record.price_up, 1);
        let kinds: Vec<ChangeKind> = record.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::New,
                ChangeKind::Removed,
                ChangeKind::PriceUp,
                ChangeKind::Restock
            ]
        );
        assert!(diff.summary().starts_with("1 new, 1 removed, 1 price"));
    }
}
