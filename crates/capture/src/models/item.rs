//! Product record model and its price-independent identity key

use serde::{Deserialize, Serialize};

/// Deterministic key that recognizes "the same product" across captures
///
/// Built from a fixed, ordered subset of item fields that excludes price and
/// stock, so a product keeps its key when it is repriced or sells out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A product fetched from the pharmacy catalogue
///
/// Canonical snapshot record. Every field other than `name` is optional; a
/// missing price is excluded from price-delta math rather than read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Catalogue identifier, when the source exposes one
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Display name of the product
    pub name: String,
    #[serde(default)]
    pub strain: Option<String>,
    /// Product form (e.g. "flower", "oil")
    #[serde(default)]
    pub product_type: Option<String>,
    /// THC potency (percent or mg/ml, as reported)
    #[serde(default)]
    pub thc: Option<f64>,
    /// CBD potency (percent or mg/ml, as reported)
    #[serde(default)]
    pub cbd: Option<f64>,
    /// Pack size in grams (or ml for liquids)
    #[serde(default)]
    pub size_grams: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Free-text availability ("IN STOCK", "LOW STOCK", "OUT OF STOCK", ...)
    #[serde(default)]
    pub stock_status: Option<String>,
    /// Units remaining, when the source reports a number
    #[serde(default)]
    pub stock_remaining: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Item {
    /// Create a new item builder
    pub fn builder(name: impl Into<String>) -> ItemBuilder {
        ItemBuilder::new(name)
    }

    /// Compute the identity key for this item
    ///
    /// Field order: product_id, brand, name, strain, product_type, thc, cbd,
    /// size_grams. Text is trimmed and lower-cased, floats use three decimal
    /// places, and missing values contribute an empty segment.
    pub fn identity_key(&self) -> IdentityKey {
        let parts = [
            norm_text(self.product_id.as_deref()),
            norm_text(self.brand.as_deref()),
            norm_text(Some(&self.name)),
            norm_text(self.strain.as_deref()),
            norm_text(self.product_type.as_deref()),
            norm_float(self.thc),
            norm_float(self.cbd),
            norm_float(self.size_grams),
        ];
        IdentityKey(parts.join("|"))
    }

    /// Whether the item reads as unavailable
    pub fn is_out_of_stock(&self) -> bool {
        self.stock_remaining.is_some_and(|r| r <= 0.0) || self.status_contains(&["OUT"])
    }

    /// Whether the item reads as available
    pub fn is_in_stock(&self) -> bool {
        self.stock_remaining.is_some_and(|r| r > 0.0)
            || self.status_contains(&["IN", "LOW", "REMAINING"])
    }

    /// Human-readable stock description, used for before/after annotations
    pub fn stock_label(&self) -> Option<String> {
        let status = self
            .stock_status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match (status, self.stock_remaining) {
            (Some(s), Some(r)) => Some(format!("{} ({})", s, format_number(r))),
            (Some(s), None) => Some(s.to_string()),
            (None, Some(r)) => Some(format_number(r)),
            (None, None) => None,
        }
    }

    /// Short label for logs and notifications ("Brand Name 10g")
    pub fn display_label(&self) -> String {
        let mut label = String::new();
        if let Some(brand) = self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            label.push_str(brand);
            label.push(' ');
        }
        label.push_str(self.name.trim());
        if let Some(size) = self.size_grams {
            label.push_str(&format!(" {}g", format_number(size)));
        }
        label
    }

    fn status_contains(&self, needles: &[&str]) -> bool {
        self.stock_status.as_deref().is_some_and(|s| {
            let upper = s.to_uppercase();
            needles.iter().any(|n| upper.contains(n))
        })
    }
}

fn norm_text(value: Option<&str>) -> String {
    value.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

fn norm_float(value: Option<f64>) -> String {
    match value {
        // Adding 0.0 folds -0.0 into 0.0 so both format identically
        Some(v) if v.is_finite() => format!("{:.3}", v + 0.0),
        _ => String::new(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Builder for creating Item instances
pub struct ItemBuilder {
    item: Item,
}

impl ItemBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            item: Item {
                name: name.into(),
                ..Item::default()
            },
        }
    }

    pub fn product_id(mut self, id: impl Into<String>) -> Self {
        self.item.product_id = Some(id.into());
        self
    }

    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.item.brand = Some(brand.into());
        self
    }

    pub fn strain(mut self, strain: impl Into<String>) -> Self {
        self.item.strain = Some(strain.into());
        self
    }

    pub fn product_type(mut self, product_type: impl Into<String>) -> Self {
        self.item.product_type = Some(product_type.into());
        self
    }

    pub fn thc(mut self, thc: f64) -> Self {
        self.item.thc = Some(thc);
        self
    }

    pub fn cbd(mut self, cbd: f64) -> Self {
        self.item.cbd = Some(cbd);
        self
    }

    pub fn size_grams(mut self, size: f64) -> Self {
        self.item.size_grams = Some(size);
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.item.price = Some(price);
        self
    }

    pub fn stock_status(mut self, status: impl Into<String>) -> Self {
        self.item.stock_status = Some(status.into());
        self
    }

    pub fn stock_remaining(mut self, remaining: f64) -> Self {
        self.item.stock_remaining = Some(remaining);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.item.url = Some(url.into());
        self
    }

    pub fn build(self) -> Item {
        self.item
    }
}
