//! Catalogue record normalization
//!
//! Converts raw JSON product records to domain [`Item`]s. Only structured
//! fields are read here; anything that needs free-text heuristics belongs in
//! a custom [`ItemParser`] supplied by the host.

use log::warn;
use serde_json::{Map, Value};

use crate::models::Item;

/// Errors from turning a fetched payload into items
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("record {index} has no product name")]
    MissingName { index: usize },
    #[error("none of the {total} fetched records could be parsed")]
    NoUsableRecords { total: usize },
}

/// Turns a complete fetched payload into items
pub trait ItemParser: Send + Sync {
    fn parse(&self, records: &[Value]) -> Result<Vec<Item>, ParseError>;
}

/// Default parser for the catalogue's JSON records
///
/// Malformed records are skipped with a warning; the parse only fails when
/// a non-empty payload yields no items at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonItemParser;

impl ItemParser for JsonItemParser {
    fn parse(&self, records: &[Value]) -> Result<Vec<Item>, ParseError> {
        let mut items = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match normalize_record(index, record) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping catalogue record: {}", e),
            }
        }
        if items.is_empty() && !records.is_empty() {
            return Err(ParseError::NoUsableRecords {
                total: records.len(),
            });
        }
        Ok(items)
    }
}

/// Normalize one raw catalogue record
pub fn normalize_record(index: usize, record: &Value) -> Result<Item, ParseError> {
    let obj = record
        .as_object()
        .ok_or(ParseError::NotAnObject { index })?;

    let name = text(obj, &["name", "productName", "title"])
        .ok_or(ParseError::MissingName { index })?;

    Ok(Item {
        product_id: text(obj, &["id", "productId", "product_id", "sku"]),
        brand: text(obj, &["brand", "brandName", "manufacturer"]),
        name,
        strain: text(obj, &["strain", "strainName", "category"]),
        product_type: text(obj, &["type", "productType", "product_type", "form"]),
        thc: number(obj, &["thc", "thcContent", "thc_percent"]),
        cbd: number(obj, &["cbd", "cbdContent", "cbd_percent"]),
        size_grams: number(obj, &["size", "sizeGrams", "weight", "quantity"]),
        price: number(obj, &["price", "unitPrice", "retailPrice"]),
        stock_status: text(obj, &["stockStatus", "stock_status", "availability", "status"]),
        stock_remaining: number(obj, &["stockRemaining", "stock_remaining", "remaining", "stock"]),
        url: text(obj, &["url", "link", "productUrl"]),
    })
}

/// First non-empty string (or number rendered as a string) among `keys`
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First numeric value among `keys`
///
/// Strings like "22.5%", "$120.00" or "10 g" are accepted; anything that
/// doesn't start with a number is treated as absent, never as zero.
fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    })
}

fn parse_leading_number(s: &str) -> Option<f64> {
    let trimmed = s.trim().trim_start_matches(['$', '€', '£']).replace(',', "");
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_full_record() {
        let record = json!({
            "id": 1234,
            "brand": " Acme ",
            "name": "Pink Kush",
            "strain": "Indica",
            "type": "Flower",
            "thc": "22.5%",
            "cbd": 0.4,
            "size": "10 g",
            "price": "$120.00",
            "stockStatus": "IN STOCK",
            "stockRemaining": 8,
            "url": "https://shop/p/1234"
        });
        let item = normalize_record(0, &record).unwrap();
        assert_eq!(item.product_id.as_deref(), Some("1234"));
        assert_eq!(item.brand.as_deref(), Some("Acme"));
        assert_eq!(item.thc, Some(22.5));
        assert_eq!(item.cbd, Some(0.4));
        assert_eq!(item.size_grams, Some(10.0));
        assert_eq!(item.price, Some(120.0));
        assert_eq!(item.stock_remaining, Some(8.0));
        assert_eq!(item.stock_status.as_deref(), Some("IN STOCK"));
    }

    #[test]
    fn test_unparseable_price_is_absent_not_zero() {
        let item = normalize_record(0, &json!({"name": "X", "price": "POA"})).unwrap();
        assert_eq!(item.price, None);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = normalize_record(3, &json!({"price": 10})).unwrap_err();
        assert!(matches!(err, ParseError::MissingName { index: 3 }));
        assert!(matches!(
            normalize_record(1, &json!([1])).unwrap_err(),
            ParseError::NotAnObject { index: 1 }
        ));
    }

    #[test]
    fn test_parser_skips_bad_records() {
        let records = vec![json!({"name": "A"}), json!("junk"), json!({"name": "B"})];
        let items = JsonItemParser.parse(&records).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_parser_fails_when_nothing_usable() {
        let records = vec![json!("junk"), json!({"price": 1})];
        assert!(matches!(
            JsonItemParser.parse(&records),
            Err(ParseError::NoUsableRecords { total: 2 })
        ));
        assert!(JsonItemParser.parse(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_leading_number() {
        assert_eq!(parse_leading_number("1,250.50"), Some(1250.5));
        assert_eq!(parse_leading_number("-3 units"), Some(-3.0));
        assert_eq!(parse_leading_number("n/a"), None);
    }
}
