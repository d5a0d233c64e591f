//! Normalization from raw retailer JSON records to [`GroceryProduct`].
//!
//! Retailer APIs differ in naming convention, so each field is looked up
//! under its camelCase name first and its snake_case name second.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use grocer_core::{GroceryProduct, NutritionalInfo};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::client::resolve_url;
use crate::error::ScraperError;
use crate::run::ScrapedRecord;

const UNKNOWN_BRAND: &str = "Unknown";
const UNCATEGORIZED: &str = "Uncategorized";

/// Retailer context a record is normalized under.
#[derive(Debug, Clone, Copy)]
pub struct StoreContext<'a> {
    /// Display name written to [`GroceryProduct::store`].
    pub store: &'a str,
    /// Base that relative product URLs are resolved against.
    pub base_url: &'a str,
    pub scraped_at: DateTime<Utc>,
}

/// A raw record that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position of the record in the input slice.
    pub index: usize,
    pub product_id: Option<String>,
    pub reason: String,
}

/// Normalizes one raw record.
///
/// `category_hint` is used when the record carries no category of its own,
/// typically the name of the category listing it came from.
///
/// # Errors
///
/// Returns [`ScraperError::Normalization`] if the record is not an object,
/// lacks an `id` or `name`, or has a missing or invalid `price`.
pub fn normalize_product(
    raw: &Value,
    category_hint: Option<&str>,
    ctx: &StoreContext<'_>,
) -> Result<GroceryProduct, ScraperError> {
    let Some(record) = raw.as_object() else {
        return Err(normalization_error("<none>", "record is not a JSON object"));
    };

    let id = field(record, &["id"])
        .and_then(scalar_string)
        .ok_or_else(|| normalization_error("<none>", "missing id"))?;
    let name = field(record, &["name"])
        .and_then(scalar_string)
        .ok_or_else(|| normalization_error(&id, "missing name"))?;

    let price = match field(record, &["price"]) {
        None => return Err(normalization_error(&id, "missing price")),
        Some(value) => parse_price(value)
            .ok_or_else(|| normalization_error(&id, &format!("invalid price {value}")))?,
    };
    let unit_price = field(record, &["unitPrice", "unit_price"]).and_then(parse_price);

    let brand = field(record, &["brand"])
        .and_then(scalar_string)
        .unwrap_or_else(|| UNKNOWN_BRAND.to_owned());
    let category = field(record, &["category"])
        .and_then(scalar_string)
        .or_else(|| category_hint.map(str::to_owned))
        .unwrap_or_else(|| UNCATEGORIZED.to_owned());
    let image_url = field(record, &["imageUrl", "image_url"]).and_then(scalar_string);

    let product_url = match field(record, &["url", "productUrl", "product_url"])
        .and_then(scalar_string)
    {
        Some(href) => match resolve_url(ctx.base_url, &href) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::debug!(product_id = %id, error = %e, "dropping unresolvable product url");
                None
            }
        },
        None => None,
    };

    Ok(GroceryProduct {
        ingredients: standardize_ingredients(field(record, &["ingredients"])),
        nutritional_info: parse_nutritional_info(
            field(record, &["nutritionalInfo", "nutritional_info", "nutrition"]),
        ),
        id,
        name,
        brand,
        price,
        unit_price,
        category,
        image_url,
        store: ctx.store.to_owned(),
        scraped_at: ctx.scraped_at,
        product_url,
    })
}

/// Normalizes a batch of scraped records, collecting a [`SkippedRecord`]
/// for every record that fails instead of aborting.
#[must_use]
pub fn normalize_records(
    records: &[ScrapedRecord],
    ctx: &StoreContext<'_>,
) -> (Vec<GroceryProduct>, Vec<SkippedRecord>) {
    let mut products = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        match normalize_product(&record.raw, Some(&record.category), ctx) {
            Ok(product) => products.push(product),
            Err(e) => {
                let product_id = record
                    .raw
                    .get("id")
                    .and_then(scalar_string);
                tracing::warn!(
                    store = ctx.store,
                    index,
                    product_id = product_id.as_deref().unwrap_or("<none>"),
                    error = %e,
                    "skipping product record"
                );
                skipped.push(SkippedRecord {
                    index,
                    product_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    (products, skipped)
}

fn normalization_error(product_id: &str, reason: &str) -> ScraperError {
    ScraperError::Normalization {
        product_id: product_id.to_owned(),
        reason: reason.to_owned(),
    }
}

/// First non-null value among `keys`.
fn field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

/// A non-blank string or number rendered as a trimmed string.
fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Parses a non-negative price from a JSON number or a string such as
/// `"24,90"`, `"24.90 kr"` or `"kr 24,90"`.
fn parse_price(value: &Value) -> Option<Decimal> {
    let price = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()?
        }
        Value::String(s) => parse_price_text(s)?,
        _ => return None,
    };
    (price >= Decimal::ZERO).then_some(price)
}

fn parse_price_text(raw: &str) -> Option<Decimal> {
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .trim_start_matches("kr")
        .trim_end_matches(",-")
        .trim_end_matches("kr")
        .trim_end_matches(",-");
    let cleaned: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Array → `", "`-joined; scalar → its text; anything else → empty.
fn standardize_ingredients(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(scalar_string)
            .collect::<Vec<_>>()
            .join(", "),
        Some(value) => scalar_string(value).unwrap_or_default(),
        None => String::new(),
    }
}

/// Accepts an object, a string holding a JSON object, or `key: value` lines.
fn parse_nutritional_info(value: Option<&Value>) -> NutritionalInfo {
    match value {
        Some(Value::Object(map)) => object_to_info(map),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => object_to_info(&map),
            _ => parse_nutrition_lines(text),
        },
        _ => NutritionalInfo::new(),
    }
}

fn object_to_info(map: &Map<String, Value>) -> NutritionalInfo {
    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) => s.trim().to_owned(),
                other => other.to_string(),
            };
            Some((key.trim().to_owned(), rendered))
        })
        .collect()
}

fn parse_nutrition_lines(text: &str) -> NutritionalInfo {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            (!key.is_empty() && !value.is_empty()).then(|| (key.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
