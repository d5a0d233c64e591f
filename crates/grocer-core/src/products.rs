use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Nutrition facts keyed by label as the retailer reports them,
/// e.g. `"Energi" → "250 kcal"`.
pub type NutritionalInfo = BTreeMap<String, String>;

/// A grocery product scraped from a retailer API, normalized for storage and
/// comparison across retailers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryProduct {
    /// Retailer product ID, stored as a string to avoid precision loss.
    pub id: String,
    pub name: String,
    /// Brand name; `"Unknown"` when the retailer omits it.
    pub brand: String,
    pub price: Decimal,
    /// Comparison price per kg/l/unit, when the retailer reports a valid one.
    pub unit_price: Option<Decimal>,
    /// Retailer category label; `"Uncategorized"` when absent.
    pub category: String,
    pub image_url: Option<String>,
    /// Comma-separated ingredient list; empty when unknown.
    pub ingredients: String,
    pub nutritional_info: NutritionalInfo,
    /// Display name of the retailer the product was scraped from.
    pub store: String,
    pub scraped_at: DateTime<Utc>,
    /// Absolute URL to the product page, if the retailer exposes one.
    pub product_url: Option<String>,
}
