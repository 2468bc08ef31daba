use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::generate_id;
use crate::utils::error::{AppError, Result};

/// A single observed shelf price. Immutable once stored, except for the
/// back-reference to its product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub id: String,
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub product_id: Option<String>,
}

impl Price {
    pub fn new(product_id: &str, value: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            value,
            observed_at,
            product_id: Some(product_id.to_string()),
        }
    }
}

/// Parse a price as the portal renders it. Some legacy pages use a comma as the
/// decimal separator, so `"12,34"` and `"12.34"` are the same value.
pub fn parse_price(text: &str) -> Result<Decimal> {
    let normalized = text.trim().replace(',', ".");
    Decimal::from_str(&normalized)
        .map_err(|e| AppError::parse(format!("invalid price '{}': {}", text, e)))
}
