use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::generate_id;
use crate::models::price::Price;

/// A catalog entry whose shelf price is tracked.
///
/// `prices` is always ordered by `observed_at`, newest first; the head is the
/// current price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub description: String,
    /// Fixed-length numeric barcode. Kept as text so leading zeros survive.
    pub code: String,
    pub sequence_code: i64,
    pub prices: Vec<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub description: String,
    pub code: String,
    pub sequence_code: i64,
}

/// One product as the portal reports it right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSnapshot {
    pub description: String,
    pub code: String,
    pub sequence_code: i64,
    pub current_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Product {
    pub fn new(new_product: NewProduct) -> Self {
        Self {
            id: generate_id(),
            description: new_product.description,
            code: new_product.code,
            sequence_code: new_product.sequence_code,
            prices: Vec::new(),
        }
    }

    pub fn current_price(&self) -> Option<&Price> {
        self.prices.first()
    }

    /// Append an observation, keeping the list newest-first.
    ///
    /// Observing the value that is already current is a no-op, so repeating a
    /// lookup inside one run never produces duplicate rows. Returns whether a
    /// row was added.
    pub fn record_price(&mut self, value: Decimal, observed_at: DateTime<Utc>) -> bool {
        if self.current_price().is_some_and(|p| p.value == value) {
            return false;
        }

        let price = Price::new(&self.id, value, observed_at);
        let position = self
            .prices
            .iter()
            .position(|p| p.observed_at < observed_at)
            .unwrap_or(self.prices.len());
        self.prices.insert(position, price);
        true
    }

    /// Detach a price from this product. The returned price no longer points back here.
    pub fn remove_price(&mut self, price_id: &str) -> Option<Price> {
        let index = self.prices.iter().position(|p| p.id == price_id)?;
        let mut price = self.prices.remove(index);
        price.product_id = None;
        Some(price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceView {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl From<&Price> for PriceView {
    fn from(price: &Price) -> Self {
        Self {
            value: price.value,
            observed_at: price.observed_at,
        }
    }
}

// Read models served by the API. Each one is built from a full `Product`.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub code: String,
    pub description: String,
    pub sequence_code: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductWithLatestPrice {
    pub code: String,
    pub description: String,
    pub sequence_code: i64,
    pub price: Option<PriceView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductWithAllPrices {
    pub code: String,
    pub description: String,
    pub prices: Vec<PriceView>,
}

pub fn summary(product: &Product) -> ProductSummary {
    ProductSummary {
        code: product.code.clone(),
        description: product.description.clone(),
        sequence_code: product.sequence_code,
    }
}

pub fn with_latest_price(product: &Product) -> ProductWithLatestPrice {
    ProductWithLatestPrice {
        code: product.code.clone(),
        description: product.description.clone(),
        sequence_code: product.sequence_code,
        price: product.current_price().map(PriceView::from),
    }
}

/// Newest-first price history, truncated to `limit` entries when given.
pub fn with_all_prices(product: &Product, limit: Option<usize>) -> ProductWithAllPrices {
    let take = limit.unwrap_or(product.prices.len());
    ProductWithAllPrices {
        code: product.code.clone(),
        description: product.description.clone(),
        prices: product.prices.iter().take(take).map(PriceView::from).collect(),
    }
}
