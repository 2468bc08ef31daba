use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A price that moved during a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub description: String,
    pub old_price: Decimal,
    pub new_price: Decimal,
}

impl PriceChange {
    pub fn new(description: impl Into<String>, old_price: Decimal, new_price: Decimal) -> Self {
        Self {
            description: description.into(),
            old_price,
            new_price,
        }
    }

    pub fn trend(&self) -> String {
        trend_label(self.old_price, self.new_price)
    }
}

impl fmt::Display for PriceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.description,
            self.old_price,
            self.new_price,
            self.trend()
        )
    }
}

/// Rough percentage movement for the summary mail, e.g. `"< ~10%"` for a drop
/// and `"> ~10%"` for a rise.
///
/// This is a display heuristic: the fraction `(old - new) / old` is rounded
/// half-to-even to two places before scaling, so small moves collapse to `~0%`.
/// A zero old price reads as a full rise.
pub fn trend_label(old: Decimal, new: Decimal) -> String {
    let fraction = (old - new)
        .checked_div(old)
        .unwrap_or(Decimal::NEGATIVE_ONE)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let glyph = if fraction.is_sign_negative() && !fraction.is_zero() { ">" } else { "<" };
    let percentage = (fraction.abs() * Decimal::ONE_HUNDRED).to_i64().unwrap_or(0);
    format!("{} ~{}%", glyph, percentage)
}
