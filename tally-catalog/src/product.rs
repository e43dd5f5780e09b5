use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Markup applied when a product has no default selling price
const FALLBACK_MARKUP: Decimal = Decimal::TWO;

/// Catalog entry. Orders copy name and prices out of it at entry time, so later
/// catalog edits never rewrite historical orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub cost_price: Decimal,
    pub default_selling_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, cost_price: Decimal, default_selling_price: Option<Decimal>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cost_price,
            default_selling_price,
            created_at: Utc::now(),
        }
    }

    /// Selling price offered for a new line: the configured default, or twice the cost.
    pub fn suggested_selling_price(&self) -> Decimal {
        match self.default_selling_price {
            Some(price) if !price.is_zero() => price,
            _ => self.cost_price * FALLBACK_MARKUP,
        }
    }
}
