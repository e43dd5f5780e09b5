use serde::Deserialize;
use uuid::Uuid;
use rust_decimal::Decimal;
use tally_catalog::Product;

use crate::error::{OrderError, OrderResult};
use crate::models::{OrderStatus, ShippingMethod};

/// A line as submitted by the caller, before pricing
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LineItemInput {
    #[serde(default, alias = "productId")]
    pub product_id: Option<Uuid>,
    #[serde(alias = "product_name")]
    pub name: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
}

impl LineItemInput {
    pub fn manual(name: impl Into<String>, quantity: i32, cost_price: Decimal, selling_price: Decimal) -> Self {
        Self {
            product_id: None,
            name: name.into(),
            quantity,
            cost_price,
            selling_price,
        }
    }

    /// Snapshot a catalog product into a line
    pub fn from_product(product: &Product, quantity: i32) -> Self {
        Self {
            product_id: Some(product.id),
            name: product.name.clone(),
            quantity,
            cost_price: product.cost_price,
            selling_price: product.suggested_selling_price(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub mobile_number: String,
    pub address: Option<String>,
    pub shipping_method: Option<ShippingMethod>,
    pub shipping_cost: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub status: Option<OrderStatus>,
}

/// Full replacement of an editable order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditOrderRequest {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub mobile_number: String,
    pub address: Option<String>,
    pub shipping_method: Option<ShippingMethod>,
    pub shipping_cost: Option<Decimal>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub status: Option<OrderStatus>,
}

/// Drafts may be saved half-filled; anything else needs who and where to call.
pub(crate) fn check_contact(status: OrderStatus, customer_name: &str, mobile_number: &str) -> OrderResult<()> {
    if status == OrderStatus::Draft {
        return Ok(());
    }
    if customer_name.trim().is_empty() {
        return Err(OrderError::validation("customer_name is required"));
    }
    if mobile_number.trim().is_empty() {
        return Err(OrderError::validation("mobile_number is required"));
    }
    Ok(())
}

/// Absent cost means free shipping; a negative one is rejected.
pub(crate) fn resolve_shipping_cost(shipping_cost: Option<Decimal>) -> OrderResult<Decimal> {
    let cost = shipping_cost.unwrap_or(Decimal::ZERO);
    if cost < Decimal::ZERO {
        return Err(OrderError::validation(format!("shipping_cost must be non-negative, got {}", cost)));
    }
    crate::pricing::check_amount("shipping_cost", cost)?;
    Ok(cost)
}

pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
