use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use tally_shared::Masked;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Pending,
    Dispatched,
    Delivered,
    Returned,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Dispatched,
        OrderStatus::Delivered,
        OrderStatus::Returned,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Dispatched => "DISPATCHED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// No outgoing transitions are defined for these in the normal flow
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Returned | OrderStatus::Cancelled)
    }

    /// Only drafts and pending orders accept a full edit
    pub fn is_editable(&self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// Delivery channel chosen for an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ShippingMethod {
    #[default]
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "Speed Post")]
    SpeedPost,
    #[serde(rename = "Pickup")]
    Pickup,
}

impl ShippingMethod {
    pub fn label(&self) -> &'static str {
        match self {
            ShippingMethod::Cod => "COD",
            ShippingMethod::SpeedPost => "Speed Post",
            ShippingMethod::Pickup => "Pickup",
        }
    }
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShippingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COD" => Ok(ShippingMethod::Cod),
            "Speed Post" => Ok(ShippingMethod::SpeedPost),
            "Pickup" => Ok(ShippingMethod::Pickup),
            other => Err(format!("unknown shipping method: {}", other)),
        }
    }
}

/// A customer purchase with its line items and derived financials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub mobile_number: Masked<String>,
    pub address: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_cost: Decimal,
    pub total_selling_price: Decimal,
    pub total_cost_price: Decimal,
    pub net_profit: Decimal,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Status and profit pair recorded in status-change audit entries
    pub fn status_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "net_profit": self.net_profit,
        })
    }

    /// Full snapshot for edit audits
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// True when stored totals agree with the line items
    pub fn totals_match_items(&self) -> bool {
        let selling: Decimal = self.items.iter().map(|i| i.selling_price * Decimal::from(i.quantity)).sum();
        let cost: Decimal = self.items.iter().map(|i| i.cost_price * Decimal::from(i.quantity)).sum();
        selling == self.total_selling_price && cost == self.total_cost_price
    }
}

/// One product line within an order. The name is a snapshot taken at entry time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: String,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub total_item_value: Decimal,
}

/// Human-readable identifier: `ORD-YYYYMMDD-NNNN`.
///
/// The suffix is random, so two orders created on the same day can collide;
/// callers regenerate on a duplicate key.
pub fn generate_order_id(at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("ORD-{}-{}", at.format("%Y%m%d"), suffix)
}
