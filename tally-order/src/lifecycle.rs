//! Status rules: which status an order starts in, which transitions a
//! status change actually performs, and what happens to profit on the way.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{OrderError, OrderResult};
use crate::models::{Order, OrderStatus, ShippingMethod};
use crate::pricing;

/// Statuses the auto-delivery rule picks up
pub const AUTO_DELIVERY_STATUSES: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Dispatched];

/// Carrier whose parcels are assumed delivered after the dwell time
pub const AUTO_DELIVERY_METHOD: ShippingMethod = ShippingMethod::SpeedPost;

/// Outcome of a status change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub requested: OrderStatus,
    pub to: OrderStatus,
    pub net_profit: Decimal,
}

/// Resolve an explicit status change against the transition table.
///
/// Speed Post parcels skip DISPATCHED and land in DELIVERED. A return books
/// the shipping cost as the loss; every other target restores selling minus
/// cost.
pub fn resolve(order: &Order, requested: OrderStatus) -> Transition {
    let to = match requested {
        OrderStatus::Dispatched if order.shipping_method == ShippingMethod::SpeedPost => OrderStatus::Delivered,
        other => other,
    };

    let net_profit = match to {
        OrderStatus::Returned => pricing::returned_net_profit(order.shipping_cost),
        _ => pricing::net_profit(order.total_selling_price, order.total_cost_price),
    };

    Transition {
        from: order.status,
        requested,
        to,
        net_profit,
    }
}

/// Status for a new order: DRAFT when asked for, PENDING otherwise
pub fn initial_status(requested: Option<OrderStatus>) -> OrderResult<OrderStatus> {
    match requested {
        None | Some(OrderStatus::Pending) => Ok(OrderStatus::Pending),
        Some(OrderStatus::Draft) => Ok(OrderStatus::Draft),
        Some(other) => Err(OrderError::Validation(format!(
            "new orders start as DRAFT or PENDING, not {}",
            other
        ))),
    }
}

pub fn ensure_editable(order: &Order) -> OrderResult<()> {
    if order.status.is_editable() {
        return Ok(());
    }
    Err(OrderError::InvalidState {
        order_id: order.id.clone(),
        status: order.status,
        operation: "edited",
    })
}

/// Status an edit leaves the order in. Edits may finalize a draft or park an
/// order back as draft; shipping progress goes through a status change.
pub fn edit_target(current: OrderStatus, requested: Option<OrderStatus>) -> OrderResult<OrderStatus> {
    let target = requested.unwrap_or(current);
    if target.is_editable() {
        Ok(target)
    } else {
        Err(OrderError::Validation(format!(
            "an edit can only leave an order as DRAFT or PENDING, not {}",
            target
        )))
    }
}

/// Everything but a draft needs at least one line
pub fn require_items(status: OrderStatus, item_count: usize) -> OrderResult<()> {
    if status != OrderStatus::Draft && item_count == 0 {
        return Err(OrderError::validation("Order must contain at least one item"));
    }
    Ok(())
}

/// Whether the auto-delivery rule applies to `order` for the given cutoff
pub fn is_auto_delivery_candidate(order: &Order, created_before: DateTime<Utc>) -> bool {
    order.shipping_method == AUTO_DELIVERY_METHOD
        && AUTO_DELIVERY_STATUSES.contains(&order.status)
        && order.created_at < created_before
}

/// Auto-delivery keeps the profit booked at creation
pub fn auto_delivery(order: &Order) -> Transition {
    Transition {
        from: order.status,
        requested: OrderStatus::Delivered,
        to: OrderStatus::Delivered,
        net_profit: order.net_profit,
    }
}
