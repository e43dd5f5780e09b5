use uuid::Uuid;
use rust_decimal::Decimal;

use crate::error::{OrderError, OrderResult};
use crate::models::OrderItem;
use crate::requests::LineItemInput;

/// Largest amount a money column holds (NUMERIC(12, 2))
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Money is stored in whole cents
pub const MONEY_SCALE: u32 = 2;

/// Reject amounts the store cannot hold exactly: more than two decimal places,
/// or beyond [`MAX_AMOUNT`] in either direction.
pub fn check_amount(field: &str, amount: Decimal) -> OrderResult<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(OrderError::Validation(format!(
            "{}: at most {} decimal places allowed, got {}",
            field, MONEY_SCALE, amount
        )));
    }
    if amount.abs() > MAX_AMOUNT {
        return Err(OrderError::Validation(format!("{}: amount out of range, got {}", field, amount)));
    }
    Ok(())
}

/// A validated line with its computed total
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub total_item_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PricedItems {
    pub total_selling_price: Decimal,
    pub total_cost_price: Decimal,
    pub lines: Vec<PricedLine>,
}

impl PricedItems {
    pub fn net_profit(&self) -> Decimal {
        net_profit(self.total_selling_price, self.total_cost_price)
    }

    /// Materialize the lines as items of `order_id`, each with a fresh id
    pub fn to_order_items(&self, order_id: &str) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id: order_id.to_string(),
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                cost_price: line.cost_price,
                selling_price: line.selling_price,
                total_item_value: line.total_item_value,
            })
            .collect()
    }
}

/// Price a list of lines. An empty list prices to zero.
pub fn price_items(items: &[LineItemInput]) -> OrderResult<PricedItems> {
    let mut priced = PricedItems::default();

    for (index, item) in items.iter().enumerate() {
        validate_line(index, item)?;

        let out_of_range = || OrderError::Validation(format!("items[{}]: amount out of range", index));
        let quantity = Decimal::from(item.quantity);
        let total_item_value = item.selling_price.checked_mul(quantity).ok_or_else(out_of_range)?;
        let total_item_cost = item.cost_price.checked_mul(quantity).ok_or_else(out_of_range)?;

        priced.total_selling_price = priced
            .total_selling_price
            .checked_add(total_item_value)
            .ok_or_else(out_of_range)?;
        priced.total_cost_price = priced.total_cost_price.checked_add(total_item_cost).ok_or_else(out_of_range)?;
        check_amount(&format!("items[{}]: total_item_value", index), total_item_value)?;
        check_amount("total_selling_price", priced.total_selling_price)?;
        check_amount("total_cost_price", priced.total_cost_price)?;
        priced.lines.push(PricedLine {
            product_id: item.product_id,
            product_name: item.name.trim().to_string(),
            quantity: item.quantity,
            cost_price: item.cost_price,
            selling_price: item.selling_price,
            total_item_value,
        });
    }

    Ok(priced)
}

fn validate_line(index: usize, item: &LineItemInput) -> OrderResult<()> {
    if item.name.trim().is_empty() {
        return Err(OrderError::Validation(format!("items[{}]: name is required", index)));
    }
    if item.quantity <= 0 {
        return Err(OrderError::Validation(format!(
            "items[{}]: quantity must be positive, got {}",
            index, item.quantity
        )));
    }
    if item.cost_price < Decimal::ZERO {
        return Err(OrderError::Validation(format!(
            "items[{}]: cost_price must be non-negative, got {}",
            index, item.cost_price
        )));
    }
    if item.selling_price < Decimal::ZERO {
        return Err(OrderError::Validation(format!(
            "items[{}]: selling_price must be non-negative, got {}",
            index, item.selling_price
        )));
    }
    check_amount(&format!("items[{}]: cost_price", index), item.cost_price)?;
    check_amount(&format!("items[{}]: selling_price", index), item.selling_price)?;
    Ok(())
}

/// Profit on a live order. Shipping is not charged against it.
pub fn net_profit(total_selling_price: Decimal, total_cost_price: Decimal) -> Decimal {
    total_selling_price - total_cost_price
}

/// Profit once an order comes back: the shipping spent is lost, stock cost is absorbed.
pub fn returned_net_profit(shipping_cost: Decimal) -> Decimal {
    -shipping_cost
}
