//! Read-side views: listings, statistics and export rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tally_core::{DateRange, Page};

use crate::models::{Order, OrderStatus, ShippingMethod};
use crate::repository::{OrderFilter, StatusTotals};

/// Listing criteria as received from the caller
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
    pub shipping_method: Option<ShippingMethod>,
    pub page: Page,
}

impl OrderQuery {
    pub fn filter(&self) -> OrderFilter {
        OrderFilter {
            status: self.status,
            search: self.search.clone(),
            date_range: self.date_range,
            shipping_method: self.shipping_method,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ListingStats {
    pub total_sales: Decimal,
    pub total_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderListing {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
    pub stats: ListingStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    pub count: u64,
    pub total: Decimal,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub status_stats: BTreeMap<OrderStatus, StatusSummary>,
    pub total_sales: Decimal,
    pub total_profit: Decimal,
}

/// Per-status summary plus grand totals over every order
pub fn order_stats(totals: &[StatusTotals]) -> OrderStats {
    let mut stats = OrderStats::default();
    for t in totals {
        let summary = stats.status_stats.entry(t.status).or_default();
        summary.count += t.count;
        summary.total += t.total_selling_price;
        summary.profit += t.net_profit;

        stats.total_sales += t.total_selling_price;
        stats.total_profit += t.net_profit;
    }
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StatusCounts {
    pub pending: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub returned: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_sales: Decimal,
    pub total_profit: Decimal,
    pub status_counts: StatusCounts,
    pub outstanding_revenue: Decimal,
}

/// Dashboard figures.
///
/// Sales leave out returned and cancelled orders, profit counts everything so
/// return losses show up, and outstanding revenue is what is still on the road.
pub fn dashboard_stats(totals: &[StatusTotals]) -> DashboardStats {
    let mut stats = DashboardStats::default();
    for t in totals {
        stats.total_profit += t.net_profit;
        if !matches!(t.status, OrderStatus::Returned | OrderStatus::Cancelled) {
            stats.total_sales += t.total_selling_price;
        }
        if matches!(t.status, OrderStatus::Pending | OrderStatus::Dispatched) {
            stats.outstanding_revenue += t.total_selling_price;
        }

        let counts = &mut stats.status_counts;
        match t.status {
            OrderStatus::Pending => counts.pending += t.count,
            OrderStatus::Dispatched => counts.dispatched += t.count,
            OrderStatus::Delivered => counts.delivered += t.count,
            OrderStatus::Returned => counts.returned += t.count,
            OrderStatus::Cancelled => counts.cancelled += t.count,
            OrderStatus::Draft => {}
        }
    }
    stats
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportQuery {
    pub status: Option<OrderStatus>,
    pub date_range: Option<DateRange>,
}

impl ExportQuery {
    /// Export criteria from calendar days. The date window only applies when
    /// both days are given.
    pub fn from_days(status: Option<OrderStatus>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            status,
            date_range: DateRange::between_days(start, end),
        }
    }

    pub fn filter(&self) -> OrderFilter {
        OrderFilter {
            status: self.status,
            date_range: self.date_range,
            ..Default::default()
        }
    }
}

/// One spreadsheet row per order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Customer Name")]
    pub customer_name: String,
    #[serde(rename = "Mobile")]
    pub mobile: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Status")]
    pub status: OrderStatus,
    #[serde(rename = "Total Sales")]
    pub total_sales: Decimal,
    #[serde(rename = "Net Profit")]
    pub net_profit: Decimal,
    #[serde(rename = "Shipping Cost")]
    pub shipping_cost: Decimal,
    #[serde(rename = "Items")]
    pub items: String,
}

impl ExportRow {
    pub fn from_order(order: &Order) -> Self {
        let items = order
            .items
            .iter()
            .map(|item| format!("{} (x{})", item.product_name, item.quantity))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            order_id: order.id.clone(),
            date: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            customer_name: order.customer_name.clone(),
            mobile: order.mobile_number.expose().clone(),
            address: order.address.clone().unwrap_or_default(),
            status: order.status,
            total_sales: order.total_selling_price,
            net_profit: order.net_profit,
            shipping_cost: order.shipping_cost,
            items,
        }
    }
}
