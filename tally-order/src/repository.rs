use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_core::{DateRange, Page, StoreResult};
use tally_shared::AuditLogEntry;

use crate::models::{Order, OrderStatus, ShippingMethod};

/// Criteria shared by listing, export and aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub date_range: Option<DateRange>,
    pub shipping_method: Option<ShippingMethod>,
}

impl OrderFilter {
    /// Search text with surrounding whitespace removed, if any is left
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// In-process evaluation of the filter. SQL backends translate it instead.
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|status| order.status != status) {
            return false;
        }
        if self.shipping_method.is_some_and(|method| order.shipping_method != method) {
            return false;
        }
        if self.date_range.is_some_and(|range| !range.contains(order.created_at)) {
            return false;
        }
        match self.search_text() {
            None => true,
            Some(text) => {
                let needle = text.to_lowercase();
                let hit = |value: &str| value.to_lowercase().contains(&needle);
                hit(&order.customer_name)
                    || hit(order.mobile_number.expose())
                    || hit(&order.id)
                    || order.address.as_deref().is_some_and(hit)
            }
        }
    }
}

/// One page of orders plus totals over the whole filter
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub total_sales: Decimal,
    pub total_profit: Decimal,
}

/// Per-status aggregate used by the reporting views
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusTotals {
    pub status: OrderStatus,
    pub count: u64,
    pub total_selling_price: Decimal,
    pub net_profit: Decimal,
}

/// A status write together with the audit entry that must land with it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub net_profit: Decimal,
    pub audit: AuditLogEntry,
}

/// Storage port for orders, their items and the audit log.
///
/// Every write method is one atomic unit: the order change and its audit entry
/// are committed together or not at all.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order with its items. Fails with `StoreError::Duplicate` when
    /// the id is taken.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Replace the order row and its whole item set. Returns `false` if the
    /// order no longer exists.
    async fn replace_order(&self, order: &Order, audit: &AuditLogEntry) -> StoreResult<bool>;

    /// Unconditional status write (last writer wins). Returns the updated
    /// order, or `None` if it no longer exists.
    async fn update_status(&self, update: &StatusUpdate) -> StoreResult<Option<Order>>;

    /// Batch status write. Each update only applies while the order is still
    /// in `update.from`; returns the ids that were changed.
    async fn bulk_update_status(&self, updates: &[StatusUpdate]) -> StoreResult<Vec<String>>;

    /// Delete items, record the audit entry, delete the order. Returns `false`
    /// if there was nothing to delete.
    async fn delete_order(&self, id: &str, audit: &AuditLogEntry) -> StoreResult<bool>;

    async fn find_stale_orders(
        &self,
        shipping_method: ShippingMethod,
        statuses: &[OrderStatus],
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>>;

    /// Newest first
    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> StoreResult<OrderPage>;

    /// Newest first, unpaginated
    async fn find_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    async fn status_totals(&self, date_range: Option<DateRange>) -> StoreResult<Vec<StatusTotals>>;

    /// Oldest first
    async fn audit_trail(&self, target_id: &str) -> StoreResult<Vec<AuditLogEntry>>;
}
