use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tally_core::{DateRange, Page, StoreError, StoreResult};
use tally_shared::AuditLogEntry;

use crate::models::{Order, OrderStatus, ShippingMethod};
use crate::repository::{OrderFilter, OrderPage, OrderRepository, StatusTotals, StatusUpdate};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<String, Order>,
    audit: Vec<AuditLogEntry>,
}

/// Process-local order storage.
///
/// A single lock guards orders and audit log, so every write is atomic. Used
/// by tests and by embedders that do not need durability.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    state: RwLock<MemoryState>,
    offline: AtomicBool,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn audit_len(&self) -> usize {
        self.state.read().await.audit.len()
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::backend(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "in-memory order store is offline",
            )));
        }
        Ok(())
    }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        orders
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id.clone()));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        self.check_online()?;
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn replace_order(&self, order: &Order, audit: &AuditLogEntry) -> StoreResult<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        match state.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                state.audit.push(audit.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(&self, update: &StatusUpdate) -> StoreResult<Option<Order>> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let updated = match state.orders.get_mut(&update.order_id) {
            Some(order) => {
                order.status = update.to;
                order.net_profit = update.net_profit;
                order.updated_at = Utc::now();
                order.clone()
            }
            None => return Ok(None),
        };
        state.audit.push(update.audit.clone());
        Ok(Some(updated))
    }

    async fn bulk_update_status(&self, updates: &[StatusUpdate]) -> StoreResult<Vec<String>> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut applied = Vec::new();

        for update in updates {
            let Some(order) = state.orders.get_mut(&update.order_id) else {
                continue;
            };
            if order.status != update.from {
                continue;
            }
            order.status = update.to;
            order.net_profit = update.net_profit;
            order.updated_at = now;
            applied.push(update.order_id.clone());
            state.audit.push(update.audit.clone());
        }

        Ok(applied)
    }

    async fn delete_order(&self, id: &str, audit: &AuditLogEntry) -> StoreResult<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        if state.orders.remove(id).is_none() {
            return Ok(false);
        }
        state.audit.push(audit.clone());
        Ok(true)
    }

    async fn find_stale_orders(
        &self,
        shipping_method: ShippingMethod,
        statuses: &[OrderStatus],
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        self.check_online()?;
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| {
                o.shipping_method == shipping_method
                    && statuses.contains(&o.status)
                    && o.created_at < created_before
            })
            .cloned()
            .collect())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> StoreResult<OrderPage> {
        let matching = self.find_orders(filter).await?;

        let total = matching.len() as u64;
        let total_sales: Decimal = matching.iter().map(|o| o.total_selling_price).sum();
        let total_profit: Decimal = matching.iter().map(|o| o.net_profit).sum();
        let orders = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();

        Ok(OrderPage { orders, total, total_sales, total_profit })
    }

    async fn find_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        self.check_online()?;
        let state = self.state.read().await;
        let matching = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        Ok(Self::newest_first(matching))
    }

    async fn status_totals(&self, date_range: Option<DateRange>) -> StoreResult<Vec<StatusTotals>> {
        self.check_online()?;
        let state = self.state.read().await;
        let mut by_status: HashMap<OrderStatus, StatusTotals> = HashMap::new();

        for order in state.orders.values() {
            if date_range.is_some_and(|range| !range.contains(order.created_at)) {
                continue;
            }
            let entry = by_status.entry(order.status).or_insert(StatusTotals {
                status: order.status,
                count: 0,
                total_selling_price: Decimal::ZERO,
                net_profit: Decimal::ZERO,
            });
            entry.count += 1;
            entry.total_selling_price += order.total_selling_price;
            entry.net_profit += order.net_profit;
        }

        let mut totals: Vec<StatusTotals> = by_status.into_values().collect();
        totals.sort_by_key(|t| t.status);
        Ok(totals)
    }

    async fn audit_trail(&self, target_id: &str) -> StoreResult<Vec<AuditLogEntry>> {
        self.check_online()?;
        let state = self.state.read().await;
        Ok(state.audit.iter().filter(|e| e.target_id == target_id).cloned().collect())
    }
}
