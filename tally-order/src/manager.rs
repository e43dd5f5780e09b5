use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tally_core::{Actor, DateRange, StoreError};
use tally_shared::{AuditAction, AuditLogEntry, Masked};
use tracing::{debug, info, warn};

use crate::error::{OrderError, OrderResult};
use crate::lifecycle;
use crate::models::{generate_order_id, Order, OrderStatus};
use crate::pricing;
use crate::reports::{self, DashboardStats, ExportQuery, ExportRow, ListingStats, OrderListing, OrderQuery, OrderStats};
use crate::repository::{OrderRepository, StatusUpdate};
use crate::requests::{check_contact, clean_text, resolve_shipping_cost, CreateOrderRequest, EditOrderRequest};
use crate::sweeper::AutoDeliverySweeper;

/// How many fresh identifiers a create tries before giving up
pub const MAX_ID_ATTEMPTS: usize = 5;

/// Business rules the engine runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Dwell time after which Speed Post orders count as delivered
    pub auto_delivery_after: Duration,
    /// Kick off a background sweep whenever orders are listed
    pub sweep_on_list: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            auto_delivery_after: Duration::days(3),
            sweep_on_list: true,
        }
    }
}

type IdGenerator = Box<dyn Fn(DateTime<Utc>) -> String + Send + Sync>;

/// Entry point for every order operation.
///
/// Holds no order state itself; storage is the only shared resource and each
/// operation is one atomic repository call.
pub struct OrderManager {
    repo: Arc<dyn OrderRepository>,
    sweeper: Arc<AutoDeliverySweeper>,
    settings: EngineSettings,
    id_generator: IdGenerator,
}

impl OrderManager {
    pub fn new(repo: Arc<dyn OrderRepository>, settings: EngineSettings) -> Self {
        let sweeper = Arc::new(AutoDeliverySweeper::new(repo.clone(), settings.auto_delivery_after));
        Self {
            repo,
            sweeper,
            settings,
            id_generator: Box::new(generate_order_id),
        }
    }

    /// Replace the identifier source
    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn sweeper(&self) -> Arc<AutoDeliverySweeper> {
        self.sweeper.clone()
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub async fn create_order(&self, request: CreateOrderRequest, actor: &Actor) -> OrderResult<Order> {
        let status = lifecycle::initial_status(request.status)?;
        check_contact(status, &request.customer_name, &request.mobile_number)?;
        let priced = pricing::price_items(&request.items)?;
        lifecycle::require_items(status, priced.lines.len())?;
        let shipping_cost = resolve_shipping_cost(request.shipping_cost)?;

        let now = Utc::now();
        let mut order = Order {
            id: String::new(),
            customer_name: request.customer_name.trim().to_string(),
            mobile_number: Masked(request.mobile_number.trim().to_string()),
            address: clean_text(request.address),
            shipping_method: request.shipping_method.unwrap_or_default(),
            shipping_cost,
            total_selling_price: priced.total_selling_price,
            total_cost_price: priced.total_cost_price,
            net_profit: priced.net_profit(),
            status,
            notes: clean_text(request.notes),
            items: Vec::new(),
            created_by_id: Some(actor.user_id),
            created_at: now,
            updated_at: now,
        };

        for attempt in 1..=MAX_ID_ATTEMPTS {
            order.id = (self.id_generator)(now);
            order.items = priced.to_order_items(&order.id);

            match self.repo.insert_order(&order).await {
                Ok(()) => {
                    info!(
                        "Created order {} ({}, {} items, net profit {})",
                        order.id,
                        order.status,
                        order.items.len(),
                        order.net_profit
                    );
                    return Ok(order);
                }
                Err(StoreError::Duplicate(id)) => {
                    warn!("Order id {} already taken (attempt {}/{})", id, attempt, MAX_ID_ATTEMPTS);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Duplicate(order.id).into())
    }

    /// Replace customer details, items and shipping of a DRAFT or PENDING order
    pub async fn edit_order(&self, id: &str, request: EditOrderRequest, actor: &Actor) -> OrderResult<Order> {
        let existing = self.load(id).await?;
        lifecycle::ensure_editable(&existing)?;

        let status = lifecycle::edit_target(existing.status, request.status)?;
        check_contact(status, &request.customer_name, &request.mobile_number)?;
        let priced = pricing::price_items(&request.items)?;
        lifecycle::require_items(status, priced.lines.len())?;
        let shipping_cost = resolve_shipping_cost(request.shipping_cost)?;

        let updated = Order {
            id: existing.id.clone(),
            customer_name: request.customer_name.trim().to_string(),
            mobile_number: Masked(request.mobile_number.trim().to_string()),
            address: clean_text(request.address),
            shipping_method: request.shipping_method.unwrap_or(existing.shipping_method),
            shipping_cost,
            total_selling_price: priced.total_selling_price,
            total_cost_price: priced.total_cost_price,
            net_profit: priced.net_profit(),
            status,
            notes: clean_text(request.notes),
            items: priced.to_order_items(&existing.id),
            created_by_id: existing.created_by_id,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        let audit = AuditLogEntry::new(
            Some(actor.user_id),
            AuditAction::EditOrder,
            id,
            Some(existing.snapshot()),
            Some(updated.snapshot()),
        );

        if !self.repo.replace_order(&updated, &audit).await? {
            return Err(OrderError::NotFound(id.to_string()));
        }

        info!("Order {} edited ({} -> {})", id, existing.status, updated.status);
        Ok(updated)
    }

    /// Apply a status change. The effective status may differ from the one
    /// requested (Speed Post skips DISPATCHED).
    pub async fn change_status(&self, id: &str, requested: OrderStatus, actor: &Actor) -> OrderResult<Order> {
        let existing = self.load(id).await?;
        let transition = lifecycle::resolve(&existing, requested);

        let mut after = existing.clone();
        after.status = transition.to;
        after.net_profit = transition.net_profit;

        let update = StatusUpdate {
            order_id: existing.id.clone(),
            from: transition.from,
            to: transition.to,
            net_profit: transition.net_profit,
            audit: AuditLogEntry::new(
                Some(actor.user_id),
                AuditAction::UpdateOrderStatus,
                id,
                Some(existing.status_snapshot()),
                Some(after.status_snapshot()),
            ),
        };

        let order = self
            .repo
            .update_status(&update)
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))?;

        if transition.to != transition.requested {
            info!(
                "Order {} {} -> {} (requested {}, {})",
                id, transition.from, transition.to, transition.requested, existing.shipping_method
            );
        } else {
            info!("Order {} {} -> {}", id, transition.from, transition.to);
        }
        Ok(order)
    }

    /// Remove an order and its items. Callers restrict this to admins.
    pub async fn delete_order(&self, id: &str, actor: &Actor) -> OrderResult<()> {
        let audit = AuditLogEntry::new(
            Some(actor.user_id),
            AuditAction::DeleteOrder,
            id,
            Some(json!({ "id": id })),
            None,
        );

        if !self.repo.delete_order(id, &audit).await? {
            return Err(OrderError::NotFound(id.to_string()));
        }

        info!("Order {} deleted by {}", id, actor.user_id);
        Ok(())
    }

    pub async fn get_order(&self, id: &str) -> OrderResult<Order> {
        self.load(id).await
    }

    /// Paged listing, newest first. Kicks off a background auto-delivery sweep
    /// that the caller never waits for.
    pub async fn list_orders(&self, query: &OrderQuery) -> OrderResult<OrderListing> {
        if self.settings.sweep_on_list {
            self.sweeper.trigger();
        }

        let page = self.repo.list_orders(&query.filter(), query.page).await?;
        debug!("Listed {} of {} orders", page.orders.len(), page.total);

        Ok(OrderListing {
            total_pages: query.page.total_pages(page.total),
            page: query.page.number,
            total: page.total,
            orders: page.orders,
            stats: ListingStats {
                total_sales: page.total_sales,
                total_profit: page.total_profit,
            },
        })
    }

    pub async fn order_stats(&self) -> OrderResult<OrderStats> {
        let totals = self.repo.status_totals(None).await?;
        Ok(reports::order_stats(&totals))
    }

    pub async fn dashboard_stats(&self, date_range: Option<DateRange>) -> OrderResult<DashboardStats> {
        let totals = self.repo.status_totals(date_range).await?;
        Ok(reports::dashboard_stats(&totals))
    }

    pub async fn export_orders(&self, query: &ExportQuery) -> OrderResult<Vec<ExportRow>> {
        let orders = self.repo.find_orders(&query.filter()).await?;
        debug!("Exporting {} orders", orders.len());
        Ok(orders.iter().map(ExportRow::from_order).collect())
    }

    /// Audit history of one order, oldest first. Kept after deletion.
    pub async fn audit_trail(&self, id: &str) -> OrderResult<Vec<AuditLogEntry>> {
        Ok(self.repo.audit_trail(id).await?)
    }

    async fn load(&self, id: &str) -> OrderResult<Order> {
        self.repo
            .get_order(id)
            .await?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }
}
