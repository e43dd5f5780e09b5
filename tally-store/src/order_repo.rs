use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tally_core::{DateRange, Page, StoreError, StoreResult};
use tally_order::{
    Order, OrderFilter, OrderItem, OrderPage, OrderRepository, OrderStatus, ShippingMethod, StatusTotals,
    StatusUpdate,
};
use tally_shared::{AuditAction, AuditLogEntry, Masked};
use tracing::debug;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, customer_name, mobile_number, address, shipping_method, shipping_cost, \
     total_selling_price, total_cost_price, net_profit, status, notes, created_by_id, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, product_name, quantity, cost_price, selling_price, total_item_value";

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Unexpected {column} value in database: {value:?}")]
    Decode { column: &'static str, value: String },
}

impl From<RepoError> for StoreError {
    fn from(err: RepoError) -> Self {
        StoreError::backend(err)
    }
}

type RepoResult<T> = Result<T, RepoError>;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_name: String,
    mobile_number: String,
    address: Option<String>,
    shipping_method: String,
    shipping_cost: Decimal,
    total_selling_price: Decimal,
    total_cost_price: Decimal,
    net_profit: Decimal,
    status: String,
    notes: Option<String>,
    created_by_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> RepoResult<Order> {
        let status = self.status.parse::<OrderStatus>().map_err(|_| RepoError::Decode {
            column: "orders.status",
            value: self.status.clone(),
        })?;
        let shipping_method = self.shipping_method.parse::<ShippingMethod>().map_err(|_| RepoError::Decode {
            column: "orders.shipping_method",
            value: self.shipping_method.clone(),
        })?;

        Ok(Order {
            id: self.id,
            customer_name: self.customer_name,
            mobile_number: Masked(self.mobile_number),
            address: self.address,
            shipping_method,
            shipping_cost: self.shipping_cost,
            total_selling_price: self.total_selling_price,
            total_cost_price: self.total_cost_price,
            net_profit: self.net_profit,
            status,
            notes: self.notes,
            items,
            created_by_id: self.created_by_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: String,
    product_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    cost_price: Decimal,
    selling_price: Decimal,
    total_item_value: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            cost_price: row.cost_price,
            selling_price: row.selling_price,
            total_item_value: row.total_item_value,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    action: String,
    target_id: String,
    previous_value: Option<Value>,
    new_value: Option<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = RepoError;

    fn try_from(row: AuditRow) -> RepoResult<Self> {
        let action = row.action.parse::<AuditAction>().map_err(|_| RepoError::Decode {
            column: "audit_logs.action",
            value: row.action.clone(),
        })?;
        Ok(AuditLogEntry {
            id: row.id,
            user_id: row.user_id,
            action,
            target_id: row.target_id,
            previous_value: row.previous_value,
            new_value: row.new_value,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FilterTotalsRow {
    total: i64,
    total_sales: Decimal,
    total_profit: Decimal,
}

#[derive(sqlx::FromRow)]
struct StatusTotalsRow {
    status: String,
    count: i64,
    total_selling_price: Decimal,
    net_profit: Decimal,
}

/// Append the WHERE clause for `filter`. Always emits a WHERE so callers can
/// keep appending with AND.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(method) = filter.shipping_method {
        qb.push(" AND shipping_method = ").push_bind(method.label());
    }
    if let Some(range) = filter.date_range {
        push_date_range(qb, range);
    }
    if let Some(text) = filter.search_text() {
        let pattern = format!("%{}%", escape_like(text));
        qb.push(" AND (customer_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR mobile_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR id ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR address ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_date_range(qb: &mut QueryBuilder<'_, Postgres>, range: DateRange) {
    qb.push(" AND created_at >= ").push_bind(range.from);
    if let Some(until) = range.until {
        qb.push(" AND created_at < ").push_bind(until);
    }
}

async fn insert_items(conn: &mut PgConnection, items: &[OrderItem]) -> RepoResult<()> {
    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, position, product_id, product_name, quantity, cost_price, selling_price, total_item_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id)
        .bind(&item.order_id)
        .bind(position as i32)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.cost_price)
        .bind(item.selling_price)
        .bind(item.total_item_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_audit(conn: &mut PgConnection, entry: &AuditLogEntry) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, target_id, previous_value, new_value, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry.action.as_str())
    .bind(&entry.target_id)
    .bind(&entry.previous_value)
    .bind(&entry.new_value)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Conditional status write; returns whether a row changed
async fn apply_status(conn: &mut PgConnection, update: &StatusUpdate, guard_from: bool) -> RepoResult<bool> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE orders SET status = ");
    qb.push_bind(update.to.as_str())
        .push(", net_profit = ")
        .push_bind(update.net_profit)
        .push(", updated_at = NOW() WHERE id = ")
        .push_bind(update.order_id.as_str());
    if guard_from {
        qb.push(" AND status = ").push_bind(update.from.as_str());
    }

    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }
    insert_audit(conn, &update.audit).await?;
    Ok(true)
}

/// Postgres-backed order storage
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items to a batch of order rows, preserving row order
    async fn hydrate(&self, rows: Vec<OrderRow>) -> RepoResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
            ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            items_by_order.entry(row.order_id.clone()).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let items = items_by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    async fn fetch_order(&self, id: &str) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_order_tx(&self, order: &Order) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_name, mobile_number, address, shipping_method, shipping_cost,
                                total_selling_price, total_cost_price, net_profit, status, notes,
                                created_by_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_name)
        .bind(order.mobile_number.expose())
        .bind(&order.address)
        .bind(order.shipping_method.label())
        .bind(order.shipping_cost)
        .bind(order.total_selling_price)
        .bind(order.total_cost_price)
        .bind(order.net_profit)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(order.created_by_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_items(&mut tx, &order.items).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_order_tx(&self, order: &Order, audit: &AuditLogEntry) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_name = $2, mobile_number = $3, address = $4, shipping_method = $5,
                shipping_cost = $6, total_selling_price = $7, total_cost_price = $8,
                net_profit = $9, status = $10, notes = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_name)
        .bind(order.mobile_number.expose())
        .bind(&order.address)
        .bind(order.shipping_method.label())
        .bind(order.shipping_cost)
        .bind(order.total_selling_price)
        .bind(order.total_cost_price)
        .bind(order.net_profit)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(&order.id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, &order.items).await?;
        insert_audit(&mut tx, audit).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn update_status_tx(&self, update: &StatusUpdate) -> RepoResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;
        if !apply_status(&mut tx, update, false).await? {
            return Ok(None);
        }
        tx.commit().await?;

        self.fetch_order(&update.order_id).await
    }

    async fn bulk_update_status_tx(&self, updates: &[StatusUpdate]) -> RepoResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut applied = Vec::with_capacity(updates.len());

        for update in updates {
            if apply_status(&mut tx, update, true).await? {
                applied.push(update.order_id.clone());
            } else {
                debug!("Order {} left {} before the bulk update, skipped", update.order_id, update.from);
            }
        }

        tx.commit().await?;
        Ok(applied)
    }

    async fn delete_order_tx(&self, id: &str, audit: &AuditLogEntry) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_audit(&mut tx, audit).await?;
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // nothing to delete; dropping the transaction rolls back the audit row
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn find_stale(
        &self,
        shipping_method: ShippingMethod,
        statuses: &[OrderStatus],
        created_before: DateTime<Utc>,
    ) -> RepoResult<Vec<Order>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE shipping_method = $1 AND status = ANY($2) AND created_at < $3",
            ORDER_COLUMNS
        ))
        .bind(shipping_method.label())
        .bind(&statuses)
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;

        // The sweeper only needs the header fields
        rows.into_iter().map(|row| row.into_order(Vec::new())).collect()
    }

    async fn list_page(&self, filter: &OrderFilter, page: Page) -> RepoResult<OrderPage> {
        let mut totals_qb = QueryBuilder::new(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(total_selling_price), 0) AS total_sales, \
             COALESCE(SUM(net_profit), 0) AS total_profit FROM orders",
        );
        push_filter(&mut totals_qb, filter);
        let totals: FilterTotalsRow = totals_qb.build_query_as().fetch_one(&self.pool).await?;

        let mut page_qb = QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
        push_filter(&mut page_qb, filter);
        page_qb
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows: Vec<OrderRow> = page_qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(OrderPage {
            orders: self.hydrate(rows).await?,
            total: totals.total.max(0) as u64,
            total_sales: totals.total_sales,
            total_profit: totals.total_profit,
        })
    }

    async fn find_all(&self, filter: &OrderFilter) -> RepoResult<Vec<Order>> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC");
        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn totals_by_status(&self, date_range: Option<DateRange>) -> RepoResult<Vec<StatusTotals>> {
        let mut qb = QueryBuilder::new(
            "SELECT status, COUNT(*) AS count, \
             COALESCE(SUM(total_selling_price), 0) AS total_selling_price, \
             COALESCE(SUM(net_profit), 0) AS net_profit FROM orders WHERE 1 = 1",
        );
        if let Some(range) = date_range {
            push_date_range(&mut qb, range);
        }
        qb.push(" GROUP BY status ORDER BY status");

        let rows: Vec<StatusTotalsRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let status = row.status.parse::<OrderStatus>().map_err(|_| RepoError::Decode {
                    column: "orders.status",
                    value: row.status.clone(),
                })?;
                Ok(StatusTotals {
                    status,
                    count: row.count.max(0) as u64,
                    total_selling_price: row.total_selling_price,
                    net_profit: row.net_profit,
                })
            })
            .collect()
    }

    async fn audit_for(&self, target_id: &str) -> RepoResult<Vec<AuditLogEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, action, target_id, previous_value, new_value, created_at
            FROM audit_logs
            WHERE target_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        match self.insert_order_tx(order).await {
            Err(RepoError::Sqlx(e)) if is_unique_violation(&e) => Err(StoreError::Duplicate(order.id.clone())),
            other => Ok(other?),
        }
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.fetch_order(id).await?)
    }

    async fn replace_order(&self, order: &Order, audit: &AuditLogEntry) -> StoreResult<bool> {
        Ok(self.replace_order_tx(order, audit).await?)
    }

    async fn update_status(&self, update: &StatusUpdate) -> StoreResult<Option<Order>> {
        Ok(self.update_status_tx(update).await?)
    }

    async fn bulk_update_status(&self, updates: &[StatusUpdate]) -> StoreResult<Vec<String>> {
        Ok(self.bulk_update_status_tx(updates).await?)
    }

    async fn delete_order(&self, id: &str, audit: &AuditLogEntry) -> StoreResult<bool> {
        Ok(self.delete_order_tx(id, audit).await?)
    }

    async fn find_stale_orders(
        &self,
        shipping_method: ShippingMethod,
        statuses: &[OrderStatus],
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        Ok(self.find_stale(shipping_method, statuses, created_before).await?)
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> StoreResult<OrderPage> {
        Ok(self.list_page(filter, page).await?)
    }

    async fn find_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        Ok(self.find_all(filter).await?)
    }

    async fn status_totals(&self, date_range: Option<DateRange>) -> StoreResult<Vec<StatusTotals>> {
        Ok(self.totals_by_status(date_range).await?)
    }

    async fn audit_trail(&self, target_id: &str) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(self.audit_for(target_id).await?)
    }
}
