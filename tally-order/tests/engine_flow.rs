use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tally_core::{Actor, DateRange, Page};
use tally_order::{
    shipping, CreateOrderRequest, EditOrderRequest, EngineSettings, ExportQuery, InMemoryOrderRepository,
    LineItemInput, Order, OrderError, OrderManager, OrderQuery, OrderRepository, OrderStatus, ShippingMethod,
};
use tally_shared::{AuditAction, Masked};
use uuid::Uuid;

fn engine() -> (Arc<InMemoryOrderRepository>, OrderManager) {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let settings = EngineSettings { sweep_on_list: false, ..Default::default() };
    (repo.clone(), OrderManager::new(repo, settings))
}

fn staff() -> Actor {
    Actor::staff(Uuid::new_v4())
}

fn two_line_request(method: ShippingMethod, shipping_cost: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Nimali Perera".to_string(),
        mobile_number: "0771234567".to_string(),
        address: Some("45 Temple Road, Kandy".to_string()),
        shipping_method: Some(method),
        shipping_cost: Some(shipping_cost),
        items: vec![
            LineItemInput::manual("Batik Shirt", 3, dec!(100), dec!(150)),
            LineItemInput::manual("Clay Pot", 1, dec!(200), dec!(300)),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_cod_order_end_to_end() {
    let (_, engine) = engine();
    let actor = staff();

    let shipping_cost = shipping::shipping_cost(500, dec!(750), "COD");
    let order = engine
        .create_order(two_line_request(ShippingMethod::Cod, shipping_cost), &actor)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_selling_price, dec!(750));
    assert_eq!(order.total_cost_price, dec!(500));
    assert_eq!(order.net_profit, dec!(250));
    assert_eq!(order.shipping_cost, shipping_cost);

    let dispatched = engine.change_status(&order.id, OrderStatus::Dispatched, &actor).await.unwrap();
    assert_eq!(dispatched.status, OrderStatus::Dispatched);
    assert_eq!(dispatched.net_profit, dec!(250));

    let returned = engine.change_status(&order.id, OrderStatus::Returned, &actor).await.unwrap();
    assert_eq!(returned.status, OrderStatus::Returned);
    assert_eq!(returned.net_profit, -shipping_cost);

    let trail = engine.audit_trail(&order.id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail.iter().all(|e| e.action == AuditAction::UpdateOrderStatus));
    assert!(trail.iter().all(|e| e.user_id == Some(actor.user_id)));
    assert_eq!(trail[1].new_value.as_ref().unwrap()["status"], "RETURNED");
}

#[tokio::test]
async fn test_speed_post_dispatch_lands_in_delivered() {
    let (_, engine) = engine();
    let actor = staff();

    let order = engine
        .create_order(two_line_request(ShippingMethod::SpeedPost, dec!(250)), &actor)
        .await
        .unwrap();
    let updated = engine.change_status(&order.id, OrderStatus::Dispatched, &actor).await.unwrap();

    assert_eq!(updated.status, OrderStatus::Delivered);
    assert_eq!(updated.net_profit, dec!(250));

    let trail = engine.audit_trail(&order.id).await.unwrap();
    assert_eq!(trail[0].new_value.as_ref().unwrap()["status"], "DELIVERED");
}

#[tokio::test]
async fn test_delivered_order_can_still_be_returned() {
    let (_, engine) = engine();
    let actor = staff();

    let order = engine
        .create_order(two_line_request(ShippingMethod::Cod, dec!(300)), &actor)
        .await
        .unwrap();
    engine.change_status(&order.id, OrderStatus::Delivered, &actor).await.unwrap();
    let returned = engine.change_status(&order.id, OrderStatus::Returned, &actor).await.unwrap();
    assert_eq!(returned.net_profit, dec!(-300));

    let restored = engine.change_status(&order.id, OrderStatus::Delivered, &actor).await.unwrap();
    assert_eq!(restored.net_profit, dec!(250));
}

#[tokio::test]
async fn test_draft_without_items_but_not_pending() {
    let (_, engine) = engine();
    let actor = staff();

    let draft = engine
        .create_order(
            CreateOrderRequest { status: Some(OrderStatus::Draft), ..Default::default() },
            &actor,
        )
        .await
        .unwrap();
    assert_eq!(draft.status, OrderStatus::Draft);
    assert_eq!(draft.shipping_method, ShippingMethod::Cod);
    assert_eq!(draft.total_selling_price, Decimal::ZERO);
    assert!(draft.items.is_empty());

    let mut pending = two_line_request(ShippingMethod::Cod, dec!(0));
    pending.items.clear();
    let err = engine.create_order(pending, &actor).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let (repo, engine) = engine();
    let actor = staff();

    let mut no_mobile = two_line_request(ShippingMethod::Cod, dec!(0));
    no_mobile.mobile_number = "  ".to_string();
    assert!(matches!(engine.create_order(no_mobile, &actor).await, Err(OrderError::Validation(_))));

    let mut delivered = two_line_request(ShippingMethod::Cod, dec!(0));
    delivered.status = Some(OrderStatus::Delivered);
    assert!(matches!(engine.create_order(delivered, &actor).await, Err(OrderError::Validation(_))));

    let negative_shipping = two_line_request(ShippingMethod::Cod, dec!(-1));
    assert!(matches!(engine.create_order(negative_shipping, &actor).await, Err(OrderError::Validation(_))));

    let mut zero_qty = two_line_request(ShippingMethod::Cod, dec!(0));
    zero_qty.items[0].quantity = 0;
    assert!(matches!(engine.create_order(zero_qty, &actor).await, Err(OrderError::Validation(_))));

    assert_eq!(repo.find_orders(&Default::default()).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_edit_replaces_items_and_recomputes() {
    let (_, engine) = engine();
    let actor = staff();

    let order = engine
        .create_order(two_line_request(ShippingMethod::SpeedPost, dec!(250)), &actor)
        .await
        .unwrap();

    let edit = EditOrderRequest {
        customer_name: "Nimali Perera".to_string(),
        mobile_number: "0771234567".to_string(),
        items: vec![LineItemInput::manual("Silk Saree", 2, dec!(1000), dec!(1800))],
        ..Default::default()
    };
    let edited = engine.edit_order(&order.id, edit, &actor).await.unwrap();

    assert_eq!(edited.id, order.id);
    assert_eq!(edited.created_at, order.created_at);
    assert_eq!(edited.shipping_method, ShippingMethod::SpeedPost);
    assert_eq!(edited.shipping_cost, Decimal::ZERO);
    assert_eq!(edited.address, None);
    assert_eq!(edited.items.len(), 1);
    assert_eq!(edited.total_selling_price, dec!(3600));
    assert_eq!(edited.net_profit, dec!(1600));
    assert!(edited.totals_match_items());

    let stored = engine.get_order(&order.id).await.unwrap();
    assert_eq!(stored, edited);

    let trail = engine.audit_trail(&order.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::EditOrder);
    assert_eq!(trail[0].previous_value.as_ref().unwrap()["items"].as_array().unwrap().len(), 2);
    assert_eq!(trail[0].new_value.as_ref().unwrap()["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_edit_is_gated_on_status() {
    let (_, engine) = engine();
    let actor = staff();

    let order = engine
        .create_order(two_line_request(ShippingMethod::Cod, dec!(300)), &actor)
        .await
        .unwrap();
    engine.change_status(&order.id, OrderStatus::Delivered, &actor).await.unwrap();

    let edit = EditOrderRequest {
        customer_name: "Someone Else".to_string(),
        mobile_number: "0700000000".to_string(),
        items: vec![LineItemInput::manual("Mug", 1, dec!(1), dec!(2))],
        ..Default::default()
    };
    let err = engine.edit_order(&order.id, edit, &actor).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidState { status: OrderStatus::Delivered, .. }));
}

#[tokio::test]
async fn test_draft_is_finalized_by_edit() {
    let (_, engine) = engine();
    let actor = staff();

    let draft = engine
        .create_order(
            CreateOrderRequest { status: Some(OrderStatus::Draft), ..Default::default() },
            &actor,
        )
        .await
        .unwrap();

    let empty_pending = EditOrderRequest {
        customer_name: "Kasun".to_string(),
        mobile_number: "0711112222".to_string(),
        status: Some(OrderStatus::Pending),
        ..Default::default()
    };
    let err = engine.edit_order(&draft.id, empty_pending, &actor).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let to_dispatched = EditOrderRequest { status: Some(OrderStatus::Dispatched), ..Default::default() };
    let err = engine.edit_order(&draft.id, to_dispatched, &actor).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let finalize = EditOrderRequest {
        customer_name: "Kasun".to_string(),
        mobile_number: "0711112222".to_string(),
        status: Some(OrderStatus::Pending),
        items: vec![LineItemInput::manual("Mug", 2, dec!(150), dec!(400))],
        ..Default::default()
    };
    let pending = engine.edit_order(&draft.id, finalize, &actor).await.unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);
    assert_eq!(pending.net_profit, dec!(500));
}

#[tokio::test]
async fn test_delete_keeps_audit_trail() {
    let (_, engine) = engine();
    let admin = Actor::admin(Uuid::new_v4());

    let order = engine
        .create_order(two_line_request(ShippingMethod::Cod, dec!(300)), &staff())
        .await
        .unwrap();
    engine.delete_order(&order.id, &admin).await.unwrap();

    assert!(matches!(engine.get_order(&order.id).await, Err(OrderError::NotFound(_))));
    assert!(matches!(engine.delete_order(&order.id, &admin).await, Err(OrderError::NotFound(_))));

    let trail = engine.audit_trail(&order.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::DeleteOrder);
    assert_eq!(trail[0].user_id, Some(admin.user_id));
    assert_eq!(trail[0].previous_value.as_ref().unwrap()["id"], order.id.as_str());
}

fn seeded(id: &str, status: OrderStatus, method: ShippingMethod, sales: Decimal, profit: Decimal, age_days: i64) -> Order {
    let created = Utc::now() - Duration::days(age_days);
    Order {
        id: id.to_string(),
        customer_name: format!("Customer {}", id),
        mobile_number: Masked::from("0770000000"),
        address: None,
        shipping_method: method,
        shipping_cost: dec!(300),
        total_selling_price: sales,
        total_cost_price: sales - profit,
        net_profit: profit,
        status,
        notes: None,
        items: vec![],
        created_by_id: None,
        created_at: created,
        updated_at: created,
    }
}

#[tokio::test]
async fn test_listing_pages_newest_first_with_filter_totals() {
    let (repo, engine) = engine();
    for n in 0..5 {
        let order = seeded(&format!("ORD-{}", n), OrderStatus::Pending, ShippingMethod::Cod, dec!(100), dec!(40), n);
        repo.insert_order(&order).await.unwrap();
    }
    repo.insert_order(&seeded("ORD-R", OrderStatus::Returned, ShippingMethod::Cod, dec!(100), dec!(-300), 0))
        .await
        .unwrap();

    let query = OrderQuery {
        status: Some(OrderStatus::Pending),
        page: Page::new(2, 2),
        ..Default::default()
    };
    let listing = engine.list_orders(&query).await.unwrap();

    assert_eq!(listing.total, 5);
    assert_eq!(listing.total_pages, 3);
    assert_eq!(listing.page, 2);
    let ids: Vec<&str> = listing.orders.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, ["ORD-2", "ORD-3"]);
    assert_eq!(listing.stats.total_sales, dec!(500));
    assert_eq!(listing.stats.total_profit, dec!(200));

    let search = OrderQuery { search: Some("customer ord-r".to_string()), ..Default::default() };
    let found = engine.list_orders(&search).await.unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.orders[0].id, "ORD-R");
}

#[tokio::test]
async fn test_listing_triggers_auto_delivery() {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let engine = OrderManager::new(repo.clone(), EngineSettings::default());
    repo.insert_order(&seeded("ORD-OLD", OrderStatus::Dispatched, ShippingMethod::SpeedPost, dec!(900), dec!(300), 5))
        .await
        .unwrap();

    engine.list_orders(&OrderQuery::default()).await.unwrap();

    let mut status = OrderStatus::Dispatched;
    for _ in 0..50 {
        status = repo.get_order("ORD-OLD").await.unwrap().unwrap().status;
        if status == OrderStatus::Delivered {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_empty_listing_has_no_pages() {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let engine = OrderManager::new(repo.clone(), EngineSettings::default());

    let listing = engine.list_orders(&OrderQuery::default()).await.unwrap();
    assert_eq!(listing.total, 0);
    assert_eq!(listing.total_pages, 0);
}

#[tokio::test]
async fn test_sweeper_is_idempotent_and_audited() {
    let (repo, engine) = engine();
    repo.insert_order(&seeded("ORD-SP", OrderStatus::Pending, ShippingMethod::SpeedPost, dec!(500), dec!(200), 4))
        .await
        .unwrap();
    repo.insert_order(&seeded("ORD-NEW", OrderStatus::Pending, ShippingMethod::SpeedPost, dec!(500), dec!(200), 1))
        .await
        .unwrap();

    let sweeper = engine.sweeper();
    assert_eq!(sweeper.sweep().await.unwrap(), 1);
    assert_eq!(sweeper.sweep().await.unwrap(), 0);

    let delivered = engine.get_order("ORD-SP").await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.net_profit, dec!(200));
    assert_eq!(engine.get_order("ORD-NEW").await.unwrap().status, OrderStatus::Pending);

    let trail = engine.audit_trail("ORD-SP").await.unwrap();
    assert_eq!(trail.len(), 1);
    assert!(trail[0].user_id.is_none());
}

#[tokio::test]
async fn test_stats_and_dashboard() {
    let (repo, engine) = engine();
    let orders = [
        seeded("ORD-1", OrderStatus::Pending, ShippingMethod::Cod, dec!(1000), dec!(400), 0),
        seeded("ORD-2", OrderStatus::Dispatched, ShippingMethod::Cod, dec!(500), dec!(100), 0),
        seeded("ORD-3", OrderStatus::Delivered, ShippingMethod::Cod, dec!(2000), dec!(700), 0),
        seeded("ORD-4", OrderStatus::Returned, ShippingMethod::Cod, dec!(750), dec!(-300), 0),
        seeded("ORD-5", OrderStatus::Delivered, ShippingMethod::Cod, dec!(999), dec!(99), 40),
    ];
    for order in &orders {
        repo.insert_order(order).await.unwrap();
    }

    let stats = engine.order_stats().await.unwrap();
    assert_eq!(stats.total_sales, dec!(5249));
    assert_eq!(stats.total_profit, dec!(999));
    assert_eq!(stats.status_stats[&OrderStatus::Delivered].count, 2);

    let today = Utc::now().date_naive();
    let dashboard = engine
        .dashboard_stats(DateRange::from_days(Some(today - Duration::days(7)), Some(today)))
        .await
        .unwrap();
    assert_eq!(dashboard.total_sales, dec!(3500));
    assert_eq!(dashboard.total_profit, dec!(900));
    assert_eq!(dashboard.outstanding_revenue, dec!(1500));
    assert_eq!(dashboard.status_counts.delivered, 1);
    assert_eq!(dashboard.status_counts.returned, 1);
    assert_eq!(dashboard.status_counts.cancelled, 0);
}

#[tokio::test]
async fn test_export_filters_and_formats() {
    let (_, engine) = engine();
    let actor = staff();

    let order = engine
        .create_order(two_line_request(ShippingMethod::Cod, dec!(316)), &actor)
        .await
        .unwrap();
    engine.change_status(&order.id, OrderStatus::Delivered, &actor).await.unwrap();

    let rows = engine
        .export_orders(&ExportQuery { status: Some(OrderStatus::Delivered), date_range: None })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].items, "Batik Shirt (x3), Clay Pot (x1)");
    assert_eq!(rows[0].mobile, "0771234567");
    assert_eq!(rows[0].status, OrderStatus::Delivered);

    let long_ago = NaiveDate::from_ymd_opt(2001, 1, 1);
    let empty = engine
        .export_orders(&ExportQuery { status: None, date_range: DateRange::from_days(long_ago, long_ago) })
        .await
        .unwrap();
    assert!(empty.is_empty());
}
