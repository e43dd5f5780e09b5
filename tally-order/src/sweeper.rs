use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tally_shared::{AuditAction, AuditLogEntry};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::OrderResult;
use crate::lifecycle::{self, AUTO_DELIVERY_METHOD, AUTO_DELIVERY_STATUSES};
use crate::repository::{OrderRepository, StatusUpdate};

/// Moves Speed Post parcels that have been out longer than the dwell time to
/// DELIVERED.
pub struct AutoDeliverySweeper {
    repo: Arc<dyn OrderRepository>,
    dwell: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the triggered sweep ends, even on panic
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AutoDeliverySweeper {
    pub fn new(repo: Arc<dyn OrderRepository>, dwell: Duration) -> Self {
        Self {
            repo,
            dwell,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    pub async fn sweep(&self) -> OrderResult<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// One pass with `now` as the reference clock. Returns how many orders
    /// were moved.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> OrderResult<usize> {
        let cutoff = now - self.dwell;
        let stale = self
            .repo
            .find_stale_orders(AUTO_DELIVERY_METHOD, &AUTO_DELIVERY_STATUSES, cutoff)
            .await?;

        let updates: Vec<StatusUpdate> = stale
            .iter()
            .filter(|order| lifecycle::is_auto_delivery_candidate(order, cutoff))
            .map(|order| {
                let transition = lifecycle::auto_delivery(order);
                let mut after = order.clone();
                after.status = transition.to;
                after.net_profit = transition.net_profit;

                StatusUpdate {
                    order_id: order.id.clone(),
                    from: transition.from,
                    to: transition.to,
                    net_profit: transition.net_profit,
                    audit: AuditLogEntry::new(
                        None,
                        AuditAction::UpdateOrderStatus,
                        order.id.as_str(),
                        Some(order.status_snapshot()),
                        Some(after.status_snapshot()),
                    ),
                }
            })
            .collect();

        if updates.is_empty() {
            debug!("Auto-delivery sweep found nothing older than {}", cutoff);
            return Ok(0);
        }

        let applied = self.repo.bulk_update_status(&updates).await?;
        info!(
            "Auto-delivered {} of {} Speed Post orders created before {}",
            applied.len(),
            updates.len(),
            cutoff
        );
        Ok(applied.len())
    }

    /// Fire-and-forget sweep for the read path.
    ///
    /// Skipped when another triggered sweep is still running or when called
    /// outside a tokio runtime. Failures are logged here and go no further.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, skipping auto-delivery sweep");
                return None;
            }
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Auto-delivery sweep already running, skipping");
            return None;
        }

        let sweeper = Arc::clone(self);
        Some(runtime.spawn(async move {
            let _guard = InFlight(&sweeper.in_flight);
            if let Err(e) = sweeper.sweep().await {
                error!("Auto-delivery sweep failed: {}", e);
            }
        }))
    }

    /// Sweep every `period` until `shutdown` flips to true
    pub async fn run_every(self: Arc<Self>, period: std::time::Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Auto-delivery sweeper started, period {:?}, dwell {}h", period, self.dwell.num_hours());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("Auto-delivery sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Auto-delivery sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryOrderRepository;
    use crate::models::{Order, OrderStatus, ShippingMethod};
    use rust_decimal_macros::dec;
    use tally_shared::Masked;

    fn order(id: &str, method: ShippingMethod, status: OrderStatus, age: Duration, now: DateTime<Utc>) -> Order {
        Order {
            id: id.to_string(),
            customer_name: "Kamal".to_string(),
            mobile_number: Masked::from("0711111111"),
            address: None,
            shipping_method: method,
            shipping_cost: dec!(250),
            total_selling_price: dec!(1000),
            total_cost_price: dec!(600),
            net_profit: dec!(400),
            status,
            notes: None,
            items: vec![],
            created_by_id: None,
            created_at: now - age,
            updated_at: now - age,
        }
    }

    #[tokio::test]
    async fn test_sweep_moves_only_stale_speed_post() {
        let now = Utc::now();
        let repo = Arc::new(InMemoryOrderRepository::new());
        let old = Duration::days(4);
        let seeds = [
            order("ORD-A", ShippingMethod::SpeedPost, OrderStatus::Pending, old, now),
            order("ORD-B", ShippingMethod::SpeedPost, OrderStatus::Dispatched, old, now),
            order("ORD-C", ShippingMethod::SpeedPost, OrderStatus::Pending, Duration::days(1), now),
            order("ORD-D", ShippingMethod::Cod, OrderStatus::Pending, old, now),
            order("ORD-E", ShippingMethod::SpeedPost, OrderStatus::Draft, old, now),
            order("ORD-F", ShippingMethod::SpeedPost, OrderStatus::Returned, old, now),
        ];
        for o in &seeds {
            repo.insert_order(o).await.unwrap();
        }

        let sweeper = AutoDeliverySweeper::new(repo.clone(), Duration::days(3));
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 2);

        let status = |id: &'static str| {
            let repo = repo.clone();
            async move { repo.get_order(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status("ORD-A").await, OrderStatus::Delivered);
        assert_eq!(status("ORD-B").await, OrderStatus::Delivered);
        assert_eq!(status("ORD-C").await, OrderStatus::Pending);
        assert_eq!(status("ORD-D").await, OrderStatus::Pending);
        assert_eq!(status("ORD-E").await, OrderStatus::Draft);
        assert_eq!(status("ORD-F").await, OrderStatus::Returned);

        let delivered = repo.get_order("ORD-A").await.unwrap().unwrap();
        assert_eq!(delivered.net_profit, dec!(400));
    }

    #[tokio::test]
    async fn test_second_sweep_is_a_no_op() {
        let now = Utc::now();
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.insert_order(&order("ORD-A", ShippingMethod::SpeedPost, OrderStatus::Pending, Duration::days(5), now))
            .await
            .unwrap();

        let sweeper = AutoDeliverySweeper::new(repo.clone(), Duration::days(3));
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 1);
        assert_eq!(sweeper.sweep_at(now).await.unwrap(), 0);
        assert_eq!(repo.audit_len().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_audit_has_no_actor() {
        let now = Utc::now();
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.insert_order(&order("ORD-A", ShippingMethod::SpeedPost, OrderStatus::Dispatched, Duration::days(5), now))
            .await
            .unwrap();

        AutoDeliverySweeper::new(repo.clone(), Duration::days(3)).sweep_at(now).await.unwrap();

        let trail = repo.audit_trail("ORD-A").await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::UpdateOrderStatus);
        assert!(trail[0].user_id.is_none());
        assert_eq!(trail[0].new_value.as_ref().unwrap()["status"], "DELIVERED");
        assert_eq!(trail[0].previous_value.as_ref().unwrap()["status"], "DISPATCHED");
    }

    #[tokio::test]
    async fn test_trigger_swallows_storage_failure() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.set_offline(true);
        let sweeper = Arc::new(AutoDeliverySweeper::new(repo, Duration::days(3)));

        let handle = sweeper.trigger().expect("sweep should be spawned");
        handle.await.unwrap();

        assert!(!sweeper.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_trigger_without_runtime_is_skipped() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let sweeper = Arc::new(AutoDeliverySweeper::new(repo, Duration::days(3)));
        assert!(sweeper.trigger().is_none());
    }

    #[tokio::test]
    async fn test_run_every_stops_on_shutdown() {
        let now = Utc::now();
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.insert_order(&order("ORD-A", ShippingMethod::SpeedPost, OrderStatus::Pending, Duration::days(5), now))
            .await
            .unwrap();
        let sweeper = Arc::new(AutoDeliverySweeper::new(repo.clone(), Duration::days(3)));

        let (tx, rx) = watch::channel(false);
        let runner = tokio::spawn(sweeper.run_every(std::time::Duration::from_millis(10), rx));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        let swept = repo.get_order("ORD-A").await.unwrap().unwrap();
        assert_eq!(swept.status, OrderStatus::Delivered);
    }
}
