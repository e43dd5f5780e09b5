use std::sync::Arc;
use tally_order::{AutoDeliverySweeper, EngineSettings, OrderRepository};
use tally_store::app_config::BusinessRules;
use tokio::sync::watch;
use tracing::info;

/// Run the auto-delivery sweeper on the configured interval until `shutdown`
/// fires.
pub async fn run_auto_delivery(
    repo: Arc<dyn OrderRepository>,
    rules: &BusinessRules,
    shutdown: watch::Receiver<bool>,
) {
    let settings = EngineSettings::from(rules);
    let sweeper = Arc::new(AutoDeliverySweeper::new(repo, settings.auto_delivery_after));

    info!(
        "Auto-delivery worker: Speed Post orders older than {} days, every {}s",
        rules.auto_delivery_days, rules.sweep_interval_seconds
    );
    sweeper.run_every(rules.sweep_interval(), shutdown).await;
}
