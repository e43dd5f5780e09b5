mod worker;

use anyhow::Context;
use std::sync::Arc;
use tally_store::{app_config::Config, DbClient, PgOrderRepository};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_worker=debug,tally_order=debug,tally_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tally worker");

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let repo = Arc::new(PgOrderRepository::new(db.pool.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let rules = config.business_rules.clone();
    let sweeper = tokio::spawn(async move { worker::run_auto_delivery(repo, &rules, shutdown_rx).await });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    sweeper.await.context("Sweeper task panicked")?;

    db.pool.close().await;
    Ok(())
}
