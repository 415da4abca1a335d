//! Cashlink - POS to retail-platform synchronization daemon.
//!
//! Wires configuration, storage and the sync services together, then runs
//! the cycle worker and the daily-closing scheduler until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use cashlink_core::{
    ClosingsSyncService, PromotionsSyncService, ResendService, SalesSyncService,
};
use cashlink_infra::config::ConfigHandle;
use cashlink_infra::database::{
    DbManager, SqliteClosingsRepository, SqliteEventLogRepository, SqlitePromotionsRepository,
    SqliteSalesRepository,
};
use cashlink_infra::payload::{SqlClosingPayloadBuilder, SqlSalePayloadBuilder};
use cashlink_infra::scheduling::ClosingScheduler;
use cashlink_infra::sync::{ForceSyncRunner, SyncDeps, SyncWorker, SyncWorkerConfig};
use cashlink_infra::{RetailApiClient, Transport};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging first so configuration problems are visible.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cashlink=debug")),
        )
        .init();

    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => info!(error = %err, "no .env file loaded"),
    }

    let config_handle = ConfigHandle::resolve(None).context("resolving configuration file")?;
    let config = config_handle.reload().context("loading configuration")?;

    let manager = Arc::new(
        DbManager::new(&config.general.database.path, config.general.database.pool_size)
            .context("opening database")?,
    );
    manager.run_migrations().context("applying schema migrations")?;
    manager.health_check().context("database health check")?;

    // Repositories and adapters.
    let sales_repo = Arc::new(SqliteSalesRepository::new(Arc::clone(&manager)));
    let events_repo = Arc::new(SqliteEventLogRepository::new(Arc::clone(&manager)));
    let closings_repo = Arc::new(SqliteClosingsRepository::new(Arc::clone(&manager)));
    let promotions_repo = Arc::new(SqlitePromotionsRepository::new(Arc::clone(&manager)));
    let sale_builder = Arc::new(SqlSalePayloadBuilder::new(Arc::clone(&manager)));
    let closing_builder = Arc::new(SqlClosingPayloadBuilder::new(Arc::clone(&manager)));
    let client = Arc::new(RetailApiClient::new(
        Transport::new(&config.general).context("building transport")?,
    ));

    // Use cases.
    let sales = Arc::new(SalesSyncService::new(
        sales_repo.clone(),
        events_repo,
        sale_builder,
        client.clone(),
    ));
    let closings = Arc::new(ClosingsSyncService::new(
        closings_repo.clone(),
        closing_builder,
        client.clone(),
    ));
    let promotions = Arc::new(PromotionsSyncService::new(promotions_repo, client.clone()));
    let resend = Arc::new(ResendService::new(
        sales_repo.clone(),
        closings_repo.clone(),
        client,
    ));

    // One orchestrator pass at a time, shared with the force-sync path.
    let sync_gate = Arc::new(Mutex::new(()));

    // The force runner is the operator-command surface (e.g. a control
    // socket or tray action); constructing it here keeps the wiring in one
    // place even though the daemon itself only runs the scheduled path.
    let _force = ForceSyncRunner::new(
        sales.clone(),
        closings.clone(),
        resend,
        Arc::clone(&sync_gate),
    );

    let mut worker = SyncWorker::new(
        config_handle,
        SyncDeps {
            sales,
            closings,
            promotions,
            closings_queue: closings_repo.clone(),
        },
        Arc::clone(&sync_gate),
        SyncWorkerConfig::default(),
    );

    let company_ids: Vec<i64> =
        config.stores.iter().map(|store| store.erp_company_id).collect();
    let mut scheduler = ClosingScheduler::new(closings_repo, company_ids);

    worker.start().map_err(anyhow::Error::msg)?;
    scheduler.start().await.context("starting closing scheduler")?;

    info!("cashlink running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("waiting for stop signal")?;
    info!("stop signal received; shutting down");

    if let Err(err) = scheduler.stop().await {
        warn!(error = %err, "closing scheduler did not stop cleanly");
    }
    if let Err(err) = worker.stop().await {
        warn!(error = %err, "sync worker did not stop cleanly");
    }

    info!("cashlink stopped");
    Ok(())
}
