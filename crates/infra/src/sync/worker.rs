//! The outer sync cadence.
//!
//! One worker drives every cadence against a single clock: sales and
//! closings sync every cycle, promotions on their own longer interval, a
//! startup scan for missing daily closings, and the one-shot bulk-load
//! switch. The sleep between cycles is interruptible by the stop signal;
//! stopping never aborts an in-flight pass. Join handles are tracked and
//! cancellation is explicit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cashlink_core::sync::ports::ClosingsQueue;
use cashlink_core::{
    ClosingsSyncService, PromotionsSyncService, SalesSyncService, SyncSettings,
};
use cashlink_domain::constants::CLOSING_LOOKBACK_DAYS;
use cashlink_domain::AppConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHandle;

/// Worker lifecycle knobs (the cycle interval itself lives in the config
/// file and is re-read every cycle).
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Join timeout when stopping.
    pub join_timeout: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self { join_timeout: Duration::from_secs(5) }
    }
}

/// The services one cycle is composed of.
#[derive(Clone)]
pub struct SyncDeps {
    pub sales: Arc<SalesSyncService>,
    pub closings: Arc<ClosingsSyncService>,
    pub promotions: Arc<PromotionsSyncService>,
    pub closings_queue: Arc<dyn ClosingsQueue>,
}

/// Sync worker with explicit lifecycle management.
pub struct SyncWorker {
    config_handle: ConfigHandle,
    deps: SyncDeps,
    sync_gate: Arc<Mutex<()>>,
    config: SyncWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn new(
        config_handle: ConfigHandle,
        deps: SyncDeps,
        sync_gate: Arc<Mutex<()>>,
        config: SyncWorkerConfig,
    ) -> Self {
        Self {
            config_handle,
            deps,
            sync_gate,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the worker, spawning the background cycle task.
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }

        info!("Starting sync worker");
        self.cancellation = CancellationToken::new();

        let handle = self.config_handle.clone();
        let deps = self.deps.clone();
        let gate = Arc::clone(&self.sync_gate);
        let cancel = self.cancellation.clone();

        let task = tokio::spawn(async move {
            Self::run_loop(handle, deps, gate, cancel).await;
        });

        self.task_handle = Some(task);
        info!("Sync worker started");
        Ok(())
    }

    /// Stop the worker and wait for the cycle task to finish. An in-flight
    /// pass runs to completion; only the next cycle is prevented.
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!("Stopping sync worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Worker task panicked: {}", e);
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!("Worker task did not complete within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        info!("Sync worker stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn run_loop(
        config_handle: ConfigHandle,
        deps: SyncDeps,
        gate: Arc<Mutex<()>>,
        cancel: CancellationToken,
    ) {
        // The original catches up on missing closings once at startup; the
        // cron scheduler owns the daily repeat.
        if let Ok(config) = config_handle.reload() {
            Self::scan_missing_closings(&config, &deps).await;
        }

        let mut last_promotions: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                debug!("sync worker loop cancelled");
                break;
            }

            let config = match config_handle.reload() {
                Ok(config) => config,
                Err(err) => {
                    error!(error = %err, "failed to reload configuration; skipping cycle");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(60)) => continue,
                    }
                }
            };

            if !config.general.enabled {
                warn!("integration disabled in configuration; worker exiting");
                break;
            }

            Self::run_cycle(&config, &deps, &gate, &mut last_promotions).await;

            // The bulk-load switch holds for exactly one cycle.
            if config.general.initial_bulk_load {
                if let Err(err) = config_handle.clear_initial_bulk_load() {
                    error!(error = %err, "failed to clear initial bulk load switch");
                }
            }

            let interval = Duration::from_secs(config.general.cycle_interval_secs);
            debug!(interval_secs = interval.as_secs(), "cycle finished; sleeping");
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("sync worker sleep interrupted");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One cycle over every configured store. A failure in one cadence is
    /// logged and never prevents the others or the next cycle.
    async fn run_cycle(
        config: &AppConfig,
        deps: &SyncDeps,
        gate: &Arc<Mutex<()>>,
        last_promotions: &mut Option<Instant>,
    ) {
        if config.stores.is_empty() {
            warn!("no stores configured; nothing to sync");
            return;
        }

        let settings = SyncSettings {
            resend_cutoff: config.general.resend_cutoff,
            bulk_load: config.general.initial_bulk_load,
            ..SyncSettings::default()
        };

        let promotions_due = last_promotions.map_or(true, |at| {
            at.elapsed() >= Duration::from_secs(config.general.promotions_interval_secs)
        });
        let mut promotions_clean = promotions_due;

        for store in &config.stores {
            if let Err(err) = store.validate() {
                // A store-level configuration fault only skips that store.
                error!(
                    company_id = store.erp_company_id,
                    error = %err,
                    "store configuration invalid; skipping"
                );
                continue;
            }

            let _guard = gate.lock().await;

            if promotions_due {
                if let Err(err) = deps.promotions.run_store(store).await {
                    error!(
                        company_id = store.erp_company_id,
                        error = %err,
                        "promotions refresh failed"
                    );
                    promotions_clean = false;
                }
            }

            if let Err(err) = deps.sales.run_store(store, &settings).await {
                error!(
                    company_id = store.erp_company_id,
                    error = %err,
                    "sales sync failed"
                );
            }

            if let Err(err) = deps.closings.run_store(store).await {
                error!(
                    company_id = store.erp_company_id,
                    error = %err,
                    "closings sync failed"
                );
            }
        }

        if promotions_clean {
            *last_promotions = Some(Instant::now());
        }
    }

    async fn scan_missing_closings(config: &AppConfig, deps: &SyncDeps) {
        let today = chrono::Local::now().date_naive();
        for store in &config.stores {
            match deps
                .closings_queue
                .enqueue_missing(store.erp_company_id, CLOSING_LOOKBACK_DAYS, today)
                .await
            {
                Ok(created) if created > 0 => {
                    info!(
                        company_id = store.erp_company_id,
                        created, "startup scan enqueued missing closings"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    error!(
                        company_id = store.erp_company_id,
                        error = %err,
                        "startup closing scan failed"
                    );
                }
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
