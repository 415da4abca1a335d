//! Operator-triggered "send now" for one store.
//!
//! Runs on its own task but takes the same sync gate as the cycle worker
//! before touching the store, so a manual trigger can never interleave with
//! a scheduled pass. The caller gets a completion handle to await or poll
//! instead of a blocked thread.

use std::sync::Arc;

use cashlink_core::{
    ClosingsSyncReport, ClosingsSyncService, ResendReport, ResendService, SalesSyncReport,
    SalesSyncService, SyncSettings,
};
use cashlink_domain::{CashlinkError, Result, StoreConfig};
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

/// What the operator asked to flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTarget {
    Sales,
    Closings,
}

/// Result of one forced pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceSyncOutcome {
    pub resend: ResendReport,
    pub sales: Option<SalesSyncReport>,
    pub closings: Option<ClosingsSyncReport>,
}

/// Completion handle for a forced pass: await it, or poll it from a UI
/// tick without blocking.
pub struct ForceSyncHandle {
    rx: oneshot::Receiver<Result<ForceSyncOutcome>>,
}

impl ForceSyncHandle {
    /// Wait for the forced pass to finish.
    pub async fn outcome(self) -> Result<ForceSyncOutcome> {
        self.rx.await.map_err(|_| {
            CashlinkError::Internal("force sync task dropped before reporting".into())
        })?
    }

    /// Non-blocking check; `None` while the pass is still running.
    pub fn try_outcome(&mut self) -> Option<Result<ForceSyncOutcome>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(CashlinkError::Internal(
                "force sync task dropped before reporting".into(),
            ))),
        }
    }
}

pub struct ForceSyncRunner {
    sales: Arc<SalesSyncService>,
    closings: Arc<ClosingsSyncService>,
    resend: Arc<ResendService>,
    sync_gate: Arc<Mutex<()>>,
}

impl ForceSyncRunner {
    pub fn new(
        sales: Arc<SalesSyncService>,
        closings: Arc<ClosingsSyncService>,
        resend: Arc<ResendService>,
        sync_gate: Arc<Mutex<()>>,
    ) -> Self {
        Self { sales, closings, resend, sync_gate }
    }

    /// Kick off a forced pass for one store and return immediately.
    pub fn trigger(
        &self,
        store: StoreConfig,
        settings: SyncSettings,
        target: ForceTarget,
    ) -> ForceSyncHandle {
        let (tx, rx) = oneshot::channel();
        let sales = Arc::clone(&self.sales);
        let closings = Arc::clone(&self.closings);
        let resend = Arc::clone(&self.resend);
        let gate = Arc::clone(&self.sync_gate);

        tokio::spawn(async move {
            info!(company_id = store.erp_company_id, ?target, "forced sync requested");
            let result =
                Self::run(&sales, &closings, &resend, &gate, &store, &settings, target).await;
            if let Err(err) = &result {
                error!(
                    company_id = store.erp_company_id,
                    error = %err,
                    "forced sync failed"
                );
            }
            // The caller may have dropped the handle; that is fine.
            let _ = tx.send(result);
        });

        ForceSyncHandle { rx }
    }

    async fn run(
        sales: &SalesSyncService,
        closings: &ClosingsSyncService,
        resend: &ResendService,
        gate: &Mutex<()>,
        store: &StoreConfig,
        settings: &SyncSettings,
        target: ForceTarget,
    ) -> Result<ForceSyncOutcome> {
        store.validate()?;
        let _guard = gate.lock().await;

        let mut outcome = ForceSyncOutcome::default();

        // Check what the platform wants resent first, as the original
        // operator action does; a failure here never blocks the flush.
        match resend.run_store(store).await {
            Ok(report) => outcome.resend = report,
            Err(err) => {
                error!(
                    company_id = store.erp_company_id,
                    error = %err,
                    "resend check failed; continuing with pending rows"
                );
            }
        }

        match target {
            ForceTarget::Sales => {
                outcome.sales = Some(sales.run_store(store, settings).await?);
            }
            ForceTarget::Closings => {
                outcome.closings = Some(closings.run_store(store).await?);
            }
        }

        info!(company_id = store.erp_company_id, ?target, "forced sync finished");
        Ok(outcome)
    }
}
