//! Sales sync orchestration.
//!
//! Drains the pending-sales queue grouped by (company, station): each group
//! is paged oldest-first, stale and orphaned rows are dropped, reversals
//! whose original sale was never acknowledged get that sale reconstructed
//! and submitted first, and the surviving rows are batched, submitted and
//! reconciled until a drain comes back empty.

use std::collections::HashSet;
use std::sync::Arc;

use cashlink_domain::constants::{ERROR_TRUNCATE_LEN, MAX_ATTEMPTS, PAGE_SIZE};
use cashlink_domain::{
    BatchStatus, EventType, PendingSale, Result, SaleEvent, StationGroup, StoreConfig,
};
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::ports::{BuildMode, EventLogStore, RetailClient, SalePayloadBuilder, SalesQueue};
use super::reconciler::{reconcile, ItemDisposition, SaleOutcome, SubmittedItem};
use crate::numbering::{parse_receipt, station_code};

/// Per-cycle knobs, rebuilt from configuration on every cycle.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Rows at or above this attempt count are left for the operator.
    pub max_attempts: i32,
    /// Rows drained per page.
    pub page_size: usize,
    /// Records dated before this day are discarded, never submitted.
    pub resend_cutoff: Option<NaiveDate>,
    /// One-shot override: ignore the cutoff for this cycle.
    pub bulk_load: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            page_size: PAGE_SIZE,
            resend_cutoff: None,
            bulk_load: false,
        }
    }
}

/// Counters for one store's sales pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SalesSyncReport {
    pub accepted: usize,
    pub rejected: usize,
    pub discarded: usize,
    pub reconstructed: usize,
    pub build_failures: usize,
}

/// Drives the drain → reconstruct → batch → submit → reconcile loop.
pub struct SalesSyncService {
    queue: Arc<dyn SalesQueue>,
    events: Arc<dyn EventLogStore>,
    builder: Arc<dyn SalePayloadBuilder>,
    client: Arc<dyn RetailClient>,
}

impl SalesSyncService {
    pub fn new(
        queue: Arc<dyn SalesQueue>,
        events: Arc<dyn EventLogStore>,
        builder: Arc<dyn SalePayloadBuilder>,
        client: Arc<dyn RetailClient>,
    ) -> Self {
        Self { queue, events, builder, client }
    }

    /// Run one full sales pass for a store.
    pub async fn run_store(
        &self,
        store: &StoreConfig,
        settings: &SyncSettings,
    ) -> Result<SalesSyncReport> {
        let cutoff = if settings.bulk_load { None } else { settings.resend_cutoff };
        let mut report = SalesSyncReport::default();

        let groups =
            self.queue.pending_groups(store.erp_company_id, settings.max_attempts).await?;
        if groups.is_empty() {
            debug!(company_id = store.erp_company_id, "no pending sales for store");
            return Ok(report);
        }

        for group in groups {
            self.drain_group(store, &group, cutoff, settings, &mut report).await?;
        }

        info!(
            company_id = store.erp_company_id,
            accepted = report.accepted,
            rejected = report.rejected,
            discarded = report.discarded,
            reconstructed = report.reconstructed,
            build_failures = report.build_failures,
            "sales pass finished"
        );
        Ok(report)
    }

    async fn drain_group(
        &self,
        store: &StoreConfig,
        group: &StationGroup,
        cutoff: Option<NaiveDate>,
        settings: &SyncSettings,
        report: &mut SalesSyncReport,
    ) -> Result<()> {
        let station = station_code(group.station_id);
        debug!(
            company_id = group.company_id,
            station = %station,
            "draining station group"
        );

        // Rows that failed this cycle are not retried until the next one.
        let mut sidelined: HashSet<i64> = HashSet::new();

        loop {
            let page =
                self.queue.fetch_page(group, settings.max_attempts, settings.page_size).await?;
            let fresh: Vec<&PendingSale> =
                page.iter().filter(|item| !sidelined.contains(&item.transaction_id)).collect();
            if fresh.is_empty() {
                break;
            }

            let mut records = Vec::with_capacity(fresh.len());
            let mut submitted = Vec::with_capacity(fresh.len());
            for item in fresh {
                match self.prepare_item(store, group, &station, item, cutoff, report).await? {
                    Some((record, entry)) => {
                        records.push(record);
                        submitted.push(entry);
                    }
                    None => {
                        sidelined.insert(item.transaction_id);
                    }
                }
            }

            if records.is_empty() {
                continue;
            }

            info!(
                company_id = group.company_id,
                station = %station,
                count = records.len(),
                "submitting sales batch"
            );
            let result = self.client.submit_sales_batch(store, &station, &records).await?;
            let outcomes = reconcile(&submitted, &result);
            self.queue.commit_outcomes(group, &outcomes).await?;
            for outcome in &outcomes {
                if matches!(outcome.disposition, ItemDisposition::Rejected { .. }) {
                    sidelined.insert(outcome.transaction_id);
                }
            }
            tally(&outcomes, report);

            if result.status != BatchStatus::Accepted {
                // Batch-level failure: leave the remaining rows for the next
                // cycle instead of re-hitting a failing host.
                warn!(
                    company_id = group.company_id,
                    station = %station,
                    http_status = result.http_status,
                    message = result.message.as_deref().unwrap_or(""),
                    "batch submission failed; deferring group to next cycle"
                );
                break;
            }
        }

        Ok(())
    }

    /// Vet one queue row. Returns the wire record plus its reconciliation
    /// identity, or `None` when the row was discarded, failed, or deferred.
    async fn prepare_item(
        &self,
        store: &StoreConfig,
        group: &StationGroup,
        station: &str,
        item: &PendingSale,
        cutoff: Option<NaiveDate>,
        report: &mut SalesSyncReport,
    ) -> Result<Option<(cashlink_domain::SaleRecord, SubmittedItem)>> {
        if let Some(cutoff) = cutoff {
            if item.recorded_on < cutoff {
                info!(
                    transaction_id = item.transaction_id,
                    recorded_on = %item.recorded_on,
                    cutoff = %cutoff,
                    "discarding stale record"
                );
                self.queue.discard(group, item.transaction_id).await?;
                report.discarded += 1;
                return Ok(None);
            }
        }

        let Some(event_type) = item.kind.event_type() else {
            self.queue
                .mark_failed(group, item.transaction_id, "daily closing row on the sales queue")
                .await?;
            report.build_failures += 1;
            return Ok(None);
        };

        // Already acknowledged: the queue row is an orphaned trigger.
        if self.events.has_event(group.company_id, item.transaction_id, event_type).await? {
            debug!(
                transaction_id = item.transaction_id,
                event_type = %event_type,
                "event already logged; removing orphaned queue row"
            );
            self.queue.discard(group, item.transaction_id).await?;
            report.discarded += 1;
            return Ok(None);
        }

        // A reversal can only be accepted once its sale exists remotely.
        if item.kind.is_reversal()
            && !self
                .events
                .has_event(group.company_id, item.transaction_id, EventType::Sale)
                .await?
            && !self.reconstruct_sale(store, group, station, item, report).await?
        {
            return Ok(None);
        }

        match self
            .builder
            .build_sale(group.company_id, item.transaction_id, station, BuildMode::Recorded)
            .await
        {
            Ok(record) => {
                let (receipt_number, reversal) = parse_receipt(&record.number)?;
                let entry = SubmittedItem {
                    transaction_id: item.transaction_id,
                    event_type,
                    receipt_number,
                    reversal,
                    amount: record.total,
                };
                Ok(Some((record, entry)))
            }
            Err(err) => {
                warn!(
                    transaction_id = item.transaction_id,
                    error = %err,
                    "payload build failed"
                );
                self.queue
                    .mark_failed(group, item.transaction_id, &truncate_error(&err.to_string()))
                    .await?;
                report.build_failures += 1;
                Ok(None)
            }
        }
    }

    /// Synthesize and submit the missing sale behind a reversal. The sale
    /// event must be durably logged before the reversal may enter a batch.
    async fn reconstruct_sale(
        &self,
        store: &StoreConfig,
        group: &StationGroup,
        station: &str,
        item: &PendingSale,
        report: &mut SalesSyncReport,
    ) -> Result<bool> {
        info!(
            transaction_id = item.transaction_id,
            "original sale never acknowledged; reconstructing from cancelled items"
        );

        let record = match self
            .builder
            .build_sale(
                group.company_id,
                item.transaction_id,
                station,
                BuildMode::ReconstructSale,
            )
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.queue
                    .mark_failed(
                        group,
                        item.transaction_id,
                        &truncate_error(&format!("sale reconstruction failed: {err}")),
                    )
                    .await?;
                report.build_failures += 1;
                return Ok(false);
            }
        };

        let result =
            self.client.submit_sales_batch(store, station, std::slice::from_ref(&record)).await?;
        if result.is_fully_accepted() {
            let batch_id = result.batch_id.unwrap_or_else(|| "unknown".to_string());
            self.events
                .record_event(&SaleEvent {
                    transaction_id: item.transaction_id,
                    company_id: group.company_id,
                    event_type: EventType::Sale,
                    station_id: group.station_id,
                    batch_id: batch_id.clone(),
                    amount: record.total,
                    acknowledged_at: Utc::now().timestamp(),
                })
                .await?;
            info!(
                transaction_id = item.transaction_id,
                batch_id = %batch_id,
                "reconstructed sale accepted"
            );
            report.reconstructed += 1;
            Ok(true)
        } else {
            let message = result
                .item_errors
                .first()
                .map(|e| e.error.message.clone())
                .or(result.message)
                .unwrap_or_else(|| format!("HTTP {}", result.http_status));
            warn!(
                transaction_id = item.transaction_id,
                message = %message,
                "platform refused the reconstructed sale"
            );
            self.queue
                .mark_failed(
                    group,
                    item.transaction_id,
                    &truncate_error(&format!("sale reconstruction rejected: {message}")),
                )
                .await?;
            report.rejected += 1;
            Ok(false)
        }
    }
}

fn tally(outcomes: &[SaleOutcome], report: &mut SalesSyncReport) {
    for outcome in outcomes {
        match outcome.disposition {
            ItemDisposition::Accepted { .. } => report.accepted += 1,
            ItemDisposition::Rejected { .. } => report.rejected += 1,
        }
    }
}

fn truncate_error(reason: &str) -> String {
    if reason.chars().count() <= ERROR_TRUNCATE_LEN {
        return reason.to_string();
    }
    let mut truncated: String = reason.chars().take(ERROR_TRUNCATE_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}
