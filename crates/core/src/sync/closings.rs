//! Daily-closing submission.
//!
//! Each pending (company, date) is rendered as one consolidated closing
//! record and submitted under the store's default station. Days without
//! register movement are parked at the attempt ceiling instead of looping.

use std::sync::Arc;

use cashlink_domain::constants::{ERROR_TRUNCATE_LEN, MAX_ATTEMPTS};
use cashlink_domain::{Result, StoreConfig};
use tracing::{debug, info, warn};

use super::ports::{ClosingPayloadBuilder, ClosingsQueue, RetailClient};
use crate::numbering::station_code;

/// Counters for one store's closings pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosingsSyncReport {
    pub sent: usize,
    pub failed: usize,
    pub empty_days: usize,
}

/// Submits pending daily closings, one consolidated record per day.
pub struct ClosingsSyncService {
    queue: Arc<dyn ClosingsQueue>,
    builder: Arc<dyn ClosingPayloadBuilder>,
    client: Arc<dyn RetailClient>,
}

impl ClosingsSyncService {
    pub fn new(
        queue: Arc<dyn ClosingsQueue>,
        builder: Arc<dyn ClosingPayloadBuilder>,
        client: Arc<dyn RetailClient>,
    ) -> Self {
        Self { queue, builder, client }
    }

    /// Run one closings pass for a store.
    pub async fn run_store(&self, store: &StoreConfig) -> Result<ClosingsSyncReport> {
        let mut report = ClosingsSyncReport::default();
        let pending = self.queue.pending_days(store.erp_company_id, MAX_ATTEMPTS).await?;
        if pending.is_empty() {
            debug!(company_id = store.erp_company_id, "no pending closings for store");
            return Ok(report);
        }

        // One consolidated record per day; several stations can share a
        // date, so submitted days are deduplicated within the pass.
        let mut done_dates = Vec::new();
        // The closing batch goes out under the store's location as its
        // station, mirroring how the platform keys closing resends.
        let station = station_code(store.location_id);

        for day in pending {
            if done_dates.contains(&day.closing_date) {
                continue;
            }
            done_dates.push(day.closing_date);

            let record =
                match self.builder.build_closing(store.erp_company_id, day.closing_date).await? {
                    Some(record) => record,
                    None => {
                        info!(
                            company_id = store.erp_company_id,
                            closing_date = %day.closing_date,
                            "no register movement for day; parking closing"
                        );
                        self.queue
                            .mark_no_movement(store.erp_company_id, day.closing_date)
                            .await?;
                        report.empty_days += 1;
                        continue;
                    }
                };

            let result = self
                .client
                .submit_closings_batch(store, &station, std::slice::from_ref(&record))
                .await?;

            if result.is_fully_accepted() {
                let batch_id = result.batch_id.unwrap_or_else(|| "unknown".to_string());
                info!(
                    company_id = store.erp_company_id,
                    closing_date = %day.closing_date,
                    batch_id = %batch_id,
                    "daily closing accepted"
                );
                self.queue
                    .mark_sent(
                        store.erp_company_id,
                        day.closing_date,
                        &batch_id,
                        record.net_sales_amount,
                        record.cancellations_amount,
                    )
                    .await?;
                report.sent += 1;
            } else {
                let message = result
                    .item_errors
                    .first()
                    .map(|e| e.error.message.clone())
                    .or(result.message)
                    .unwrap_or_else(|| format!("HTTP {}", result.http_status));
                warn!(
                    company_id = store.erp_company_id,
                    closing_date = %day.closing_date,
                    message = %message,
                    "daily closing rejected"
                );
                let message: String = message.chars().take(ERROR_TRUNCATE_LEN).collect();
                self.queue
                    .mark_failed(store.erp_company_id, day.closing_date, &message)
                    .await?;
                report.failed += 1;
            }
        }

        Ok(report)
    }
}
