//! Batch-response reconciliation.
//!
//! Maps the per-item accept/reject information of a [`BatchResult`] back
//! onto the items that were submitted. Pure logic; the durable write of the
//! computed outcomes happens in one repository transaction.

use cashlink_domain::{BatchResult, BatchStatus, EventType};
use tracing::warn;

use crate::numbering::parse_receipt;

/// One payload item as it went onto the wire, with enough identity to map a
/// response error back to the local queue row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedItem {
    pub transaction_id: i64,
    pub event_type: EventType,
    pub receipt_number: i64,
    pub reversal: bool,
    /// Exact header total submitted; stored on the event log for audit.
    pub amount: f64,
}

/// Fate of one submitted item after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDisposition {
    /// Write the event log row and remove the item from the queue.
    Accepted { event_type: EventType, batch_id: String, amount: f64 },
    /// Keep the item queued; attempts += 1, diagnostic attached.
    Rejected { message: String },
}

/// Outcome for one queue row, keyed by transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOutcome {
    pub transaction_id: i64,
    pub disposition: ItemDisposition,
}

/// Interpret a batch result for the given submitted items.
///
/// - `Accepted` with no item errors: every item accepted.
/// - `Accepted` with item errors: items whose (receipt, sign) matches an
///   error are rejected with that error's message; the rest are accepted.
/// - `Rejected`/`TransportFailure`: every item rejected with the shared
///   batch-level message.
///
/// An error number that matches no submitted item is a reportable anomaly:
/// it is logged and the rest of the batch is reconciled normally.
pub fn reconcile(submitted: &[SubmittedItem], result: &BatchResult) -> Vec<SaleOutcome> {
    match result.status {
        BatchStatus::Accepted => reconcile_accepted(submitted, result),
        BatchStatus::Rejected | BatchStatus::TransportFailure => {
            let message = result
                .message
                .clone()
                .unwrap_or_else(|| format!("batch failed with HTTP {}", result.http_status));
            submitted
                .iter()
                .map(|item| SaleOutcome {
                    transaction_id: item.transaction_id,
                    disposition: ItemDisposition::Rejected { message: message.clone() },
                })
                .collect()
        }
    }
}

fn reconcile_accepted(submitted: &[SubmittedItem], result: &BatchResult) -> Vec<SaleOutcome> {
    let batch_id = result.batch_id.clone().unwrap_or_else(|| "unknown".to_string());

    // (receipt, sign) -> rejection message, built from the response errors.
    let mut rejections: Vec<((i64, bool), String)> = Vec::new();
    for item_error in &result.item_errors {
        match parse_receipt(&item_error.number) {
            Ok(key) => {
                let message = if item_error.error.message.is_empty() {
                    "rejected by the remote platform".to_string()
                } else {
                    item_error.error.message.clone()
                };
                if !submitted
                    .iter()
                    .any(|item| (item.receipt_number, item.reversal) == key)
                {
                    warn!(
                        number = %item_error.number,
                        message = %message,
                        "batch error references a record that was not submitted"
                    );
                }
                rejections.push((key, message));
            }
            Err(err) => {
                warn!(
                    number = %item_error.number,
                    error = %err,
                    "unparseable record number in batch errors; ignoring entry"
                );
            }
        }
    }

    submitted
        .iter()
        .map(|item| {
            let key = (item.receipt_number, item.reversal);
            let rejection = rejections.iter().find(|(k, _)| *k == key);
            let disposition = match rejection {
                Some((_, message)) => ItemDisposition::Rejected { message: message.clone() },
                None => ItemDisposition::Accepted {
                    event_type: item.event_type,
                    batch_id: batch_id.clone(),
                    amount: item.amount,
                },
            };
            SaleOutcome { transaction_id: item.transaction_id, disposition }
        })
        .collect()
}
