//! Ephemeral batch submission outcome, produced by the transport layer and
//! consumed by the reconciler. Never persisted.

use serde::{Deserialize, Serialize};

use super::wire::ItemError;

/// Overall fate of one batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// HTTP 2xx. Individual items may still be rejected via `item_errors`.
    Accepted,
    /// Terminal HTTP failure (4xx) or a 5xx returned by the last host.
    Rejected,
    /// Every configured host was exhausted without an HTTP response.
    TransportFailure,
}

/// Result of submitting one batch to the remote platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    /// HTTP status of the final response; synthetic 503 on transport failure.
    pub http_status: u16,
    /// Present when the platform accepted the batch.
    pub batch_id: Option<String>,
    /// Per-item rejections inside an accepted batch.
    pub item_errors: Vec<ItemError>,
    /// Transport- or batch-level diagnostic.
    pub message: Option<String>,
}

impl BatchResult {
    pub fn accepted(http_status: u16, batch_id: Option<String>, item_errors: Vec<ItemError>) -> Self {
        Self { status: BatchStatus::Accepted, http_status, batch_id, item_errors, message: None }
    }

    pub fn rejected(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            status: BatchStatus::Rejected,
            http_status,
            batch_id: None,
            item_errors: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: BatchStatus::TransportFailure,
            http_status: 503,
            batch_id: None,
            item_errors: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Accepted with no per-item rejections.
    pub fn is_fully_accepted(&self) -> bool {
        self.status == BatchStatus::Accepted && self.item_errors.is_empty()
    }
}
