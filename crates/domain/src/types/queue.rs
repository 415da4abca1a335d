//! Queue and event-log row types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of a locally recorded transaction awaiting remote acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Sale,
    Cancellation,
    Return,
    DailyClosing,
}

crate::impl_status_conversions!(RecordKind {
    Sale => "sale",
    Cancellation => "cancellation",
    Return => "return",
    DailyClosing => "daily_closing",
});

impl RecordKind {
    /// True for records that reverse a previously recorded sale.
    pub fn is_reversal(self) -> bool {
        matches!(self, Self::Cancellation | Self::Return)
    }

    /// The event the remote platform acknowledges for this record.
    ///
    /// Daily closings are tracked on their own table and never produce a
    /// sale event.
    pub fn event_type(self) -> Option<EventType> {
        match self {
            Self::Sale => Some(EventType::Sale),
            Self::Cancellation => Some(EventType::Cancellation),
            Self::Return => Some(EventType::Return),
            Self::DailyClosing => None,
        }
    }
}

/// Remotely acknowledged event kinds. A cancellation and the sale it cancels
/// are tracked as separate events on the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Sale,
    Cancellation,
    Return,
}

crate::impl_status_conversions!(EventType {
    Sale => "sale",
    Cancellation => "cancellation",
    Return => "return",
});

/// One pending sale/cancellation/return awaiting remote acceptance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSale {
    pub transaction_id: i64,
    pub company_id: i64,
    pub station_id: i64,
    pub kind: RecordKind,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub enqueued_at: i64,
    pub last_attempted_at: Option<i64>,
    /// Business date of the underlying transaction; compared against the
    /// resend cutoff.
    pub recorded_on: NaiveDate,
}

/// One pending daily closing for a (company, date, station).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingClosing {
    pub company_id: i64,
    pub closing_date: NaiveDate,
    pub station_id: i64,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub batch_id: Option<String>,
    pub sales_amount: Option<f64>,
    pub cancellations_amount: Option<f64>,
    pub enqueued_at: i64,
    pub last_attempted_at: Option<i64>,
}

/// Durable proof that a specific event for a transaction was accepted
/// remotely. Unique per (transaction, company, event type).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleEvent {
    pub transaction_id: i64,
    pub company_id: i64,
    pub event_type: EventType,
    pub station_id: i64,
    pub batch_id: String,
    /// Exact monetary value submitted, stored for audit; never re-derived.
    pub amount: f64,
    pub acknowledged_at: i64,
}

/// One (company, station) unit of queue work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationGroup {
    pub company_id: i64,
    pub station_id: i64,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn reversal_kinds() {
        assert!(RecordKind::Cancellation.is_reversal());
        assert!(RecordKind::Return.is_reversal());
        assert!(!RecordKind::Sale.is_reversal());
        assert!(!RecordKind::DailyClosing.is_reversal());
    }

    #[test]
    fn record_kind_maps_to_event_type() {
        assert_eq!(RecordKind::Sale.event_type(), Some(EventType::Sale));
        assert_eq!(RecordKind::Cancellation.event_type(), Some(EventType::Cancellation));
        assert_eq!(RecordKind::Return.event_type(), Some(EventType::Return));
        assert_eq!(RecordKind::DailyClosing.event_type(), None);
    }

    #[test]
    fn event_type_roundtrips_through_storage_form() {
        for event in [EventType::Sale, EventType::Cancellation, EventType::Return] {
            assert_eq!(EventType::from_str(&event.to_string()).unwrap(), event);
        }
    }
}
