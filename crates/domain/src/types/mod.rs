//! Domain types and models

pub mod batch;
pub mod queue;
pub mod wire;

pub use batch::{BatchResult, BatchStatus};
pub use queue::{EventType, PendingClosing, PendingSale, RecordKind, SaleEvent, StationGroup};
pub use wire::{
    BatchResponse, ClosingRecord, ItemError, ItemErrorDetail, Promotion, ResendRequest,
    SaleLine, SalePayment, SaleRecord,
};
