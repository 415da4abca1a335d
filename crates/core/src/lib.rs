//! # Cashlink Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the store, payload builders and
//!   the remote platform client
//! - The sync use cases: sales orchestration, closings, promotions, resend
//!   processing and batch reconciliation
//! - Pure helpers: receipt-number codec, footing arithmetic, text
//!   sanitization
//!
//! ## Architecture Principles
//! - Only depends on `cashlink-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod footing;
pub mod numbering;
pub mod sanitize;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::closings::{ClosingsSyncReport, ClosingsSyncService};
pub use sync::orchestrator::{SalesSyncReport, SalesSyncService, SyncSettings};
pub use sync::promotions::PromotionsSyncService;
pub use sync::reconciler::{reconcile, ItemDisposition, SaleOutcome, SubmittedItem};
pub use sync::resend::{ResendReport, ResendService};
pub use sync::ports::{
    BuildMode, ClosingPayloadBuilder, ClosingsQueue, EventLogStore, PromotionsStore,
    RetailClient, SalePayloadBuilder, SalesQueue,
};
