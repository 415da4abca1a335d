//! Port interfaces for sync operations

use async_trait::async_trait;
use cashlink_domain::{
    BatchResult, ClosingRecord, EventType, PendingClosing, PendingSale, Promotion, ResendRequest,
    Result, SaleEvent, SaleRecord, StationGroup, StoreConfig,
};
use chrono::NaiveDate;

use super::reconciler::SaleOutcome;

/// Trait for managing the pending-sales queue
#[async_trait]
pub trait SalesQueue: Send + Sync {
    /// Enqueue a transaction for sync
    async fn enqueue(&self, item: &PendingSale) -> Result<()>;

    /// Distinct (company, station) groups that still have eligible rows
    async fn pending_groups(&self, company_id: i64, max_attempts: i32)
        -> Result<Vec<StationGroup>>;

    /// Oldest-first page of eligible rows for one group
    async fn fetch_page(
        &self,
        group: &StationGroup,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<PendingSale>>;

    /// Record a failure on a single row: attempts += 1, diagnostic attached
    async fn mark_failed(&self, group: &StationGroup, transaction_id: i64, error: &str)
        -> Result<()>;

    /// Remove a row without a remote acknowledgment (stale or orphaned work)
    async fn discard(&self, group: &StationGroup, transaction_id: i64) -> Result<()>;

    /// Apply one batch's outcomes in a single durable transaction: accepted
    /// rows get their event logged and leave the queue, rejected rows get
    /// attempts += 1 and the error stored. All or nothing.
    async fn commit_outcomes(&self, group: &StationGroup, outcomes: &[SaleOutcome]) -> Result<()>;

    /// Re-arm rows for a requested day (and optionally station): attempts
    /// reset to zero so they re-enter the pipeline. Returns affected rows.
    async fn reset_for_resend(
        &self,
        company_id: i64,
        date: NaiveDate,
        station_code: Option<&str>,
    ) -> Result<usize>;
}

/// Trait for the durable event log of remote acknowledgments
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Whether an event of this type was already accepted remotely
    async fn has_event(
        &self,
        company_id: i64,
        transaction_id: i64,
        event_type: EventType,
    ) -> Result<bool>;

    /// Record (or refresh) an accepted event. Must be durably committed
    /// before the caller proceeds.
    async fn record_event(&self, event: &SaleEvent) -> Result<()>;
}

/// Trait for managing the pending daily-closings queue
#[async_trait]
pub trait ClosingsQueue: Send + Sync {
    /// Scan the trailing window for (date, station) combinations with
    /// register movement but no pending-closing row, and enqueue them.
    /// Returns the number of rows created.
    async fn enqueue_missing(
        &self,
        company_id: i64,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<usize>;

    /// Days still awaiting submission (no batch id, below the ceiling)
    async fn pending_days(&self, company_id: i64, max_attempts: i32)
        -> Result<Vec<PendingClosing>>;

    /// Record remote acceptance: batch id plus the exact submitted amounts
    async fn mark_sent(
        &self,
        company_id: i64,
        closing_date: NaiveDate,
        batch_id: &str,
        sales_amount: f64,
        cancellations_amount: f64,
    ) -> Result<()>;

    /// Record a failed submission: attempts += 1, diagnostic attached
    async fn mark_failed(&self, company_id: i64, closing_date: NaiveDate, error: &str)
        -> Result<()>;

    /// Park a day that has no register movement at the attempt ceiling so it
    /// is never retried automatically.
    async fn mark_no_movement(&self, company_id: i64, closing_date: NaiveDate) -> Result<()>;

    /// Re-arm closings for a requested day: attempts reset, batch id cleared
    async fn reset_for_resend(
        &self,
        company_id: i64,
        date: NaiveDate,
        station_code: Option<&str>,
    ) -> Result<usize>;
}

/// Trait for the local promotions snapshot
#[async_trait]
pub trait PromotionsStore: Send + Sync {
    /// Replace the snapshot for one company. Returns stored rows.
    async fn replace_for_company(&self, company_id: i64, promotions: &[Promotion])
        -> Result<usize>;
}

/// How a sale payload is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Render the record as stored (sale, cancellation or return).
    Recorded,
    /// Synthesize the original sale from a reversal's cancelled-items
    /// snapshot: positive number, reversal flag off.
    ReconstructSale,
}

/// Trait for rendering sale payloads from local state.
///
/// Implementations must be pure functions of the transaction id plus
/// current database state: two calls without an intervening state change
/// yield byte-identical output (retry safety).
#[async_trait]
pub trait SalePayloadBuilder: Send + Sync {
    async fn build_sale(
        &self,
        company_id: i64,
        transaction_id: i64,
        station_code: &str,
        mode: BuildMode,
    ) -> Result<SaleRecord>;
}

/// Trait for rendering consolidated daily-closing payloads.
#[async_trait]
pub trait ClosingPayloadBuilder: Send + Sync {
    /// `None` when the day has no register movement.
    async fn build_closing(
        &self,
        company_id: i64,
        closing_date: NaiveDate,
    ) -> Result<Option<ClosingRecord>>;
}

/// Trait for the remote retail-platform API
#[async_trait]
pub trait RetailClient: Send + Sync {
    /// POST one movement batch for a station. Expected HTTP failures are
    /// folded into the returned [`BatchResult`], never raised.
    async fn submit_sales_batch(
        &self,
        store: &StoreConfig,
        station_code: &str,
        records: &[SaleRecord],
    ) -> Result<BatchResult>;

    /// POST one daily-closing batch for a station.
    async fn submit_closings_batch(
        &self,
        store: &StoreConfig,
        station_code: &str,
        records: &[ClosingRecord],
    ) -> Result<BatchResult>;

    /// GET the active promotions published for a store.
    async fn fetch_promotions(&self, store: &StoreConfig) -> Result<Vec<Promotion>>;

    /// GET the days the platform wants sales resent for.
    async fn fetch_sales_resend_requests(&self, store: &StoreConfig)
        -> Result<Vec<ResendRequest>>;

    /// GET the days the platform wants closings resent for.
    async fn fetch_closing_resend_requests(
        &self,
        store: &StoreConfig,
    ) -> Result<Vec<ResendRequest>>;
}
