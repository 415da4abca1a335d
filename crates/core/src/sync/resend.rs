//! Resend-request processing.
//!
//! The platform publishes the days (and optionally stations) it wants
//! resent. Matching queue rows get their attempt counters reset so they
//! re-enter the pipeline on the next drain; closings also drop their batch
//! id so they count as pending again.

use std::sync::Arc;

use cashlink_domain::{Result, StoreConfig};
use chrono::NaiveDate;
use tracing::{info, warn};

use super::ports::{ClosingsQueue, RetailClient, SalesQueue};

/// Rows re-armed for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResendReport {
    pub sales: usize,
    pub closings: usize,
}

pub struct ResendService {
    sales: Arc<dyn SalesQueue>,
    closings: Arc<dyn ClosingsQueue>,
    client: Arc<dyn RetailClient>,
}

impl ResendService {
    pub fn new(
        sales: Arc<dyn SalesQueue>,
        closings: Arc<dyn ClosingsQueue>,
        client: Arc<dyn RetailClient>,
    ) -> Self {
        Self { sales, closings, client }
    }

    /// Query both resend endpoints for a store and re-arm the matching rows.
    pub async fn run_store(&self, store: &StoreConfig) -> Result<ResendReport> {
        let mut report = ResendReport::default();

        for request in self.client.fetch_sales_resend_requests(store).await? {
            let Some(date) = parse_date(&request.date) else {
                warn!(date = %request.date, "unparseable date in sales resend request");
                continue;
            };
            report.sales += self
                .sales
                .reset_for_resend(store.erp_company_id, date, request.station_code.as_deref())
                .await?;
        }

        for request in self.client.fetch_closing_resend_requests(store).await? {
            let Some(date) = parse_date(&request.date) else {
                warn!(date = %request.date, "unparseable date in closing resend request");
                continue;
            };
            report.closings += self
                .closings
                .reset_for_resend(store.erp_company_id, date, request.station_code.as_deref())
                .await?;
        }

        if report.sales > 0 || report.closings > 0 {
            info!(
                company_id = store.erp_company_id,
                sales = report.sales,
                closings = report.closings,
                "re-armed rows after platform resend request"
            );
        }
        Ok(report)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
