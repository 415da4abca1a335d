//! Renders the consolidated daily closing for one (company, date).

use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::footing::round2;
use cashlink_core::sync::ports::ClosingPayloadBuilder;
use cashlink_domain::{CashlinkError, ClosingRecord, Result};
use chrono::NaiveDate;
use rusqlite::params;
use tokio::task;
use tracing::debug;

use crate::database::DbManager;
use crate::errors::InfraError;

pub struct SqlClosingPayloadBuilder {
    db: Arc<DbManager>,
}

impl SqlClosingPayloadBuilder {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const CLOSING_SUMS_SQL: &str = "SELECT
        COALESCE(SUM(CASE WHEN entry_kind = 'sale' THEN total ELSE 0 END), 0),
        COALESCE(SUM(CASE WHEN entry_kind = 'cancellation' THEN total ELSE 0 END), 0),
        COALESCE(SUM(CASE WHEN entry_kind = 'return' THEN total ELSE 0 END), 0),
        COALESCE(SUM(CASE WHEN entry_kind = 'sale' THEN 1 ELSE 0 END), 0),
        COALESCE(SUM(CASE WHEN entry_kind IN ('cancellation', 'return') THEN 1 ELSE 0 END), 0)
    FROM register
    WHERE company_id = ?1 AND recorded_on = ?2";

#[async_trait]
impl ClosingPayloadBuilder for SqlClosingPayloadBuilder {
    async fn build_closing(
        &self,
        company_id: i64,
        closing_date: NaiveDate,
    ) -> Result<Option<ClosingRecord>> {
        let db = Arc::clone(&self.db);
        let date = closing_date.format("%Y-%m-%d").to_string();

        task::spawn_blocking(move || -> Result<Option<ClosingRecord>> {
            let conn = db.get_connection()?;
            let (gross_sales, cancellations, returns, sale_count, reversal_count): (
                f64,
                f64,
                f64,
                i64,
                i64,
            ) = conn
                .query_row(CLOSING_SUMS_SQL, params![company_id, date], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })
                .map_err(|err| CashlinkError::from(InfraError::from(err)))?;

            if sale_count == 0 && reversal_count == 0 {
                debug!(company_id, closing_date = %date, "no movement for closing");
                return Ok(None);
            }

            Ok(Some(ClosingRecord {
                sales_date: date,
                // Returns reduce the day's net revenue; cancellations were
                // voided before completion and only count on the reversal
                // side.
                net_sales_amount: round2(gross_sales - returns),
                cancellations_amount: round2(cancellations + returns),
                movement_count: sale_count + reversal_count,
                cancellation_count: reversal_count,
            }))
        })
        .await
        .map_err(|err| CashlinkError::Internal(format!("closing build task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqlClosingPayloadBuilder, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");
        let manager = DbManager::new(&db_path, 2).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        let manager = Arc::new(manager);
        let builder = SqlClosingPayloadBuilder::new(Arc::clone(&manager));
        (builder, manager, temp_dir)
    }

    fn insert_register(mgr: &DbManager, transaction_id: i64, entry_kind: &str, total: f64) {
        let conn = mgr.get_connection().expect("conn");
        conn.execute(
            "INSERT INTO register (
                transaction_id, company_id, station_id, entry_kind, receipt_number,
                total, recorded_on, cash_amount
            ) VALUES (?1, 1, 3, ?2, ?1, ?3, '2025-08-04', ?3)",
            params![transaction_id, entry_kind, total],
        )
        .expect("register row");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closing_aggregates_the_day() {
        let (builder, mgr, _tmp) = setup().await;
        insert_register(&mgr, 1, "sale", 100.0);
        insert_register(&mgr, 2, "sale", 50.0);
        insert_register(&mgr, 3, "return", 20.0);
        insert_register(&mgr, 4, "cancellation", 15.0);

        let record = builder
            .build_closing(1, NaiveDate::from_ymd_opt(2025, 8, 4).unwrap())
            .await
            .expect("build")
            .expect("record");

        assert_eq!(record.sales_date, "2025-08-04");
        assert!((record.net_sales_amount - 130.0).abs() < 0.01);
        assert!((record.cancellations_amount - 35.0).abs() < 0.01);
        assert_eq!(record.movement_count, 4);
        assert_eq!(record.cancellation_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn day_without_movement_builds_nothing() {
        let (builder, _mgr, _tmp) = setup().await;

        let record = builder
            .build_closing(1, NaiveDate::from_ymd_opt(2025, 8, 4).unwrap())
            .await
            .expect("build");

        assert!(record.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_days_and_companies_are_excluded() {
        let (builder, mgr, _tmp) = setup().await;
        insert_register(&mgr, 1, "sale", 100.0);
        {
            let conn = mgr.get_connection().expect("conn");
            conn.execute(
                "INSERT INTO register (
                    transaction_id, company_id, station_id, entry_kind, receipt_number,
                    total, recorded_on, cash_amount
                ) VALUES (9, 2, 3, 'sale', 9, 500.0, '2025-08-04', 500.0)",
                [],
            )
            .expect("other company row");
        }

        let record = builder
            .build_closing(1, NaiveDate::from_ymd_opt(2025, 8, 4).unwrap())
            .await
            .expect("build")
            .expect("record");

        assert!((record.net_sales_amount - 100.0).abs() < 0.01);
        assert_eq!(record.movement_count, 1);
    }
}
