//! SQLite implementation of the pending-closings queue port.

use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::sync::ports::ClosingsQueue;
use cashlink_domain::constants::{ERROR_TRUNCATE_LEN, MAX_ATTEMPTS};
use cashlink_domain::{PendingClosing, Result};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Row};
use tokio::task;
use tracing::info;

use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteClosingsRepository {
    db: Arc<DbManager>,
}

impl SqliteClosingsRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const CLOSING_PENDING_SQL: &str = "SELECT
        company_id, closing_date, station_id, attempts, last_error, batch_id,
        sales_amount, cancellations_amount, enqueued_at, last_attempted_at
    FROM pending_closings
    WHERE company_id = ?1 AND attempts < ?2 AND batch_id IS NULL
    ORDER BY closing_date ASC";

const CLOSING_STATIONS_WITH_MOVEMENT_SQL: &str = "SELECT DISTINCT station_id
    FROM register
    WHERE company_id = ?1 AND recorded_on = ?2";

const CLOSING_EXISTS_SQL: &str = "SELECT COUNT(*) FROM pending_closings
    WHERE company_id = ?1 AND closing_date = ?2 AND station_id = ?3";

const CLOSING_INSERT_SQL: &str = "INSERT INTO pending_closings (
        company_id, closing_date, station_id, attempts, enqueued_at
    ) VALUES (?1, ?2, ?3, 0, CAST(strftime('%s','now') AS INTEGER))";

#[async_trait]
impl ClosingsQueue for SqliteClosingsRepository {
    async fn enqueue_missing(
        &self,
        company_id: i64,
        days_back: i64,
        today: NaiveDate,
    ) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let mut created = 0usize;

            let mut day = today - Duration::days(days_back);
            while day < today {
                let date = day.format("%Y-%m-%d").to_string();

                let stations: Vec<i64> = {
                    let mut stmt = conn
                        .prepare(CLOSING_STATIONS_WITH_MOVEMENT_SQL)
                        .map_err(map_sql_error)?;
                    let rows = stmt
                        .query_map(params![company_id, date], |row| row.get(0))
                        .map_err(map_sql_error)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
                };

                for station_id in stations {
                    let exists: i64 = conn
                        .query_row(
                            CLOSING_EXISTS_SQL,
                            params![company_id, date, station_id],
                            |row| row.get(0),
                        )
                        .map_err(map_sql_error)?;
                    if exists == 0 {
                        conn.execute(
                            CLOSING_INSERT_SQL,
                            params![company_id, date, station_id],
                        )
                        .map_err(map_sql_error)?;
                        info!(
                            company_id,
                            closing_date = %date,
                            station_id,
                            "enqueued missing daily closing"
                        );
                        created += 1;
                    }
                }

                day += Duration::days(1);
            }

            Ok(created)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_days(
        &self,
        company_id: i64,
        max_attempts: i32,
    ) -> Result<Vec<PendingClosing>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<PendingClosing>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(CLOSING_PENDING_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![company_id, max_attempts], map_closing_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_sent(
        &self,
        company_id: i64,
        closing_date: NaiveDate,
        batch_id: &str,
        sales_amount: f64,
        cancellations_amount: f64,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let date = closing_date.format("%Y-%m-%d").to_string();
        let batch_id = batch_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE pending_closings
                 SET batch_id = ?1,
                     sales_amount = ?2,
                     cancellations_amount = ?3,
                     last_error = NULL,
                     last_attempted_at = CAST(strftime('%s','now') AS INTEGER)
                 WHERE company_id = ?4 AND closing_date = ?5",
                params![batch_id, sales_amount, cancellations_amount, company_id, date],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_failed(
        &self,
        company_id: i64,
        closing_date: NaiveDate,
        error: &str,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let date = closing_date.format("%Y-%m-%d").to_string();
        let error = truncate(error);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE pending_closings
                 SET attempts = attempts + 1,
                     last_error = ?1,
                     last_attempted_at = CAST(strftime('%s','now') AS INTEGER)
                 WHERE company_id = ?2 AND closing_date = ?3",
                params![error, company_id, date],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_no_movement(&self, company_id: i64, closing_date: NaiveDate) -> Result<()> {
        let db = Arc::clone(&self.db);
        let date = closing_date.format("%Y-%m-%d").to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE pending_closings
                 SET attempts = ?1,
                     last_error = 'no register movement for this day',
                     last_attempted_at = CAST(strftime('%s','now') AS INTEGER)
                 WHERE company_id = ?2 AND closing_date = ?3",
                params![MAX_ATTEMPTS, company_id, date],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn reset_for_resend(
        &self,
        company_id: i64,
        date: NaiveDate,
        station_code: Option<&str>,
    ) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let date = date.format("%Y-%m-%d").to_string();
        let station_id = station_code.and_then(parse_station_code);

        task::spawn_blocking(move || -> Result<usize> {
            let conn = db.get_connection()?;
            let affected = match station_id {
                Some(station_id) => conn
                    .execute(
                        "UPDATE pending_closings
                         SET attempts = 0, last_error = 'resend requested', batch_id = NULL
                         WHERE company_id = ?1 AND closing_date = ?2 AND station_id = ?3",
                        params![company_id, date, station_id],
                    )
                    .map_err(map_sql_error)?,
                None => conn
                    .execute(
                        "UPDATE pending_closings
                         SET attempts = 0, last_error = 'resend requested', batch_id = NULL
                         WHERE company_id = ?1 AND closing_date = ?2",
                        params![company_id, date],
                    )
                    .map_err(map_sql_error)?,
            };
            Ok(affected)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_closing_row(row: &Row<'_>) -> rusqlite::Result<PendingClosing> {
    let date_raw: String = row.get(1)?;
    let closing_date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;

    Ok(PendingClosing {
        company_id: row.get(0)?,
        closing_date,
        station_id: row.get(2)?,
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        batch_id: row.get(5)?,
        sales_amount: row.get(6)?,
        cancellations_amount: row.get(7)?,
        enqueued_at: row.get(8)?,
        last_attempted_at: row.get(9)?,
    })
}

fn parse_station_code(code: &str) -> Option<i64> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    match digits.trim_start_matches('0').parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if !digits.is_empty() => Some(0),
        Err(_) => None,
    }
}

fn truncate(reason: &str) -> String {
    if reason.chars().count() <= ERROR_TRUNCATE_LEN {
        return reason.to_string();
    }
    let mut truncated: String = reason.chars().take(ERROR_TRUNCATE_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteClosingsRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");
        let manager = DbManager::new(&db_path, 4).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        let manager = Arc::new(manager);
        let repo = SqliteClosingsRepository::new(Arc::clone(&manager));
        (repo, manager, temp_dir)
    }

    fn insert_register_row(
        mgr: &DbManager,
        transaction_id: i64,
        station_id: i64,
        recorded_on: &str,
    ) {
        let conn = mgr.get_connection().expect("conn");
        conn.execute(
            "INSERT INTO register (
                transaction_id, company_id, station_id, entry_kind, receipt_number,
                total, recorded_on, cash_amount
            ) VALUES (?1, 1, ?2, 'sale', ?1, 10.0, ?3, 10.0)",
            params![transaction_id, station_id, recorded_on],
        )
        .expect("insert register row");
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_closings_are_enqueued_per_station() {
        let (repo, mgr, _tmp) = setup().await;
        insert_register_row(&mgr, 1, 3, "2025-08-04");
        insert_register_row(&mgr, 2, 5, "2025-08-04");
        insert_register_row(&mgr, 3, 3, "2025-08-05");

        let created =
            repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("enqueue missing");
        assert_eq!(created, 3);

        // A second scan finds nothing new.
        let created =
            repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("second scan");
        assert_eq!(created, 0);

        let pending = repo.pending_days(1, MAX_ATTEMPTS).await.expect("pending");
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].closing_date, date(2025, 8, 4));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn today_is_never_enqueued() {
        let (repo, mgr, _tmp) = setup().await;
        insert_register_row(&mgr, 1, 3, "2025-08-06");

        let created =
            repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("enqueue missing");
        assert_eq!(created, 0, "the current day is still trading");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sent_closings_leave_the_pending_set() {
        let (repo, mgr, _tmp) = setup().await;
        insert_register_row(&mgr, 1, 3, "2025-08-04");
        repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("enqueue");

        repo.mark_sent(1, date(2025, 8, 4), "L-31", 1234.56, 78.90)
            .await
            .expect("mark sent");

        assert!(repo.pending_days(1, MAX_ATTEMPTS).await.expect("pending").is_empty());

        let conn = mgr.get_connection().expect("conn");
        let (batch_id, sales_amount): (String, f64) = conn
            .query_row(
                "SELECT batch_id, sales_amount FROM pending_closings
                 WHERE company_id = 1 AND closing_date = '2025-08-04'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(batch_id, "L-31");
        assert!((sales_amount - 1234.56).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_closings_accumulate_attempts() {
        let (repo, mgr, _tmp) = setup().await;
        insert_register_row(&mgr, 1, 3, "2025-08-04");
        repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("enqueue");

        for _ in 0..MAX_ATTEMPTS {
            repo.mark_failed(1, date(2025, 8, 4), "period locked").await.expect("fail");
        }

        assert!(
            repo.pending_days(1, MAX_ATTEMPTS).await.expect("pending").is_empty(),
            "stalled closing requires operator action"
        );

        let reset = repo
            .reset_for_resend(1, date(2025, 8, 4), None)
            .await
            .expect("reset");
        assert_eq!(reset, 1);
        assert_eq!(repo.pending_days(1, MAX_ATTEMPTS).await.expect("pending").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_movement_days_are_parked() {
        let (repo, mgr, _tmp) = setup().await;
        insert_register_row(&mgr, 1, 3, "2025-08-04");
        repo.enqueue_missing(1, 7, date(2025, 8, 6)).await.expect("enqueue");

        repo.mark_no_movement(1, date(2025, 8, 4)).await.expect("park");

        assert!(repo.pending_days(1, MAX_ATTEMPTS).await.expect("pending").is_empty());
        let conn = mgr.get_connection().expect("conn");
        let error: String = conn
            .query_row(
                "SELECT last_error FROM pending_closings WHERE closing_date = '2025-08-04'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(error.contains("no register movement"));
    }
}
