//! SQLite implementation of the pending-sales queue port.
//!
//! The one strict atomicity requirement of the engine lives here:
//! `commit_outcomes` applies every outcome of one batch inside a single
//! transaction, so a queue row can never disappear without its event-log
//! write landing in the same commit.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::sync::ports::SalesQueue;
use cashlink_core::{ItemDisposition, SaleOutcome};
use cashlink_domain::constants::ERROR_TRUNCATE_LEN;
use cashlink_domain::{PendingSale, RecordKind, Result, StationGroup};
use chrono::NaiveDate;
use rusqlite::{params, Row};
use tokio::task;
use tracing::warn;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-backed pending-sales repository.
pub struct SqliteSalesRepository {
    db: Arc<DbManager>,
}

impl SqliteSalesRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const SALES_INSERT_SQL: &str = "INSERT OR REPLACE INTO pending_sales (
        transaction_id, company_id, station_id, record_kind, attempts, last_error,
        enqueued_at, last_attempted_at, recorded_on
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const SALES_PAGE_SQL: &str = "SELECT
        transaction_id, company_id, station_id, record_kind, attempts, last_error,
        enqueued_at, last_attempted_at, recorded_on
    FROM pending_sales
    WHERE company_id = ?1 AND station_id = ?2 AND attempts < ?3
    ORDER BY enqueued_at ASC
    LIMIT ?4";

const SALES_GROUPS_SQL: &str = "SELECT company_id, station_id
    FROM pending_sales
    WHERE company_id = ?1 AND attempts < ?2
    GROUP BY company_id, station_id
    ORDER BY station_id ASC";

const SALES_FAIL_SQL: &str = "UPDATE pending_sales
    SET attempts = attempts + 1,
        last_error = ?1,
        last_attempted_at = CAST(strftime('%s','now') AS INTEGER)
    WHERE company_id = ?2 AND station_id = ?3 AND transaction_id = ?4";

const SALES_DELETE_SQL: &str = "DELETE FROM pending_sales
    WHERE company_id = ?1 AND station_id = ?2 AND transaction_id = ?3";

const EVENT_UPSERT_SQL: &str = "INSERT INTO sale_events (
        transaction_id, company_id, event_type, station_id, batch_id, amount, acknowledged_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, CAST(strftime('%s','now') AS INTEGER))
    ON CONFLICT (transaction_id, company_id, event_type) DO UPDATE SET
        batch_id = excluded.batch_id,
        amount = excluded.amount,
        station_id = excluded.station_id,
        acknowledged_at = excluded.acknowledged_at";

#[async_trait]
impl SalesQueue for SqliteSalesRepository {
    async fn enqueue(&self, item: &PendingSale) -> Result<()> {
        let db = Arc::clone(&self.db);
        let item = item.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                SALES_INSERT_SQL,
                params![
                    item.transaction_id,
                    item.company_id,
                    item.station_id,
                    item.kind.to_string(),
                    item.attempts,
                    item.last_error,
                    item.enqueued_at,
                    item.last_attempted_at,
                    item.recorded_on.format("%Y-%m-%d").to_string(),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_groups(
        &self,
        company_id: i64,
        max_attempts: i32,
    ) -> Result<Vec<StationGroup>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<StationGroup>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(SALES_GROUPS_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![company_id, max_attempts], |row| {
                    Ok(StationGroup { company_id: row.get(0)?, station_id: row.get(1)? })
                })
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fetch_page(
        &self,
        group: &StationGroup,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<PendingSale>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = Arc::clone(&self.db);
        let group = *group;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        task::spawn_blocking(move || -> Result<Vec<PendingSale>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(SALES_PAGE_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(
                    params![group.company_id, group.station_id, max_attempts, limit],
                    map_pending_row,
                )
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_failed(
        &self,
        group: &StationGroup,
        transaction_id: i64,
        error: &str,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let group = *group;
        let error = truncate(error);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                SALES_FAIL_SQL,
                params![error, group.company_id, group.station_id, transaction_id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn discard(&self, group: &StationGroup, transaction_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let group = *group;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                SALES_DELETE_SQL,
                params![group.company_id, group.station_id, transaction_id],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn commit_outcomes(
        &self,
        group: &StationGroup,
        outcomes: &[SaleOutcome],
    ) -> Result<()> {
        if outcomes.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let group = *group;
        let outcomes = outcomes.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            for outcome in &outcomes {
                match &outcome.disposition {
                    ItemDisposition::Accepted { event_type, batch_id, amount } => {
                        tx.execute(
                            EVENT_UPSERT_SQL,
                            params![
                                outcome.transaction_id,
                                group.company_id,
                                event_type.to_string(),
                                group.station_id,
                                batch_id,
                                amount,
                            ],
                        )
                        .map_err(map_sql_error)?;
                        tx.execute(
                            SALES_DELETE_SQL,
                            params![group.company_id, group.station_id, outcome.transaction_id],
                        )
                        .map_err(map_sql_error)?;
                    }
                    ItemDisposition::Rejected { message } => {
                        tx.execute(
                            SALES_FAIL_SQL,
                            params![
                                truncate(message),
                                group.company_id,
                                group.station_id,
                                outcome.transaction_id,
                            ],
                        )
                        .map_err(map_sql_error)?;
                    }
                }
            }

            tx.commit().map_err(map_sql_error)
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
                        "UPDATE pending_sales
                         SET attempts = 0, last_error = 'resend requested'
                         WHERE company_id = ?1 AND recorded_on = ?2 AND station_id = ?3",
                        params![company_id, date, station_id],
                    )
                    .map_err(map_sql_error)?,
                None => conn
                    .execute(
                        "UPDATE pending_sales
                         SET attempts = 0, last_error = 'resend requested'
                         WHERE company_id = ?1 AND recorded_on = ?2",
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

fn map_pending_row(row: &Row<'_>) -> rusqlite::Result<PendingSale> {
    let transaction_id: i64 = row.get(0)?;
    let kind_raw: String = row.get(3)?;
    let kind = RecordKind::from_str(&kind_raw).unwrap_or_else(|err| {
        warn!(
            transaction_id,
            raw_kind = %kind_raw,
            error = %err,
            "invalid record kind in pending_sales; defaulting to sale"
        );
        RecordKind::Sale
    });
    let recorded_raw: String = row.get(8)?;
    let recorded_on = NaiveDate::parse_from_str(&recorded_raw, "%Y-%m-%d").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;

    Ok(PendingSale {
        transaction_id,
        company_id: row.get(1)?,
        station_id: row.get(2)?,
        kind,
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        enqueued_at: row.get(6)?,
        last_attempted_at: row.get(7)?,
        recorded_on,
    })
}

fn parse_station_code(code: &str) -> Option<i64> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    match digits.trim_start_matches('0').parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) if !digits.is_empty() => Some(0),
        Err(_) => {
            warn!(code, "unparseable station code in resend request");
            None
        }
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
    use cashlink_domain::EventType;
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteSalesRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");
        let manager = DbManager::new(&db_path, 4).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        let manager = Arc::new(manager);
        let repo = SqliteSalesRepository::new(Arc::clone(&manager));
        (repo, manager, temp_dir)
    }

    fn sample(transaction_id: i64, enqueued_at: i64) -> PendingSale {
        PendingSale {
            transaction_id,
            company_id: 1,
            station_id: 3,
            kind: RecordKind::Sale,
            attempts: 0,
            last_error: None,
            enqueued_at,
            last_attempted_at: None,
            recorded_on: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
        }
    }

    fn group() -> StationGroup {
        StationGroup { company_id: 1, station_id: 3 }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_and_fetch_in_enqueue_order() {
        let (repo, _mgr, _tmp) = setup().await;
        repo.enqueue(&sample(2, 2_000)).await.expect("enqueue");
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");

        let page = repo.fetch_page(&group(), 3, 10).await.expect("page");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].transaction_id, 1, "oldest first");
        assert_eq!(page[1].transaction_id, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rows_at_the_ceiling_are_excluded_until_reset() {
        let (repo, _mgr, _tmp) = setup().await;
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");

        for _ in 0..3 {
            repo.mark_failed(&group(), 1, "temporary failure").await.expect("fail");
        }

        let page = repo.fetch_page(&group(), 3, 10).await.expect("page");
        assert!(page.is_empty(), "stalled row must not drain");
        assert!(repo.pending_groups(1, 3).await.expect("groups").is_empty());

        // Operator reset via the resend path re-arms the row.
        let reset = repo
            .reset_for_resend(1, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(), None)
            .await
            .expect("reset");
        assert_eq!(reset, 1);

        let page = repo.fetch_page(&group(), 3, 10).await.expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].attempts, 0);
        assert_eq!(page[0].last_error.as_deref(), Some("resend requested"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commit_outcomes_is_atomic_per_batch() {
        let (repo, mgr, _tmp) = setup().await;
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");
        repo.enqueue(&sample(2, 2_000)).await.expect("enqueue");
        repo.enqueue(&sample(3, 3_000)).await.expect("enqueue");

        let outcomes = vec![
            SaleOutcome {
                transaction_id: 1,
                disposition: ItemDisposition::Accepted {
                    event_type: EventType::Sale,
                    batch_id: "L-7".into(),
                    amount: 12.34,
                },
            },
            SaleOutcome {
                transaction_id: 2,
                disposition: ItemDisposition::Rejected { message: "invalid article".into() },
            },
            SaleOutcome {
                transaction_id: 3,
                disposition: ItemDisposition::Accepted {
                    event_type: EventType::Sale,
                    batch_id: "L-7".into(),
                    amount: 56.78,
                },
            },
        ];
        repo.commit_outcomes(&group(), &outcomes).await.expect("commit");

        let page = repo.fetch_page(&group(), 3, 10).await.expect("page");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].transaction_id, 2);
        assert_eq!(page[0].attempts, 1);
        assert_eq!(page[0].last_error.as_deref(), Some("invalid article"));

        let conn = mgr.get_connection().expect("conn");
        let events: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sale_events WHERE batch_id = 'L-7'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(events, 2);
        let amount: f64 = conn
            .query_row(
                "SELECT amount FROM sale_events WHERE transaction_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!((amount - 12.34).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn long_errors_are_truncated() {
        let (repo, _mgr, _tmp) = setup().await;
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");

        let long_error = "x".repeat(1000);
        repo.mark_failed(&group(), 1, &long_error).await.expect("fail");

        let page = repo.fetch_page(&group(), 3, 10).await.expect("page");
        let stored = page[0].last_error.as_deref().unwrap();
        assert_eq!(stored.chars().count(), ERROR_TRUNCATE_LEN);
        assert!(stored.ends_with("..."));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn discard_removes_without_an_event() {
        let (repo, mgr, _tmp) = setup().await;
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");

        repo.discard(&group(), 1).await.expect("discard");

        assert!(repo.fetch_page(&group(), 3, 10).await.expect("page").is_empty());
        let conn = mgr.get_connection().expect("conn");
        let events: i64 =
            conn.query_row("SELECT COUNT(*) FROM sale_events", [], |row| row.get(0)).unwrap();
        assert_eq!(events, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_honors_the_station_filter() {
        let (repo, _mgr, _tmp) = setup().await;
        let mut other_station = sample(2, 2_000);
        other_station.station_id = 9;
        repo.enqueue(&sample(1, 1_000)).await.expect("enqueue");
        repo.enqueue(&other_station).await.expect("enqueue");
        repo.mark_failed(&group(), 1, "boom").await.expect("fail");

        let reset = repo
            .reset_for_resend(1, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(), Some("00003"))
            .await
            .expect("reset");

        assert_eq!(reset, 1, "only the requested station is re-armed");
    }
}
