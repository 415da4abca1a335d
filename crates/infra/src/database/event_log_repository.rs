//! SQLite implementation of the event-log port.
//!
//! A `sale_events` row is the sole durable signal that an event was accepted
//! remotely; the unique key on (transaction, company, event type) is the
//! backstop against recording a duplicate acceptance.

use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::sync::ports::EventLogStore;
use cashlink_domain::{EventType, Result, SaleEvent};
use rusqlite::params;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqliteEventLogRepository {
    db: Arc<DbManager>,
}

impl SqliteEventLogRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

const EVENT_EXISTS_SQL: &str = "SELECT COUNT(*) FROM sale_events
    WHERE company_id = ?1 AND transaction_id = ?2 AND event_type = ?3";

const EVENT_UPSERT_SQL: &str = "INSERT INTO sale_events (
        transaction_id, company_id, event_type, station_id, batch_id, amount, acknowledged_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT (transaction_id, company_id, event_type) DO UPDATE SET
        batch_id = excluded.batch_id,
        amount = excluded.amount,
        station_id = excluded.station_id,
        acknowledged_at = excluded.acknowledged_at";

#[async_trait]
impl EventLogStore for SqliteEventLogRepository {
    async fn has_event(
        &self,
        company_id: i64,
        transaction_id: i64,
        event_type: EventType,
    ) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let event_type = event_type.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let count: i64 = conn
                .query_row(
                    EVENT_EXISTS_SQL,
                    params![company_id, transaction_id, event_type],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(count > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_event(&self, event: &SaleEvent) -> Result<()> {
        let db = Arc::clone(&self.db);
        let event = event.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                EVENT_UPSERT_SQL,
                params![
                    event.transaction_id,
                    event.company_id,
                    event.event_type.to_string(),
                    event.station_id,
                    event.batch_id,
                    event.amount,
                    event.acknowledged_at,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
