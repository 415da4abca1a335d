//! SQLite implementation of the promotions snapshot port.

use std::sync::Arc;

use async_trait::async_trait;
use cashlink_core::sync::ports::PromotionsStore;
use cashlink_domain::{CashlinkError, Promotion, Result};
use rusqlite::params;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

pub struct SqlitePromotionsRepository {
    db: Arc<DbManager>,
}

impl SqlitePromotionsRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PromotionsStore for SqlitePromotionsRepository {
    async fn replace_for_company(
        &self,
        company_id: i64,
        promotions: &[Promotion],
    ) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let promotions = promotions.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            tx.execute("DELETE FROM promotions WHERE company_id = ?1", params![company_id])
                .map_err(map_sql_error)?;

            for promotion in &promotions {
                let payload = serde_json::to_string(promotion).map_err(|err| {
                    CashlinkError::Internal(format!("promotion serialization failed: {err}"))
                })?;
                tx.execute(
                    "INSERT OR REPLACE INTO promotions (
                        company_id, promotion_id, kind, description, payload_json, fetched_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, CAST(strftime('%s','now') AS INTEGER))",
                    params![
                        company_id,
                        promotion.id,
                        promotion.kind,
                        promotion.description,
                        payload,
                    ],
                )
                .map_err(map_sql_error)?;
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(promotions.len())
        })
        .await
        .map_err(map_join_error)?
    }
}
