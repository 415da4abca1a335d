//! Promotions refresh: pull the platform's active promotions for a store
//! and snapshot them locally for the POS to apply.

use std::sync::Arc;

use cashlink_domain::{Result, StoreConfig};
use tracing::{debug, info};

use super::ports::{PromotionsStore, RetailClient};

pub struct PromotionsSyncService {
    store: Arc<dyn PromotionsStore>,
    client: Arc<dyn RetailClient>,
}

impl PromotionsSyncService {
    pub fn new(store: Arc<dyn PromotionsStore>, client: Arc<dyn RetailClient>) -> Self {
        Self { store, client }
    }

    /// Refresh the snapshot for one store. Returns the number of
    /// promotions stored.
    pub async fn run_store(&self, store: &StoreConfig) -> Result<usize> {
        let promotions = self.client.fetch_promotions(store).await?;
        if promotions.is_empty() {
            debug!(company_id = store.erp_company_id, "no active promotions for store");
        }
        let stored =
            self.store.replace_for_company(store.erp_company_id, &promotions).await?;
        info!(
            company_id = store.erp_company_id,
            count = stored,
            "promotions snapshot refreshed"
        );
        Ok(stored)
    }
}
