//! Typed application configuration.
//!
//! Every field the engine needs is declared here and validated once at load
//! time; a missing required field is a configuration fault, never a runtime
//! `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CYCLE_INTERVAL_SECS, DEFAULT_PROMOTIONS_INTERVAL_SECS};
use crate::errors::{CashlinkError, Result};

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

/// Settings shared by every store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Master switch; a disabled engine loads config but never syncs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds slept between sync cycles.
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Seconds between promotion refreshes.
    #[serde(default = "default_promotions_interval")]
    pub promotions_interval_secs: u64,
    /// Per-attempt HTTP timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Attempts per candidate host before failing over.
    #[serde(default = "default_retries_per_host")]
    pub retries_per_host: usize,
    /// Pause between candidate hosts, in milliseconds.
    #[serde(default = "default_inter_host_pause")]
    pub inter_host_pause_ms: u64,
    /// Records dated before this day are discarded instead of sent.
    #[serde(default)]
    pub resend_cutoff: Option<NaiveDate>,
    /// One-shot switch: overrides the resend cutoff for exactly one cycle,
    /// then clears itself in the config file.
    #[serde(default)]
    pub initial_bulk_load: bool,
    /// Shared Basic Auth credentials (already decrypted; never logged).
    pub username: String,
    pub password: String,
    /// Version strings carried on every request as identification headers.
    pub pos_version: String,
    pub backend_version: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// One physical store known to the remote platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Remote retailer id (platform side).
    pub company_id: i64,
    /// Remote location id (platform side).
    pub location_id: i64,
    /// Local ERP company id the queue rows are keyed by.
    pub erp_company_id: i64,
    /// Candidate base URLs, tried in order. One to three entries.
    pub base_urls: Vec<String>,
}

const MAX_BASE_URLS: usize = 3;

impl AppConfig {
    /// Validate the loaded configuration.
    ///
    /// # Errors
    /// Returns `CashlinkError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.general.username.trim().is_empty() {
            return Err(CashlinkError::Config("username must not be empty".into()));
        }
        if self.general.password.is_empty() {
            return Err(CashlinkError::Config("password must not be empty".into()));
        }
        if self.general.database.path.trim().is_empty() {
            return Err(CashlinkError::Config("database.path must not be empty".into()));
        }
        if self.general.cycle_interval_secs == 0 {
            return Err(CashlinkError::Config("cycle_interval_secs must be positive".into()));
        }

        for store in &self.stores {
            store.validate()?;
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_urls.is_empty() {
            return Err(CashlinkError::Config(format!(
                "store {} has no base URLs configured",
                self.erp_company_id
            )));
        }
        if self.base_urls.len() > MAX_BASE_URLS {
            return Err(CashlinkError::Config(format!(
                "store {} has {} base URLs; at most {} are supported",
                self.erp_company_id,
                self.base_urls.len(),
                MAX_BASE_URLS
            )));
        }
        if self.base_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(CashlinkError::Config(format!(
                "store {} has a blank base URL entry",
                self.erp_company_id
            )));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cycle_interval() -> u64 {
    DEFAULT_CYCLE_INTERVAL_SECS
}

fn default_promotions_interval() -> u64 {
    DEFAULT_PROMOTIONS_INTERVAL_SECS
}

fn default_http_timeout() -> u64 {
    30
}

fn default_retries_per_host() -> usize {
    3
}

fn default_inter_host_pause() -> u64 {
    2000
}

fn default_pool_size() -> u32 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> StoreConfig {
        StoreConfig {
            company_id: 9001,
            location_id: 17,
            erp_company_id: 1,
            base_urls: vec!["https://api.example.com".into()],
        }
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                enabled: true,
                cycle_interval_secs: 1800,
                promotions_interval_secs: 1800,
                http_timeout_secs: 30,
                retries_per_host: 3,
                inter_host_pause_ms: 2000,
                resend_cutoff: None,
                initial_bulk_load: false,
                username: "store-user".into(),
                password: "secret".into(),
                pos_version: "8.1.0".into(),
                backend_version: "8.0.4".into(),
                database: DatabaseConfig { path: "cashlink.db".into(), pool_size: 4 },
            },
            stores: vec![sample_store()],
        }
    }

    #[test]
    fn valid_config_passes() {
        sample_config().validate().unwrap();
    }

    #[test]
    fn empty_credentials_are_config_faults() {
        let mut config = sample_config();
        config.general.username = "  ".into();
        assert!(matches!(config.validate(), Err(CashlinkError::Config(_))));
    }

    #[test]
    fn store_without_urls_is_rejected() {
        let mut config = sample_config();
        config.stores[0].base_urls.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no base URLs"));
    }

    #[test]
    fn store_with_too_many_urls_is_rejected() {
        let mut config = sample_config();
        config.stores[0].base_urls = vec![
            "https://a".into(),
            "https://b".into(),
            "https://c".into(),
            "https://d".into(),
        ];
        assert!(matches!(config.validate(), Err(CashlinkError::Config(_))));
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let raw = r#"
            [general]
            username = "u"
            password = "p"
            pos_version = "1.0.0"
            backend_version = "1.0.0"
            [general.database]
            path = "cashlink.db"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(config.general.enabled);
        assert_eq!(config.general.cycle_interval_secs, 1800);
        assert_eq!(config.general.retries_per_host, 3);
        assert_eq!(config.general.database.pool_size, 4);
        assert!(config.stores.is_empty());
    }
}
