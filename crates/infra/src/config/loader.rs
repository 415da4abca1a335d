//! Configuration loader
//!
//! Loads the typed [`AppConfig`] from a TOML or JSON file.
//!
//! ## Loading Strategy
//! 1. `CASHLINK_CONFIG` environment variable, when set, names the file
//! 2. Otherwise multiple standard paths are probed
//! 3. Format is detected by extension; the result is validated once
//!
//! A [`ConfigHandle`] keeps the resolved path so the engine can re-read the
//! file once per cycle via an explicit `reload()` instead of caching global
//! state, and can clear the one-shot initial-bulk-load switch in place.

use std::path::{Path, PathBuf};

use cashlink_domain::{AppConfig, CashlinkError, Result};
use url::Url;

const CONFIG_ENV_VAR: &str = "CASHLINK_CONFIG";

/// Load configuration from the environment-named file or a probed path.
///
/// # Errors
/// Returns `CashlinkError::Config` if no file is found, the format is
/// invalid, or validation fails.
pub fn load() -> Result<AppConfig> {
    let explicit = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    match explicit {
        Some(path) => load_from_file(Some(path)),
        None => load_from_file(None),
    }
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both TOML and JSON formats (detected by file extension).
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = resolve_path(path)?;

    tracing::info!(path = %config_path.display(), "loading configuration");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CashlinkError::Config(format!("failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    validate(&config)?;
    Ok(config)
}

/// Probe multiple paths for configuration files.
///
/// Searches, in order: the current working directory, up to two parent
/// levels, and the executable's directory, for `config.{toml,json}` and
/// `cashlink.{toml,json}`.
pub fn probe_config_paths() -> Option<PathBuf> {
    let names = ["config.toml", "config.json", "cashlink.toml", "cashlink.json"];
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        for base in [cwd.clone(), cwd.join(".."), cwd.join("../..")] {
            for name in names {
                candidates.push(base.join(name));
            }
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            for name in names {
                candidates.push(exe_dir.join(name));
            }
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Re-readable configuration source bound to one resolved file.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    path: PathBuf,
}

impl ConfigHandle {
    /// Bind the handle to an explicit file, or resolve one via the standard
    /// strategy.
    pub fn resolve(path: Option<PathBuf>) -> Result<Self> {
        let explicit = path.or_else(|| {
            std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
        });
        Ok(Self { path: resolve_path(explicit)? })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read, parse and validate the file again.
    pub fn reload(&self) -> Result<AppConfig> {
        load_from_file(Some(self.path.clone()))
    }

    /// Flip `general.initial_bulk_load` to `false` in the file itself so the
    /// override holds for exactly one cycle.
    pub fn clear_initial_bulk_load(&self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| CashlinkError::Config(format!("failed to read config file: {e}")))?;

        let rewritten = match extension(&self.path) {
            "toml" => {
                let mut value: toml::Value = toml::from_str(&contents).map_err(|e| {
                    CashlinkError::Config(format!("invalid TOML format: {e}"))
                })?;
                if let Some(general) =
                    value.get_mut("general").and_then(toml::Value::as_table_mut)
                {
                    general.insert("initial_bulk_load".into(), toml::Value::Boolean(false));
                }
                toml::to_string_pretty(&value).map_err(|e| {
                    CashlinkError::Config(format!("failed to render config: {e}"))
                })?
            }
            "json" => {
                let mut value: serde_json::Value =
                    serde_json::from_str(&contents).map_err(|e| {
                        CashlinkError::Config(format!("invalid JSON format: {e}"))
                    })?;
                if let Some(general) = value.get_mut("general") {
                    general["initial_bulk_load"] = serde_json::Value::Bool(false);
                }
                serde_json::to_string_pretty(&value).map_err(|e| {
                    CashlinkError::Config(format!("failed to render config: {e}"))
                })?
            }
            other => {
                return Err(CashlinkError::Config(format!(
                    "unsupported config format: {other}"
                )))
            }
        };

        std::fs::write(&self.path, rewritten)
            .map_err(|e| CashlinkError::Config(format!("failed to write config file: {e}")))?;
        tracing::info!(path = %self.path.display(), "cleared initial bulk load switch");
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => {
            if !p.exists() {
                return Err(CashlinkError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            Ok(p)
        }
        None => probe_config_paths().ok_or_else(|| {
            CashlinkError::Config(
                "no config file found in any of the standard locations".to_string(),
            )
        }),
    }
}

fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    match extension(path) {
        "toml" => toml::from_str(contents)
            .map_err(|e| CashlinkError::Config(format!("invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CashlinkError::Config(format!("invalid JSON format: {e}"))),
        other => Err(CashlinkError::Config(format!("unsupported config format: {other}"))),
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

/// Structural validation plus URL well-formedness for every store.
fn validate(config: &AppConfig) -> Result<()> {
    config.validate()?;
    for store in &config.stores {
        for base_url in &store.base_urls {
            Url::parse(base_url).map_err(|e| {
                CashlinkError::Config(format!(
                    "store {}: invalid base URL {base_url:?}: {e}",
                    store.erp_company_id
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    const SAMPLE_TOML: &str = r#"
[general]
username = "store-user"
password = "secret"
pos_version = "8.1.0"
backend_version = "8.0.4"
cycle_interval_secs = 900
resend_cutoff = "2025-01-01"
initial_bulk_load = true

[general.database]
path = "cashlink.db"
pool_size = 4

[[stores]]
company_id = 9001
location_id = 17
erp_company_id = 1
base_urls = ["https://api.example.com", "https://backup.example.com"]
"#;

    fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_a_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", SAMPLE_TOML);

        let config = load_from_file(Some(path)).expect("config loads");

        assert_eq!(config.general.cycle_interval_secs, 900);
        assert!(config.general.initial_bulk_load);
        assert_eq!(config.stores.len(), 1);
        assert_eq!(config.stores[0].base_urls.len(), 2);
        assert_eq!(
            config.general.resend_cutoff,
            chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
        );
    }

    #[test]
    fn loads_a_json_config() {
        let json = r#"{
            "general": {
                "username": "store-user",
                "password": "secret",
                "pos_version": "8.1.0",
                "backend_version": "8.0.4",
                "database": { "path": "cashlink.db" }
            },
            "stores": []
        }"#;
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.json", json);

        let config = load_from_file(Some(path)).expect("config loads");
        assert_eq!(config.general.database.pool_size, 4, "defaults apply");
    }

    #[test]
    fn missing_file_is_a_config_fault() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(matches!(result, Err(CashlinkError::Config(_))));
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let broken = SAMPLE_TOML.replace("https://api.example.com", "not a url");
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", &broken);

        let err = load_from_file(Some(path)).unwrap_err();
        assert!(err.to_string().contains("invalid base URL"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let broken = SAMPLE_TOML.replace("username = \"store-user\"", "username = \"\"");
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", &broken);

        assert!(matches!(load_from_file(Some(path)), Err(CashlinkError::Config(_))));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.yaml", "general: {}");

        assert!(matches!(load_from_file(Some(path)), Err(CashlinkError::Config(_))));
    }

    #[test]
    fn clear_initial_bulk_load_rewrites_the_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", SAMPLE_TOML);
        let handle = ConfigHandle::resolve(Some(path)).expect("handle");

        assert!(handle.reload().expect("first load").general.initial_bulk_load);
        handle.clear_initial_bulk_load().expect("clear flag");

        let reloaded = handle.reload().expect("second load");
        assert!(!reloaded.general.initial_bulk_load);
        // The rest of the file survives the rewrite.
        assert_eq!(reloaded.stores.len(), 1);
        assert_eq!(reloaded.general.cycle_interval_secs, 900);
    }

    #[test]
    fn reload_picks_up_edits() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "config.toml", SAMPLE_TOML);
        let handle = ConfigHandle::resolve(Some(path.clone())).expect("handle");
        assert_eq!(handle.reload().expect("load").general.cycle_interval_secs, 900);

        let edited = SAMPLE_TOML.replace("cycle_interval_secs = 900", "cycle_interval_secs = 60");
        std::fs::write(&path, edited).unwrap();

        assert_eq!(handle.reload().expect("reload").general.cycle_interval_secs, 60);
    }
}
