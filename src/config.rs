//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (format chosen by extension), then `WIPE_LEDGER_*` environment variables.

use crate::error::RetryPolicy;
use crate::ledger::LedgerEndpoint;
use crate::logging;
use crate::{WipeDirective, WipeMethod};
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment overrides, e.g. `WIPE_LEDGER_MAX_RETRY_ATTEMPTS`
pub const ENV_PREFIX: &str = "WIPE_LEDGER";

/// Data directory used when no platform directory can be determined
pub const FALLBACK_DATA_DIR: &str = "./wipe-ledger-data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ledger_endpoint: String,
    pub database_path: PathBuf,
    pub certificates_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub log_level: String,
    pub operator_id: String,
    pub signing_key: String,
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub destroy_time_unit_ms: u64,
    pub block_size: usize,
    pub operation_timeout_secs: u64,
    /// When set, missing targets are provisioned with this many bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_size_bytes: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_data_dir(&default_data_dir())
    }
}

/// Platform data directory, or [`FALLBACK_DATA_DIR`]
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("org", "wipe-ledger", "wipe-ledger")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
}

impl AppConfig {
    /// Defaults with every path placed under `data_dir`
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            ledger_endpoint: format!("file://{}", absolute(&data_dir.join("ledger.jsonl")).display()),
            database_path: data_dir.join("operations.db"),
            certificates_dir: data_dir.join("certificates"),
            logs_dir: data_dir.join("logs"),
            log_level: logging::DEFAULT_LOG_LEVEL.to_string(),
            operator_id: crate::wipe_engine::DEFAULT_OPERATOR_ID.to_string(),
            signing_key: "local-signing-key".to_string(),
            max_retry_attempts: crate::error::retry::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: 1000,
            destroy_time_unit_ms: 1000,
            block_size: crate::DEFAULT_BLOCK_SIZE,
            operation_timeout_secs: crate::DEFAULT_OPERATION_TIMEOUT.as_secs(),
            scratch_size_bytes: None,
        }
    }

    /// Load defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = file {
            if !path.exists() {
                bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: AppConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration values")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retry_attempts == 0 {
            bail!("max_retry_attempts must be at least 1");
        }
        if self.block_size == 0 {
            bail!("block_size must be positive");
        }
        if self.operation_timeout_secs == 0 {
            bail!("operation_timeout_secs must be positive");
        }
        if self.operator_id.trim().is_empty() {
            bail!("operator_id must not be empty");
        }
        if !logging::is_valid_level(&self.log_level) {
            bail!("log_level '{}' is not a valid filter", self.log_level);
        }

        for (key, path) in [
            ("database_path", &self.database_path),
            ("certificates_dir", &self.certificates_dir),
            ("logs_dir", &self.logs_dir),
        ] {
            if path.as_os_str().is_empty() {
                bail!("{} must not be empty", key);
            }
        }

        LedgerEndpoint::parse(&self.ledger_endpoint)
            .with_context(|| format!("Rejected ledger endpoint '{}'", self.ledger_endpoint))?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn destroy_time_unit(&self) -> Duration {
        Duration::from_millis(self.destroy_time_unit_ms)
    }

    /// Directive for `method` using the configured block size and timeout
    pub fn directive(&self, method: WipeMethod) -> WipeDirective {
        WipeDirective::new(method)
            .with_block_size(self.block_size)
            .with_timeout(Duration::from_secs(self.operation_timeout_secs))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.block_size, 4096);
        assert!(config.ledger_endpoint.starts_with("file://"));
        assert!(config.scratch_size_bytes.is_none());
    }

    #[test]
    fn test_data_dir_layout() {
        let config = AppConfig::with_data_dir(Path::new("/var/lib/wl"));
        assert_eq!(config.database_path, PathBuf::from("/var/lib/wl/operations.db"));
        assert_eq!(config.ledger_endpoint, "file:///var/lib/wl/ledger.jsonl");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wipe-ledger.toml");
        std::fs::write(
            &path,
            "retry_base_delay_ms = 250\nblock_size = 8192\nscratch_size_bytes = 65536\nledger_endpoint = \"memory://\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.retry_base_delay_ms, 250);
        assert_eq!(config.block_size, 8192);
        assert_eq!(config.scratch_size_bytes, Some(65536));
        assert_eq!(config.ledger_endpoint, "memory://");
        assert_eq!(config.retry_policy().base_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/wipe-ledger.toml"))).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = AppConfig::with_data_dir(Path::new("/tmp/wl"));

        let mut config = base.clone();
        config.max_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.block_size = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.database_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.ledger_endpoint = "https://ledger.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = base;
        config.ledger_endpoint = "http://127.0.0.1:8545".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_directive_uses_configured_values() {
        let mut config = AppConfig::with_data_dir(Path::new("/tmp/wl"));
        config.block_size = 512;
        config.operation_timeout_secs = 30;

        let directive = config.directive(WipeMethod::Destroy);
        assert_eq!(directive.method, WipeMethod::Destroy);
        assert_eq!(directive.block_size, 512);
        assert_eq!(directive.timeout, Duration::from_secs(30));
    }
}
