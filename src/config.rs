use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "opwait.toml";
pub const ENV_PREFIX: &str = "OPWAIT";

/// Main configuration structure for opwait
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OpWaitConfig {
    /// Control plane connection
    pub api: ApiConfig,
    /// Poll loop timing
    pub polling: PollingConfig,
    /// Per-fetch retry of transient failures
    pub retry: RetrySettings,
    /// Logging
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, operation names are appended to it
    pub endpoint: String,
    /// Bearer token (can be set via env var)
    pub token: Option<String>,
    /// Project billed for the requests, sent as `X-Goog-User-Project`
    pub user_project_override: Option<String>,
    pub user_agent: String,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Overall deadline for one wait
    pub timeout_secs: u64,
    /// Delay between fetches
    pub poll_interval_ms: u64,
    /// Consecutive "not found" fetches tolerated before failing
    pub not_found_checks: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// Budget for one fetch including its retries
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://container.googleapis.com/v1".to_string(),
            token: None, // Read from env var or config file
            user_project_override: None,
            user_agent: format!("opwait/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst_capacity: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1200, // 20 minutes
            poll_interval_ms: 10_000,
            not_found_checks: crate::waiter::DEFAULT_NOT_FOUND_CHECKS,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl OpWaitConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or opwait.toml when present)
    /// 3. Environment variables (prefixed with OPWAIT_, sections split by `__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default()).context("Failed to encode default configuration")?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: OpWaitConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        // Token fallbacks, most specific first
        if loaded.api.token.is_none() {
            loaded.api.token = ["OPWAIT_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"]
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|token| !token.is_empty()));
        }

        Ok(loaded)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        Self::load_env_file_from(".env")
    }

    /// Load a dotenv file if it exists. A file that exists but does not parse
    /// is an error.
    pub fn load_env_file_from<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            dotenvy::from_path(path).with_context(|| format!("Invalid env file {}", path.display()))?;
            tracing::info!(path = %path.display(), "Loaded environment variables from env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OpWaitConfig::default();

        assert_eq!(config.api.endpoint, "https://container.googleapis.com/v1");
        assert_eq!(config.polling.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.polling.timeout(), Duration::from_secs(1200));
        assert_eq!(config.polling.not_found_checks, 20);
        assert!(config.retry.to_retry_config().timeout < config.polling.timeout());
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opwait.toml");
        std::fs::write(
            &path,
            r#"
[api]
endpoint = "http://localhost:8080/v1"
user_project_override = "billing-project"

[polling]
poll_interval_ms = 250
"#,
        )
        .unwrap();

        let config = OpWaitConfig::load(Some(&path)).unwrap();

        assert_eq!(config.api.endpoint, "http://localhost:8080/v1");
        assert_eq!(config.api.user_project_override.as_deref(), Some("billing-project"));
        assert_eq!(config.polling.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.polling.timeout_secs, 1200);
        assert_eq!(config.retry.base_delay_ms, RetrySettings::default().base_delay_ms);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = OpWaitConfig::load(Some(&dir.path().join("absent.toml")));

        assert!(result.is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("opwait.toml");
        std::fs::write(&path, "[retry]\nmax_retries = 1\n").unwrap();

        std::env::set_var("OPWAIT_RETRY__MAX_RETRIES", "7");
        let config = OpWaitConfig::load(Some(&path));
        std::env::remove_var("OPWAIT_RETRY__MAX_RETRIES");

        assert_eq!(config.unwrap().retry.max_retries, 7);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = OpWaitConfig::default();
        config.polling.timeout_secs = 90;
        config.observability.json = true;

        config.save_to_file(&path).unwrap();
        let reloaded = OpWaitConfig::load(Some(&path)).unwrap();

        assert_eq!(reloaded.polling.timeout_secs, 90);
        assert!(reloaded.observability.json);
    }

    #[test]
    fn test_env_file_missing_is_skipped_and_malformed_fails() {
        let dir = TempDir::new().unwrap();
        assert!(OpWaitConfig::load_env_file_from(dir.path().join(".env")).is_ok());

        let path = dir.path().join(".env");
        std::fs::write(&path, "OPWAIT_MALFORMED_ENV_TEST='unterminated\n").unwrap();
        let err = OpWaitConfig::load_env_file_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid env file"), "{err:#}");
    }
}
