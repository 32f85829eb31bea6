//! Configuration loading for the smallheart daemon.
//!
//! Configuration is a single TOML file: daemon settings, API endpoint
//! overrides, round tuning, and the account list. Only the account list is
//! mandatory; everything else has built-in defaults matching the platform's
//! published constants.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Complete daemon configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// One configured account entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Display name used in log output.
    pub name: String,
    /// Raw cookie string carrying the credentials.
    pub cookie: String,
}

/// Daemon-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Remote API endpoint bases.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST API base (medal list, room info).
    pub api_base: String,
    /// Heartbeat/trace base (enter + in-channel heartbeats).
    pub trace_base: String,
    /// Web portal base (Referer header, device-id bootstrap).
    pub portal_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.live.bilibili.com".to_string(),
            trace_base: "https://live-trace.bilibili.com".to_string(),
            portal_base: "https://live.bilibili.com".to_string(),
        }
    }
}

/// Tuning for one day's round of work. Defaults match the platform's daily
/// cap and credit accrual rules; tests shrink them.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Daily credit cap per account.
    pub max_hearts_per_day: u32,
    /// Upper bound on concurrently farmed channels.
    pub max_concurrent_channels: usize,
    /// Connected time required per credit, in seconds. Must be a multiple
    /// of the server-reported heartbeat interval.
    pub credit_interval_secs: u64,
    /// Cooldown before a failed session re-enters its channel.
    pub retry_cooldown_secs: u64,
    /// Tolerated deviation around the day boundary.
    pub deviation_secs: u64,
    /// Poll period of the overnight wall-clock sleep loop.
    pub sleep_poll_secs: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            max_hearts_per_day: 24,
            max_concurrent_channels: 24,
            credit_interval_secs: 300,
            retry_cooldown_secs: 60,
            deviation_secs: 60,
            sleep_poll_secs: 300,
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.accounts.is_empty() {
        return Err(Error::Config("no accounts configured".to_string()));
    }
    for account in &config.accounts {
        if account.name.is_empty() {
            return Err(Error::Config("account with empty name".to_string()));
        }
        if account.cookie.is_empty() {
            return Err(Error::Config(format!(
                "account '{}' has an empty cookie",
                account.name
            )));
        }
    }
    if config.round.credit_interval_secs == 0 {
        return Err(Error::Config("credit_interval_secs must be positive".to_string()));
    }
    Ok(())
}
