//! Settings structs for each `[section]` of the INI config file.

use std::time::Duration;

use super::retry::RetryConfig;

/// User configuration loaded from `config.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Network settings
    pub network: NetworkSettings,
    /// Install settings
    pub install: InstallSettings,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Extra attempts after the first failed request
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Git host REST API base URL
    pub api_base_url: String,
    /// User-Agent header value
    pub user_agent: String,
}

/// `[install]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    /// Dependencies processed concurrently during install
    pub parallel_downloads: usize,
}

impl Settings {
    /// Build the retry configuration described by these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.network.max_retries)
            .with_initial_delay(Duration::from_millis(self.network.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.network.max_delay_ms))
    }

    /// Per-request HTTP timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }
}
