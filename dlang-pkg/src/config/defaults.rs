//! Default values for all configuration settings.

use super::settings::{InstallSettings, NetworkSettings, Settings};

/// Extra attempts after the first request fails (3 attempts total).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base backoff delay in milliseconds, doubled on every attempt.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Upper bound for any single backoff delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Per-request HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// REST endpoint of the git host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// User-Agent sent with every request. The GitHub API rejects requests without one.
pub const DEFAULT_USER_AGENT: &str = concat!("dlang-pkg/", env!("CARGO_PKG_VERSION"));

/// Number of dependencies resolved and downloaded concurrently.
pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 4;

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            parallel_downloads: DEFAULT_PARALLEL_DOWNLOADS,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: NetworkSettings::default(),
            install: InstallSettings::default(),
        }
    }
}
