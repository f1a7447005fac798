//! INI serialization logic for converting `Settings` → INI string.

use super::settings::Settings;

/// Convert `Settings` to a commented INI string for saving.
pub(super) fn to_config_string(settings: &Settings) -> String {
    format!(
        r#"[network]
; Extra attempts after a failed request (429/500/502/503 or a transient network error)
max_retries = {}
; Base backoff delay in milliseconds, doubled on every attempt (+/-25% jitter)
initial_delay_ms = {}
; Upper bound for any single delay, including Retry-After requests from the server
max_delay_ms = {}
; Per-request timeout in seconds
timeout_secs = {}
; Git host REST API base URL
api_base_url = {}
; User-Agent header sent with every request
user_agent = {}

[install]
; Dependencies resolved and downloaded concurrently
parallel_downloads = {}
"#,
        settings.network.max_retries,
        settings.network.initial_delay_ms,
        settings.network.max_delay_ms,
        settings.network.timeout_secs,
        settings.network.api_base_url,
        settings.network.user_agent,
        settings.install.parallel_downloads,
    )
}
