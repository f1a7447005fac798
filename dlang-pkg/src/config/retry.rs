//! Retry and backoff configuration.

use std::time::Duration;

use super::defaults::{DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES};

/// Configuration for retrying HTTP requests.
///
/// The delay before retry `n` (0-based) is `initial_delay * 2^n` with ±25%
/// jitter, never exceeding `max_delay`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use dlang_pkg::config::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.max_retries(), 2);
/// assert_eq!(config.initial_delay(), Duration::from_secs(1));
/// assert_eq!(config.max_delay(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of extra attempts after the first failure.
    ///
    /// Default: 2 (3 attempts total).
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base backoff delay. Default: 1 second.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap for any single delay, including server-requested ones.
    ///
    /// Default: 30 seconds.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Get the number of extra attempts.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Get the base backoff delay.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Get the delay cap.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries(), 2);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.initial_delay(), Duration::from_millis(1000));
        assert_eq!(config.max_delay(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(RetryConfig::new(), RetryConfig::default());
    }

    #[test]
    fn test_builder_chaining() {
        let config = RetryConfig::new()
            .with_max_retries(5)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100));

        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.max_attempts(), 6);
        assert_eq!(config.initial_delay(), Duration::from_millis(10));
        assert_eq!(config.max_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_max_attempts_saturates() {
        let config = RetryConfig::new().with_max_retries(u32::MAX);
        assert_eq!(config.max_attempts(), u32::MAX);
    }
}
