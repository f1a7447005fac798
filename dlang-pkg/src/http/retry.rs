//! Retrying fetcher with exponential backoff and rate-limit awareness.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpResponse, HttpTransport, ProgressFn, TransportError};
use crate::config::RetryConfig;

/// Statuses that are retried without a caller-supplied predicate.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

/// Statuses whose rate-limit headers may extend the backoff.
const RATE_LIMIT_STATUSES: [u16; 2] = [429, 503];

/// Fraction of the computed delay used as jitter in each direction.
const JITTER_FRACTION: f64 = 0.25;

/// Extra retry condition supplied by the caller.
pub type RetryPredicate = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>;

/// The last failure observed before the retry budget ran out.
#[derive(Debug, Clone)]
pub enum LastFailure {
    /// The server answered with a retryable status.
    Response(HttpResponse),
    /// The request failed with a transient transport error.
    Error(TransportError),
}

impl fmt::Display for LastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastFailure::Response(response) => write!(f, "HTTP {}", response.status()),
            LastFailure::Error(error) => write!(f, "{}", error),
        }
    }
}

/// Errors from [`RetryingFetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// A non-transient transport failure; never retried.
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Every attempt failed with a retryable outcome.
    #[error("Request to {url} failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        url: String,
        attempts: u32,
        last: LastFailure,
    },
}

impl FetchError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Transport { .. } => 1,
            FetchError::MaxRetriesExceeded { attempts, .. } => *attempts,
        }
    }
}

/// Executes HTTP requests with retries.
///
/// A request is retried when the response status is in
/// [`RETRYABLE_STATUSES`] (or the optional predicate accepts it) or the
/// transport error is transient. Any other response, including 4xx
/// statuses, is returned to the caller as-is.
pub struct RetryingFetcher<T> {
    transport: T,
    config: RetryConfig,
    should_retry: Option<RetryPredicate>,
}

impl<T: HttpTransport> RetryingFetcher<T> {
    /// Create a fetcher over a transport.
    pub fn new(transport: T, config: RetryConfig) -> Self {
        Self {
            transport,
            config,
            should_retry: None,
        }
    }

    /// Also retry responses accepted by the predicate.
    pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.should_retry = Some(predicate);
        self
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Perform a request with retries.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.execute(request.url(), || self.transport.send(request))
            .await
    }

    /// Perform a request with retries, reporting download progress.
    ///
    /// Progress restarts from zero on every attempt.
    pub async fn fetch_with_progress(
        &self,
        request: &HttpRequest,
        on_progress: &ProgressFn<'_>,
    ) -> Result<HttpResponse, FetchError> {
        self.execute(request.url(), || {
            self.transport.send_with_progress(request, on_progress)
        })
        .await
    }

    /// Run an arbitrary request operation under the retry policy.
    ///
    /// `url` is used for logging and error messages only.
    pub async fn execute<F, Fut>(&self, url: &str, mut operation: F) -> Result<HttpResponse, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpResponse, TransportError>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            let outcome = operation().await;
            let attempts_made = attempt + 1;
            let exhausted = attempts_made >= max_attempts;

            let delay = match outcome {
                Ok(response) => {
                    if !self.is_retryable(&response) {
                        return Ok(response);
                    }
                    if exhausted {
                        warn!(url, attempts = attempts_made, status = response.status(), "Retry budget exhausted");
                        return Err(FetchError::MaxRetriesExceeded {
                            url: url.to_string(),
                            attempts: attempts_made,
                            last: LastFailure::Response(response),
                        });
                    }
                    self.delay_for_response(attempt, &response)
                }
                Err(error) => {
                    if !error.is_transient() {
                        debug!(url, error = %error, "Non-retryable transport error");
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            source: error,
                        });
                    }
                    if exhausted {
                        warn!(url, attempts = attempts_made, error = %error, "Retry budget exhausted");
                        return Err(FetchError::MaxRetriesExceeded {
                            url: url.to_string(),
                            attempts: attempts_made,
                            last: LastFailure::Error(error),
                        });
                    }
                    backoff_delay(&self.config, attempt, random_jitter())
                }
            };

            debug!(
                url,
                attempt = attempts_made,
                delay_ms = delay.as_millis() as u64,
                "Retrying request after backoff"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn is_retryable(&self, response: &HttpResponse) -> bool {
        RETRYABLE_STATUSES.contains(&response.status())
            || self
                .should_retry
                .as_ref()
                .is_some_and(|predicate| predicate(response))
    }

    fn delay_for_response(&self, attempt: u32, response: &HttpResponse) -> Duration {
        let computed = backoff_delay(&self.config, attempt, random_jitter());
        if !RATE_LIMIT_STATUSES.contains(&response.status()) {
            return computed;
        }

        match rate_limit_delay(response, SystemTime::now()) {
            Some(requested) => {
                debug!(
                    status = response.status(),
                    requested_ms = requested.as_millis() as u64,
                    "Server requested retry delay"
                );
                computed.max(requested).min(self.config.max_delay())
            }
            None => computed,
        }
    }
}

fn random_jitter() -> f64 {
    rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION)
}

/// Compute the backoff before retry `attempt` (0-based).
///
/// `initial_delay * 2^attempt`, scaled by `1 + jitter` (`jitter` is clamped
/// to ±0.25), capped at the configured maximum.
pub fn backoff_delay(config: &RetryConfig, attempt: u32, jitter: f64) -> Duration {
    let jitter = jitter.clamp(-JITTER_FRACTION, JITTER_FRACTION);
    let base_ms = config.initial_delay().as_millis() as f64 * 2f64.powi(attempt.min(62) as i32);
    let max_ms = config.max_delay().as_millis() as f64;
    let delay_ms = (base_ms * (1.0 + jitter)).min(max_ms).max(0.0);
    Duration::from_millis(delay_ms.round() as u64)
}

/// Delay requested by the server through rate-limit headers.
///
/// `Retry-After` may be a number of seconds or an HTTP date;
/// `X-RateLimit-Reset` is a unix timestamp in seconds. `Retry-After` wins
/// when both are present. Dates in the past yield `Some(Duration::ZERO)`.
pub fn rate_limit_delay(response: &HttpResponse, now: SystemTime) -> Option<Duration> {
    if let Some(value) = response.header("retry-after") {
        let value = value.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
            let target = date.timestamp();
            return Some(seconds_until(target, now));
        }
    }

    if let Some(value) = response.header("x-ratelimit-reset") {
        if let Ok(reset) = value.trim().parse::<i64>() {
            return Some(seconds_until(reset, now));
        }
    }

    None
}

fn seconds_until(target_unix_secs: i64, now: SystemTime) -> Duration {
    let now_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Duration::from_secs((target_unix_secs - now_secs).max(0) as u64)
}
