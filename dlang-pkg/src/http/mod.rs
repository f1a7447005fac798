//! HTTP access for the package manager.
//!
//! All network traffic flows through the [`HttpTransport`] trait so the
//! retry, git host and install layers can be tested without a network:
//!
//! - [`ReqwestTransport`] - the real implementation backed by `reqwest`
//! - [`RetryingFetcher`] - exponential backoff on top of any transport,
//!   honoring `Retry-After` and `X-RateLimit-Reset`

mod retry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use retry::{
    backoff_delay, rate_limit_delay, FetchError, LastFailure, RetryPredicate, RetryingFetcher,
    RETRYABLE_STATUSES,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ProgressFn, ReqwestTransport, TransportError,
    TransportErrorKind,
};
