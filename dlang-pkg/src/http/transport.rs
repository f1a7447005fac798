//! HTTP transport abstraction for testability.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Progress callback for body downloads: `(bytes_received, total_bytes)`.
///
/// `total_bytes` is `None` when the server sends no `Content-Length`.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) + Send + Sync + 'a;

/// Substrings of error messages that identify transient network failures.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "econnreset",
    "broken pipe",
    "socket hang up",
    "connection closed before message completed",
    "timed out",
    "timeout",
    "etimedout",
    "dns error",
    "failed to lookup address",
    "enotfound",
    "eai_again",
    "temporary failure in name resolution",
];

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request could not be built (malformed URL, bad header).
    InvalidRequest,
    /// The request or connection timed out.
    Timeout,
    /// The peer reset or dropped the connection.
    ConnectionReset,
    /// Host name resolution failed.
    Dns,
    /// The connection could not be established for another reason.
    Connect,
    /// The response body could not be read.
    Body,
    /// Anything else.
    Other,
}

/// A request that never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if retrying the request may succeed.
    ///
    /// Malformed requests are never transient. Other errors are transient when
    /// their category or message identifies a reset, timeout or DNS failure.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            TransportErrorKind::InvalidRequest => false,
            TransportErrorKind::Timeout
            | TransportErrorKind::ConnectionReset
            | TransportErrorKind::Dns => true,
            _ => is_transient_message(&self.message),
        }
    }
}

/// Returns true if an error message names a transient network failure.
pub(crate) fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// An outgoing GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    url: String,
    headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Create a GET request for a URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a header if the value is present.
    pub fn with_optional_header(self, name: &str, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_header(name, value),
            None => self,
        }
    }

    /// Get the request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get all headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response with its body fully read.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl HttpResponse {
    /// Create a response with the given status and no headers or body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get the status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Trait for HTTP transports.
///
/// Implementations return `Ok` for every response the server produced,
/// whatever its status. `Err` is reserved for requests that never got a
/// response; status handling belongs to the caller.
pub trait HttpTransport: Send + Sync {
    /// Perform a request and read the whole body.
    fn send(
        &self,
        request: &HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// Perform a request, reporting body progress as it arrives.
    ///
    /// The default implementation reports once, after [`send`](Self::send)
    /// completes.
    fn send_with_progress(
        &self,
        request: &HttpRequest,
        on_progress: &ProgressFn<'_>,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        async move {
            let response = self.send(request).await?;
            if response.is_success() {
                let len = response.body().len() as u64;
                on_progress(len, Some(len));
            }
            Ok(response)
        }
    }
}

/// Async HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReqwestTransport {
    /// Create a transport with the given timeout and User-Agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { client, timeout })
    }

    /// Create a transport from user settings.
    pub fn from_settings(settings: &crate::config::Settings) -> Result<Self, TransportError> {
        Self::new(settings.timeout(), &settings.network.user_agent)
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn start(&self, request: &HttpRequest) -> Result<reqwest::Response, TransportError> {
        trace!(url = request.url(), "HTTP GET request starting");

        let mut builder = self.client.get(request.url());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(response) => {
                debug!(
                    url = request.url(),
                    status = response.status().as_u16(),
                    "HTTP response received"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    url = request.url(),
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                Err(map_reqwest_error(&e))
            }
        }
    }
}

fn response_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Flatten a `reqwest` error and its sources into one classified error.
fn map_reqwest_error(error: &reqwest::Error) -> TransportError {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let lower = message.to_lowercase();
    let kind = if error.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if lower.contains("dns error") || lower.contains("failed to lookup address") {
        TransportErrorKind::Dns
    } else if lower.contains("connection reset") {
        TransportErrorKind::ConnectionReset
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, message)
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.start(request).await?;
        let status = response.status().as_u16();
        let headers = response_headers(&response);

        let body = response.bytes().await.map_err(|e| {
            warn!(url = request.url(), error = %e, "Failed to read response body");
            map_reqwest_error(&e)
        })?;
        trace!(url = request.url(), bytes = body.len(), "HTTP response body read");

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn send_with_progress(
        &self,
        request: &HttpRequest,
        on_progress: &ProgressFn<'_>,
    ) -> Result<HttpResponse, TransportError> {
        let mut response = self.start(request).await?;
        let status = response.status().as_u16();
        let headers = response_headers(&response);
        let total = response.content_length();
        let success = response.status().is_success();

        let mut body = Vec::with_capacity(total.unwrap_or(0) as usize);
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if success {
                        on_progress(body.len() as u64, total);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(url = request.url(), error = %e, "Download interrupted");
                    return Err(map_reqwest_error(&e));
                }
            }
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
