//! Git host credential resolution.
//!
//! Credentials come from, in order:
//!
//! 1. the `GITHUB_TOKEN` environment variable
//! 2. the `GH_TOKEN` environment variable
//! 3. `git credential fill`, run with prompting disabled and a 5 second timeout
//!
//! Public repositories need no credentials, so resolution is best-effort: a
//! missing or failing helper means "no credentials", never an error. The
//! outcome, including "nothing found", is memoized per host for the lifetime
//! of the provider.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Primary token environment variable.
pub const PRIMARY_TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Fallback token environment variable.
pub const FALLBACK_TOKEN_VAR: &str = "GH_TOKEN";

/// Hard limit for the credential helper subprocess.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(5);

/// Credentials for a git host.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A personal access or app token.
    Token(String),
    /// Username and password (or token used as password).
    Basic { username: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Credentials::Token(***)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Credentials::Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Build an `Authorization` header value.
///
/// Tokens become `Bearer <token>`, username/password pairs become
/// `Basic base64(user:password)`. Absent or empty credentials yield `None`.
pub fn authorization_header(credentials: Option<&Credentials>) -> Option<String> {
    match credentials? {
        Credentials::Token(token) if !token.is_empty() => Some(format!("Bearer {}", token)),
        Credentials::Basic { username, password }
            if !username.is_empty() && !password.is_empty() =>
        {
            let encoded = BASE64.encode(format!("{}:{}", username, password));
            Some(format!("Basic {}", encoded))
        }
        _ => None,
    }
}

/// Failures of the credential helper subprocess.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The helper binary could not be started.
    #[error("Failed to start credential helper '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Talking to the helper failed.
    #[error("Credential helper I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The helper did not finish in time.
    #[error("Credential helper timed out after {0:?}")]
    Timeout(Duration),

    /// The helper exited unsuccessfully.
    #[error("Credential helper exited with status {0}")]
    Exit(String),
}

/// Boxed future returned by [`CredentialHelper::fill`].
pub type HelperFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Credentials>, CredentialError>> + Send + 'a>>;

/// A source of credentials that runs outside the process.
pub trait CredentialHelper: Send + Sync {
    /// Ask the helper for credentials for `host`.
    fn fill<'a>(&'a self, host: &'a str) -> HelperFuture<'a>;
}

/// Parse `key=value` helper output.
///
/// Returns credentials only when both `username` and `password` are present
/// and non-empty.
pub fn parse_helper_output(output: &str) -> Option<Credentials> {
    let mut username = None;
    let mut password = None;

    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "username" => username = Some(value.to_string()),
                "password" => password = Some(value.to_string()),
                _ => {}
            }
        }
    }

    match (username, password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Some(Credentials::Basic { username, password })
        }
        _ => None,
    }
}

/// `git credential fill` helper.
#[derive(Debug, Clone)]
pub struct GitCredentialHelper {
    program: String,
    timeout: Duration,
}

impl Default for GitCredentialHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCredentialHelper {
    /// Create a helper that runs `git credential fill`.
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
            timeout: HELPER_TIMEOUT,
        }
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Override the subprocess timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, host: &str) -> Result<Option<Credentials>, CredentialError> {
        let mut child = Command::new(&self.program)
            .args(["credential", "fill"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CredentialError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let input = format!("protocol=https\nhost={}\n\n", host);
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CredentialError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(CredentialError::Exit(output.status.to_string()));
        }

        Ok(parse_helper_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl CredentialHelper for GitCredentialHelper {
    fn fill<'a>(&'a self, host: &'a str) -> HelperFuture<'a> {
        Box::pin(self.run(host))
    }
}

/// Environment lookup used for token variables.
pub type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves and memoizes credentials per host.
pub struct CredentialProvider {
    env: EnvLookup,
    helper: Box<dyn CredentialHelper>,
    cache: Mutex<HashMap<String, Arc<OnceCell<Option<Credentials>>>>>,
}

impl Default for CredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider {
    /// Provider reading the process environment and `git credential fill`.
    pub fn new() -> Self {
        Self::with_sources(
            Box::new(|name| std::env::var(name).ok()),
            Box::new(GitCredentialHelper::new()),
        )
    }

    /// Provider with explicit sources.
    pub fn with_sources(env: EnvLookup, helper: Box<dyn CredentialHelper>) -> Self {
        Self {
            env,
            helper,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Provider that never finds credentials.
    pub fn anonymous() -> Self {
        Self::with_sources(Box::new(|_| None), Box::new(NoHelper))
    }

    /// Resolve credentials for a host.
    ///
    /// Concurrent callers for the same host share one resolution.
    pub async fn get_credentials(&self, host: &str) -> Option<Credentials> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(host.to_string()).or_default().clone()
        };

        cell.get_or_init(|| self.resolve(host)).await.clone()
    }

    /// Resolve the `Authorization` header value for a host.
    pub async fn authorization_for(&self, host: &str) -> Option<String> {
        authorization_header(self.get_credentials(host).await.as_ref())
    }

    /// Forget all memoized results.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    async fn resolve(&self, host: &str) -> Option<Credentials> {
        for var in [PRIMARY_TOKEN_VAR, FALLBACK_TOKEN_VAR] {
            if let Some(token) = (self.env)(var).filter(|t| !t.trim().is_empty()) {
                trace!(host, source = var, "Using token from environment");
                return Some(Credentials::Token(token.trim().to_string()));
            }
        }

        // Helper failures are deliberately downgraded to "no credentials".
        match self.helper.fill(host).await {
            Ok(Some(credentials)) => {
                debug!(host, "Using credentials from credential helper");
                Some(credentials)
            }
            Ok(None) => {
                debug!(host, "No credentials found, continuing unauthenticated");
                None
            }
            Err(e) => {
                debug!(host, error = %e, "Credential helper unavailable, continuing unauthenticated");
                None
            }
        }
    }
}

struct NoHelper;

impl CredentialHelper for NoHelper {
    fn fill<'a>(&'a self, _host: &'a str) -> HelperFuture<'a> {
        Box::pin(async { Ok(None) })
    }
}
