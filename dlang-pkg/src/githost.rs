//! Git host API client.
//!
//! Talks to a GitHub-compatible REST API:
//!
//! | Purpose      | Endpoint                                     |
//! |--------------|----------------------------------------------|
//! | tags         | `GET /repos/{owner}/{repo}/tags?per_page=100` |
//! | branch head  | `GET /repos/{owner}/{repo}/commits/{branch}`  |
//! | tarball      | `GET /repos/{owner}/{repo}/tarball/{commit}`  |
//!
//! Every request goes through the [`RetryingFetcher`] and carries the
//! host's credentials when the [`CredentialProvider`] finds any.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::credentials::CredentialProvider;
use crate::http::{
    FetchError, HttpRequest, HttpResponse, HttpTransport, ProgressFn, ReqwestTransport,
    RetryingFetcher, TransportError,
};
use crate::manifest::RefType;
use crate::version::{self, UpgradeKind};

/// Host name credentials are looked up for.
pub const DEFAULT_GIT_HOST: &str = "github.com";

const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Upper bound on tag pages read per repository.
pub const MAX_TAG_PAGES: usize = 10;

/// A tag and the commit it points to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitTag {
    pub name: String,
    pub commit: TagCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagCommit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

/// A manifest ref resolved to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub ref_type: RefType,
    pub commit: String,
}

/// Git host errors.
#[derive(Debug, Error)]
pub enum GitHostError {
    /// The request could not be completed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The host answered with an unexpected status.
    #[error("Failed to {action} for {owner}/{repo}: HTTP {status}")]
    Status {
        action: &'static str,
        owner: String,
        repo: String,
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// The ref is neither a commit, a tag nor a branch.
    #[error("Cannot resolve ref '{reference}' for {owner}/{repo}: no matching tag or branch")]
    RefNotFound {
        owner: String,
        repo: String,
        reference: String,
    },
}

/// Client for a GitHub-compatible git host.
pub struct GitHostClient<T> {
    fetcher: Arc<RetryingFetcher<T>>,
    credentials: Arc<CredentialProvider>,
    api_base_url: String,
    host: String,
}

impl GitHostClient<ReqwestTransport> {
    /// Client over `reqwest` configured from settings, using environment
    /// and `git credential` lookups.
    pub fn from_settings(settings: &Settings) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::from_settings(settings)?;
        let fetcher = RetryingFetcher::new(transport, settings.retry_config());
        Ok(Self::new(Arc::new(fetcher), Arc::new(CredentialProvider::new()))
            .with_api_base_url(settings.network.api_base_url.clone()))
    }
}

impl<T: HttpTransport> GitHostClient<T> {
    pub fn new(fetcher: Arc<RetryingFetcher<T>>, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            fetcher,
            credentials,
            api_base_url: crate::config::DEFAULT_API_BASE_URL.to_string(),
            host: DEFAULT_GIT_HOST.to_string(),
        }
    }

    /// Use a different API base URL (GitHub Enterprise, tests).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Look up credentials for a different host name.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn fetcher(&self) -> &RetryingFetcher<T> {
        &self.fetcher
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Tarball URL for a commit.
    pub fn tarball_url(&self, owner: &str, repo: &str, commit: &str) -> String {
        format!(
            "{}/repos/{}/{}/tarball/{}",
            self.api_base_url, owner, repo, commit
        )
    }

    async fn request(&self, url: String, accept: &str) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("Accept", accept)
            .with_optional_header(
                "Authorization",
                self.credentials.authorization_for(&self.host).await,
            )
    }

    async fn get_json(&self, url: String) -> Result<HttpResponse, GitHostError> {
        let request = self.request(url, ACCEPT_JSON).await;
        Ok(self.fetcher.fetch(&request).await?)
    }

    /// List the repository's tags, following `Link: rel="next"` pages.
    ///
    /// Only links under the configured API base are followed, and at most
    /// [`MAX_TAG_PAGES`] pages are read.
    pub async fn fetch_tags(&self, owner: &str, repo: &str) -> Result<Vec<GitTag>, GitHostError> {
        let mut url = format!(
            "{}/repos/{}/{}/tags?per_page=100",
            self.api_base_url, owner, repo
        );
        let mut tags = Vec::new();
        for page in 1..=MAX_TAG_PAGES {
            let response = self.get_json(url.clone()).await?;
            if !response.is_success() {
                return Err(GitHostError::Status {
                    action: "fetch tags",
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    status: response.status(),
                });
            }

            let batch: Vec<GitTag> =
                response
                    .json()
                    .map_err(|e| GitHostError::InvalidResponse {
                        url: url.clone(),
                        reason: e.to_string(),
                    })?;
            tags.extend(batch);

            let next = response
                .header("link")
                .and_then(next_page_link)
                .filter(|next| next.starts_with(&self.api_base_url));
            match next {
                Some(next) if page < MAX_TAG_PAGES => url = next.to_string(),
                Some(_) => {
                    warn!(owner, repo, pages = MAX_TAG_PAGES, "Tag listing truncated");
                    break;
                }
                None => break,
            }
        }
        debug!(owner, repo, count = tags.len(), "Fetched tags");
        Ok(tags)
    }

    /// Highest release tag among `tags`.
    pub fn find_latest_version(tags: &[GitTag]) -> Option<String> {
        let names: Vec<&str> = tags.iter().map(|tag| tag.name.as_str()).collect();
        version::find_latest_version(&names)
    }

    /// Classify the upgrade from `current` to `latest`.
    pub fn classify_upgrade(current: &str, latest: &str) -> UpgradeKind {
        version::classify_upgrade(current, latest)
    }

    /// Head commit of a branch, or `None` if there is no such branch.
    pub async fn branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<String>, GitHostError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base_url, owner, repo, branch
        );
        let response = self.get_json(url.clone()).await?;
        match response.status() {
            404 | 422 => return Ok(None),
            _ if !response.is_success() => {
                return Err(GitHostError::Status {
                    action: "resolve branch",
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    status: response.status(),
                })
            }
            _ => {}
        }

        let commit: CommitResponse =
            response
                .json()
                .map_err(|e| GitHostError::InvalidResponse {
                    url,
                    reason: e.to_string(),
                })?;
        Ok(Some(commit.sha))
    }

    /// Resolve a manifest ref to a commit.
    ///
    /// A 7 to 40 character hex string is taken as a commit without asking
    /// the host. Otherwise an exact tag match wins over a branch of the same
    /// name.
    pub async fn resolve_ref(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<ResolvedRef, GitHostError> {
        if is_commit_sha(reference) {
            return Ok(ResolvedRef {
                ref_type: RefType::Commit,
                commit: reference.to_ascii_lowercase(),
            });
        }

        let tags = self.fetch_tags(owner, repo).await?;
        if let Some(tag) = tags.into_iter().find(|tag| tag.name == reference) {
            debug!(owner, repo, reference, commit = %tag.commit.sha, "Resolved tag");
            return Ok(ResolvedRef {
                ref_type: RefType::Tag,
                commit: tag.commit.sha,
            });
        }

        if let Some(commit) = self.branch_head(owner, repo, reference).await? {
            debug!(owner, repo, reference, commit = %commit, "Resolved branch");
            return Ok(ResolvedRef {
                ref_type: RefType::Branch,
                commit,
            });
        }

        Err(GitHostError::RefNotFound {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference: reference.to_string(),
        })
    }

    /// Download a tarball, reporting `(bytes_received, total_bytes)`.
    pub async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        url: &str,
        on_progress: &ProgressFn<'_>,
    ) -> Result<Vec<u8>, GitHostError> {
        let request = self.request(url.to_string(), "application/octet-stream").await;
        let response = self.fetcher.fetch_with_progress(&request, on_progress).await?;
        if !response.is_success() {
            return Err(GitHostError::Status {
                action: "download tarball",
                owner: owner.to_string(),
                repo: repo.to_string(),
                status: response.status(),
            });
        }

        let body = response.into_body();
        info!(owner, repo, bytes = body.len(), "Downloaded tarball");
        Ok(body)
    }
}

/// The `rel="next"` target of an RFC 8288 `Link` header.
fn next_page_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        parts
            .filter_map(|param| param.trim().strip_prefix("rel="))
            .any(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
            .then_some(target)
    })
}

/// Whether `reference` looks like an abbreviated or full commit hash.
pub fn is_commit_sha(reference: &str) -> bool {
    (7..=40).contains(&reference.len()) && reference.chars().all(|c| c.is_ascii_hexdigit())
}
