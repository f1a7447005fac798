//! Dependency installation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::drift::detect_drift;
use super::error::InstallError;
use super::events::{InstallEvent, ProgressCallback};
use super::integrity::compute_integrity;
use crate::cache::{PackageCache, PackageMetadata};
use crate::config::{Settings, DEFAULT_PARALLEL_DOWNLOADS};
use crate::githost::GitHostClient;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::manifest::{GitDependency, LockFile, LockedDependency, Manifest, ManifestManager};

/// Options for a single install run.
#[derive(Clone)]
pub struct InstallOptions {
    pub workspace_root: PathBuf,
    /// Fail instead of updating the lock file when it disagrees with the
    /// manifest. Never touches the network to find out.
    pub frozen: bool,
    /// Download again even when the package is cached.
    pub force: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl InstallOptions {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            frozen: false,
            force: false,
            on_progress: None,
        }
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    fn emit(&self, event: InstallEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

impl fmt::Debug for InstallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallOptions")
            .field("workspace_root", &self.workspace_root)
            .field("frozen", &self.frozen)
            .field("force", &self.force)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Summary of an install run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallResult {
    /// Packages downloaded in this run.
    pub installed: usize,
    /// Packages already present in the cache.
    pub cached: usize,
    /// Whether `model.lock` was rewritten.
    pub lock_file_modified: bool,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

struct PackageOutcome {
    package: String,
    locked: LockedDependency,
    cached: bool,
    warnings: Vec<String>,
}

/// Installs manifest dependencies into the workspace package cache and
/// keeps `model.lock` in step.
pub struct InstallService<T> {
    host: Arc<GitHostClient<T>>,
    parallelism: usize,
}

impl InstallService<ReqwestTransport> {
    /// Service over `reqwest` configured from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, InstallError> {
        let host = GitHostClient::from_settings(settings)?;
        Ok(Self::new(Arc::new(host)).with_parallelism(settings.install.parallel_downloads))
    }
}

impl<T: HttpTransport> InstallService<T> {
    pub fn new(host: Arc<GitHostClient<T>>) -> Self {
        Self {
            host,
            parallelism: DEFAULT_PARALLEL_DOWNLOADS,
        }
    }

    /// Maximum number of packages processed at once (at least one).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn host(&self) -> &GitHostClient<T> {
        &self.host
    }

    /// Install every git dependency of the workspace manifest.
    ///
    /// Lock entries whose ref still matches the manifest are reused as-is;
    /// other dependencies are resolved against the git host. Downloads are
    /// checked against the locked integrity hash when there is one. All
    /// packages are processed even if some fail; the first failure is
    /// returned and the lock file is left untouched in that case.
    pub async fn install(&self, options: InstallOptions) -> Result<InstallResult, InstallError> {
        let manager = ManifestManager::with_root(&options.workspace_root);
        let manifest = manager
            .get_manifest()
            .await?
            .ok_or_else(|| InstallError::ManifestNotFound(options.workspace_root.clone()))?;
        let dependencies = unique_dependencies(&manifest)?;
        let previous = manager.get_lock_file().await?.unwrap_or_default();

        if options.frozen {
            let drift = detect_drift(&dependencies, &previous);
            if !drift.is_empty() {
                warn!(
                    added = drift.added.len(),
                    removed = drift.removed.len(),
                    changed = drift.changed.len(),
                    "Frozen install found lock file drift"
                );
                return Err(InstallError::FrozenDrift(drift));
            }
        }

        info!(
            root = %options.workspace_root.display(),
            packages = dependencies.len(),
            frozen = options.frozen,
            force = options.force,
            "Installing dependencies"
        );
        options.emit(InstallEvent::Start {
            total: dependencies.len(),
        });

        let cache = PackageCache::for_workspace(&options.workspace_root);
        let outcomes: Vec<_> = stream::iter(dependencies.iter())
            .map(|dependency| self.install_package(dependency, &previous, &cache, &options))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut result = InstallResult::default();
        let mut lock = LockFile::default();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(outcome) => {
                    if outcome.cached {
                        result.cached += 1;
                    } else {
                        result.installed += 1;
                    }
                    result.warnings.extend(outcome.warnings);
                    lock.dependencies.insert(outcome.package, outcome.locked);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        if lock != *previous {
            if options.frozen {
                // Refs already match, so the only difference is newly computed integrity.
                warn!("Frozen install left model.lock unchanged");
                result
                    .warnings
                    .push("model.lock is missing integrity hashes; run a non-frozen install to record them".to_string());
            } else {
                manager.write_lock_file(&lock).await?;
                result.lock_file_modified = true;
            }
        }

        info!(
            installed = result.installed,
            cached = result.cached,
            lock_file_modified = result.lock_file_modified,
            "Install complete"
        );
        Ok(result)
    }

    async fn install_package(
        &self,
        dependency: &GitDependency,
        previous: &LockFile,
        cache: &PackageCache,
        options: &InstallOptions,
    ) -> Result<PackageOutcome, InstallError> {
        let package = dependency.package_id();
        options.emit(InstallEvent::PackageStart {
            package: package.clone(),
        });

        let outcome = self
            .fetch_package(dependency, &package, previous, cache, options)
            .await;

        match &outcome {
            Ok(done) => options.emit(InstallEvent::PackageComplete {
                package,
                commit: done.locked.commit.clone(),
                cached: done.cached,
            }),
            Err(e) => {
                warn!(package = %package, error = %e, "Package install failed");
                options.emit(InstallEvent::PackageError {
                    package,
                    message: e.to_string(),
                });
            }
        }
        outcome
    }

    async fn fetch_package(
        &self,
        dependency: &GitDependency,
        package: &str,
        previous: &LockFile,
        cache: &PackageCache,
        options: &InstallOptions,
    ) -> Result<PackageOutcome, InstallError> {
        let GitDependency { owner, repo, .. } = dependency;
        let mut locked = self.lock_entry(dependency, package, previous).await?;

        if options.force {
            cache.remove(owner, repo, &locked.commit).await?;
        } else if cache.has(owner, repo, &locked.commit).await {
            if locked.integrity.is_none() {
                locked.integrity = cache
                    .read_metadata(owner, repo, &locked.commit)
                    .await
                    .map(|metadata| metadata.integrity);
            }
            debug!(package, commit = %locked.commit, "Using cached package");
            return Ok(PackageOutcome {
                package: package.to_string(),
                locked,
                cached: true,
                warnings: Vec::new(),
            });
        }

        let url = self.host.tarball_url(owner, repo, &locked.commit);
        let bytes = self
            .host
            .download_tarball(owner, repo, &url, &|bytes_received, total_bytes| {
                options.emit(InstallEvent::PackageProgress {
                    package: package.to_string(),
                    bytes_received,
                    total_bytes,
                })
            })
            .await?;

        let actual = compute_integrity(&bytes);
        if let Some(expected) = &locked.integrity {
            if *expected != actual {
                return Err(InstallError::Integrity {
                    package: package.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let staging_error = |source| InstallError::Staging {
            package: package.to_string(),
            source,
        };
        let staged = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".tar.gz")
            .tempfile()
            .map_err(staging_error)?;
        tokio::fs::write(staged.path(), &bytes)
            .await
            .map_err(staging_error)?;
        cache.put(owner, repo, &locked.commit, staged.path()).await?;
        drop(staged);

        let mut warnings = Vec::new();
        let metadata = PackageMetadata {
            integrity: actual.clone(),
            resolved: url,
            commit_sha: locked.commit.clone(),
        };
        if let Err(e) = cache
            .write_metadata(owner, repo, &locked.commit, &metadata)
            .await
        {
            warn!(package, error = %e, "Failed to write package metadata");
            warnings.push(format!("{package}: failed to record cache metadata: {e}"));
        }

        locked.integrity = Some(actual);
        Ok(PackageOutcome {
            package: package.to_string(),
            locked,
            cached: false,
            warnings,
        })
    }

    /// Reuse the lock entry if its ref still matches, otherwise resolve.
    async fn lock_entry(
        &self,
        dependency: &GitDependency,
        package: &str,
        previous: &LockFile,
    ) -> Result<LockedDependency, InstallError> {
        if let Some(locked) = previous
            .dependencies
            .get(package)
            .filter(|locked| locked.reference == dependency.reference)
        {
            return Ok(locked.clone());
        }

        let resolved = self
            .host
            .resolve_ref(&dependency.owner, &dependency.repo, &dependency.reference)
            .await?;
        debug!(
            package,
            reference = %dependency.reference,
            ref_type = %resolved.ref_type,
            commit = %resolved.commit,
            "Resolved dependency"
        );
        Ok(LockedDependency {
            reference: dependency.reference.clone(),
            ref_type: resolved.ref_type,
            resolved: self
                .host
                .tarball_url(&dependency.owner, &dependency.repo, &resolved.commit),
            commit: resolved.commit,
            integrity: None,
        })
    }
}

/// Git dependencies keyed by package id. Several manifest keys may name the
/// same package, but only with the same ref.
fn unique_dependencies(manifest: &Manifest) -> Result<Vec<GitDependency>, InstallError> {
    let mut unique: BTreeMap<String, GitDependency> = BTreeMap::new();
    for dependency in manifest.git_dependencies() {
        let package = dependency.package_id();
        match unique.get(&package) {
            Some(existing) if existing.reference != dependency.reference => {
                return Err(InstallError::ConflictingRefs {
                    package,
                    first: existing.reference.clone(),
                    second: dependency.reference.clone(),
                });
            }
            Some(_) => {}
            None => {
                unique.insert(package, dependency.clone());
            }
        }
    }
    Ok(unique.into_values().collect())
}
