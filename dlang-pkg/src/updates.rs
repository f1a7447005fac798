//! Outdated dependency detection.
//!
//! Compares each tag-pinned dependency in the lock file against the newest
//! release tag on the git host.

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::githost::GitHostClient;
use crate::http::HttpTransport;
use crate::manifest::{ManifestError, ManifestManager, RefType};
use crate::version::{classify_upgrade, is_newer, UpgradeKind};

const CONCURRENT_CHECKS: usize = 4;

/// Update status of one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Locked at the newest release tag.
    UpToDate { current: String },
    /// A newer release tag exists.
    UpdateAvailable {
        current: String,
        latest: String,
        upgrade: UpgradeKind,
    },
    /// Pinned to a branch or commit; not compared.
    Pinned { ref_type: RefType, reference: String },
    /// In the manifest but not in the lock file.
    NotInstalled,
}

impl DependencyStatus {
    pub fn has_update(&self) -> bool {
        matches!(self, Self::UpdateAvailable { .. })
    }
}

/// A dependency and its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
    /// `owner/repo`.
    pub package: String,
    pub status: DependencyStatus,
}

/// Result of an outdated check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutdatedReport {
    /// Dependencies in package order.
    pub dependencies: Vec<DependencyInfo>,
    /// Packages whose tags could not be fetched.
    pub warnings: Vec<String>,
}

impl OutdatedReport {
    /// Dependencies with an update available.
    pub fn updates(&self) -> impl Iterator<Item = &DependencyInfo> {
        self.dependencies.iter().filter(|info| info.status.has_update())
    }
}

/// Checks locked dependencies for newer releases.
pub struct OutdatedChecker<'a, T> {
    host: &'a GitHostClient<T>,
}

impl<'a, T: HttpTransport> OutdatedChecker<'a, T> {
    pub fn new(host: &'a GitHostClient<T>) -> Self {
        Self { host }
    }

    /// Check every git dependency in the workspace manifest.
    ///
    /// A failed tag lookup is reported as a warning and the package is left
    /// out; it does not fail the whole check.
    pub async fn check(&self, manager: &ManifestManager) -> Result<OutdatedReport, ManifestError> {
        let Some(manifest) = manager.get_manifest().await? else {
            return Ok(OutdatedReport::default());
        };
        let lock = manager.get_lock_file().await?.unwrap_or_default();

        let mut packages: Vec<_> = manifest
            .git_dependencies()
            .map(|dep| (dep.package_id(), dep.owner.clone(), dep.repo.clone()))
            .collect();
        packages.sort();
        packages.dedup();

        let results: Vec<_> = stream::iter(packages)
            .map(|(package, owner, repo)| {
                let locked = lock.dependencies.get(&package).cloned();
                async move {
                    let status = match locked {
                        None => Ok(DependencyStatus::NotInstalled),
                        Some(locked) if locked.ref_type != RefType::Tag => {
                            Ok(DependencyStatus::Pinned {
                                ref_type: locked.ref_type,
                                reference: locked.reference,
                            })
                        }
                        Some(locked) => self.tag_status(&owner, &repo, locked.reference).await,
                    };
                    (package, status)
                }
            })
            .buffered(CONCURRENT_CHECKS)
            .collect()
            .await;

        let mut report = OutdatedReport::default();
        for (package, status) in results {
            match status {
                Ok(status) => report.dependencies.push(DependencyInfo { package, status }),
                Err(e) => {
                    warn!(package = %package, error = %e, "Failed to check for updates");
                    report.warnings.push(format!("{package}: {e}"));
                }
            }
        }
        Ok(report)
    }

    async fn tag_status(
        &self,
        owner: &str,
        repo: &str,
        current: String,
    ) -> Result<DependencyStatus, crate::githost::GitHostError> {
        let tags = self.host.fetch_tags(owner, repo).await?;
        let latest = GitHostClient::<T>::find_latest_version(&tags);
        debug!(owner, repo, current = %current, latest = ?latest, "Checked for updates");

        Ok(match latest {
            Some(latest) if is_newer(&current, &latest) => DependencyStatus::UpdateAvailable {
                upgrade: classify_upgrade(&current, &latest),
                current,
                latest,
            },
            _ => DependencyStatus::UpToDate { current },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::credentials::CredentialProvider;
    use crate::http::testing::RoutedTransport;
    use crate::http::RetryingFetcher;
    use crate::manifest::{LockFile, LockedDependency, MANIFEST_FILE};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    const API: &str = "https://api.test";

    fn host(transport: RoutedTransport) -> GitHostClient<RoutedTransport> {
        GitHostClient::new(
            Arc::new(RetryingFetcher::new(
                transport,
                RetryConfig::default().with_max_retries(0),
            )),
            Arc::new(CredentialProvider::anonymous()),
        )
        .with_api_base_url(API)
    }

    fn locked(reference: &str, ref_type: RefType) -> LockedDependency {
        LockedDependency {
            reference: reference.into(),
            ref_type,
            resolved: "u".into(),
            commit: "c".into(),
            integrity: None,
        }
    }

    async fn workspace() -> (TempDir, ManifestManager) {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(MANIFEST_FILE),
            r#"
dependencies:
  acme/core: v1.0.0
  acme/utils: v2.1.0
  acme/edge: main
  acme/flaky: v1.0.0
  acme/new: v0.1.0
"#,
        )
        .unwrap();
        let manager = ManifestManager::with_root(temp.path());
        let mut lock = LockFile::default();
        lock.dependencies
            .insert("acme/core".into(), locked("v1.0.0", RefType::Tag));
        lock.dependencies
            .insert("acme/utils".into(), locked("v2.1.0", RefType::Tag));
        lock.dependencies
            .insert("acme/edge".into(), locked("main", RefType::Branch));
        lock.dependencies
            .insert("acme/flaky".into(), locked("v1.0.0", RefType::Tag));
        manager.write_lock_file(&lock).await.unwrap();
        (temp, manager)
    }

    #[tokio::test]
    async fn test_outdated_report() {
        let (_temp, manager) = workspace().await;
        let transport = RoutedTransport::new()
            .json(
                format!("{API}/repos/acme/core/tags?per_page=100"),
                json!([
                    { "name": "v1.0.0", "commit": { "sha": "a" } },
                    { "name": "v1.3.0", "commit": { "sha": "b" } },
                    { "name": "nightly", "commit": { "sha": "c" } }
                ]),
            )
            .json(
                format!("{API}/repos/acme/utils/tags?per_page=100"),
                json!([{ "name": "v2.1.0", "commit": { "sha": "d" } }]),
            );
        let host = host(transport);

        let report = OutdatedChecker::new(&host).check(&manager).await.unwrap();

        let status = |package: &str| {
            report
                .dependencies
                .iter()
                .find(|info| info.package == package)
                .map(|info| info.status.clone())
        };
        assert_eq!(
            status("acme/core"),
            Some(DependencyStatus::UpdateAvailable {
                current: "v1.0.0".into(),
                latest: "v1.3.0".into(),
                upgrade: UpgradeKind::Minor,
            })
        );
        assert_eq!(
            status("acme/utils"),
            Some(DependencyStatus::UpToDate {
                current: "v2.1.0".into()
            })
        );
        assert_eq!(
            status("acme/edge"),
            Some(DependencyStatus::Pinned {
                ref_type: RefType::Branch,
                reference: "main".into()
            })
        );
        assert_eq!(status("acme/new"), Some(DependencyStatus::NotInstalled));
        assert_eq!(status("acme/flaky"), None);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("acme/flaky"));
        assert_eq!(report.updates().count(), 1);
        // Branch-pinned and unlocked packages are not looked up.
        assert_eq!(host.fetcher().transport().calls(), 3);
    }
}
