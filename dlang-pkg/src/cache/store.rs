//! Package cache storage.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::extract::extract_tarball;
use super::metadata::PackageMetadata;

const TEMP_PREFIX: &str = ".tmp-";

/// Directory of a cached package below `packages_root`.
pub fn package_dir(packages_root: &Path, owner: &str, repo: &str, commit: &str) -> PathBuf {
    packages_root.join(owner).join(repo).join(commit)
}

/// A package found by [`PackageCache::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPackage {
    pub owner: String,
    pub repo: String,
    pub commit: String,
    pub path: PathBuf,
}

/// Commit-keyed store of extracted packages.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// Cache rooted at `packages_root`.
    pub fn new(packages_root: impl Into<PathBuf>) -> Self {
        Self {
            root: packages_root.into(),
        }
    }

    /// Cache for a workspace (`<root>/.dlang/packages`).
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self::new(workspace_root.join(crate::manifest::PACKAGES_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_path(&self, owner: &str, repo: &str, commit: &str) -> PathBuf {
        package_dir(&self.root, owner, repo, commit)
    }

    fn metadata_path(&self, owner: &str, repo: &str, commit: &str) -> PathBuf {
        self.root.join(owner).join(repo).join(format!("{commit}.json"))
    }

    /// Whether the package is cached.
    pub async fn has(&self, owner: &str, repo: &str, commit: &str) -> bool {
        self.get(owner, repo, commit).await.is_some()
    }

    /// Path of the cached package, if present.
    pub async fn get(&self, owner: &str, repo: &str, commit: &str) -> Option<PathBuf> {
        if validate_key(owner, repo, commit).is_err() {
            return None;
        }
        let path = self.package_path(owner, repo, commit);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Some(path),
            _ => None,
        }
    }

    /// Extract `tarball` into the cache and return the package path.
    ///
    /// Safe to call concurrently for the same package: each caller extracts
    /// into its own temporary directory and renames it into place. Callers
    /// that lose the rename discard their copy and return the winner's path.
    pub async fn put(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        tarball: &Path,
    ) -> Result<PathBuf, CacheError> {
        validate_key(owner, repo, commit)?;
        let package = format!("{owner}/{repo}@{commit}");
        let target = self.package_path(owner, repo, commit);
        if let Some(existing) = self.get(owner, repo, commit).await {
            debug!(package = %package, "Package already cached");
            return Ok(existing);
        }

        let parent = self.root.join(owner).join(repo);
        fs::create_dir_all(&parent)
            .await
            .map_err(|source| CacheError::Io {
                path: parent.clone(),
                source,
            })?;

        let temp = tempfile::Builder::new()
            .prefix(&format!("{TEMP_PREFIX}{commit}-"))
            .tempdir_in(&parent)
            .map_err(|source| CacheError::Install {
                package: package.clone(),
                source,
            })?;

        let staging = temp.path().to_path_buf();
        let source = tarball.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_tarball(&source, &staging))
            .await
            .map_err(io::Error::other)
            .and_then(|result| result);

        let files = match extracted {
            Ok(files) => files,
            Err(source) => {
                if let Err(e) = temp.close() {
                    warn!(package = %package, error = %e, "Failed to remove temporary directory");
                }
                return Err(CacheError::Install { package, source });
            }
        };

        let renamed = fs::rename(temp.path(), &target).await;
        match renamed {
            Ok(()) => {
                // The temp path no longer exists, so dropping the guard is a no-op.
                drop(temp);
                info!(package = %package, files, path = %target.display(), "Cached package");
                Ok(target)
            }
            Err(source) => {
                // Cleanup is best-effort and never fails the put.
                if let Err(e) = temp.close() {
                    warn!(package = %package, error = %e, "Failed to remove temporary directory");
                }
                if fs::try_exists(&target).await.unwrap_or(false) {
                    debug!(package = %package, "Lost install race, using existing copy");
                    Ok(target)
                } else {
                    Err(CacheError::Install { package, source })
                }
            }
        }
    }

    /// Remove a cached package and its metadata. Returns whether it existed.
    pub async fn remove(&self, owner: &str, repo: &str, commit: &str) -> Result<bool, CacheError> {
        validate_key(owner, repo, commit)?;
        let path = self.package_path(owner, repo, commit);
        let existed = match fs::remove_dir_all(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let metadata = self.metadata_path(owner, repo, commit);
        match fs::remove_file(&metadata).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CacheError::Io {
                    path: metadata,
                    source,
                })
            }
        }

        if existed {
            debug!(owner, repo, commit, "Removed cached package");
        }
        Ok(existed)
    }

    /// Remove every cached package.
    pub async fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!(path = %self.root.display(), "Cleared package cache");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: self.root.clone(),
                source,
            }),
        }
    }

    /// All cached packages, sorted by owner, repo and commit.
    pub async fn list(&self) -> Result<Vec<CachedPackage>, CacheError> {
        let mut packages = Vec::new();
        for owner in subdirectories(&self.root).await? {
            let owner_dir = self.root.join(&owner);
            for repo in subdirectories(&owner_dir).await? {
                let repo_dir = owner_dir.join(&repo);
                for commit in subdirectories(&repo_dir).await? {
                    if commit.starts_with(TEMP_PREFIX) {
                        continue;
                    }
                    packages.push(CachedPackage {
                        path: repo_dir.join(&commit),
                        owner: owner.clone(),
                        repo: repo.clone(),
                        commit,
                    });
                }
            }
        }
        packages.sort_by(|a, b| {
            (&a.owner, &a.repo, &a.commit).cmp(&(&b.owner, &b.repo, &b.commit))
        });
        Ok(packages)
    }

    /// Read the metadata sidecar. Missing or corrupt metadata yields `None`.
    pub async fn read_metadata(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Option<PackageMetadata> {
        validate_key(owner, repo, commit).ok()?;
        let path = self.metadata_path(owner, repo, commit);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read package metadata");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt package metadata");
                None
            }
        }
    }

    /// Write the metadata sidecar.
    pub async fn write_metadata(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        metadata: &PackageMetadata,
    ) -> Result<(), CacheError> {
        validate_key(owner, repo, commit)?;
        let path = self.metadata_path(owner, repo, commit);
        let text = serde_json::to_string_pretty(metadata).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        let parent = self.root.join(owner).join(repo);
        fs::create_dir_all(&parent)
            .await
            .map_err(|source| CacheError::Io {
                path: parent.clone(),
                source,
            })?;

        // Readers never see a partially written sidecar.
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(".json")
                .tempfile_in(&parent)?;
            temp.write_all(text.as_bytes())?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)
        .and_then(|result| result)
        .map_err(|source| CacheError::Io { path, source })
    }
}

fn validate_key(owner: &str, repo: &str, commit: &str) -> Result<(), CacheError> {
    for component in [owner, repo, commit] {
        let valid = !component.is_empty()
            && component != "."
            && component != ".."
            && !component.starts_with(TEMP_PREFIX)
            && !component.contains(['/', '\\']);
        if !valid {
            return Err(CacheError::InvalidKey(component.to_string()));
        }
    }
    Ok(())
}

/// Names of the directories directly inside `dir`; empty if it is missing.
async fn subdirectories(dir: &Path) -> Result<Vec<String>, CacheError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CacheError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                return Err(CacheError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if let (true, Ok(name)) = (is_dir, entry.file_name().into_string()) {
            names.push(name);
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::extract::build_tarball;
    use std::sync::Arc;
    use tempfile::TempDir;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    fn setup() -> (TempDir, PackageCache, PathBuf) {
        let temp = TempDir::new().unwrap();
        let cache = PackageCache::for_workspace(temp.path());
        let tarball = temp.path().join("core.tar.gz");
        std::fs::write(
            &tarball,
            build_tarball("acme-core-0123456", &[("index.dlang", "model Core {}")]),
        )
        .unwrap();
        (temp, cache, tarball)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (temp, cache, tarball) = setup();
        assert!(!cache.has("acme", "core", COMMIT).await);

        let path = cache.put("acme", "core", COMMIT, &tarball).await.unwrap();

        assert_eq!(
            path,
            temp.path()
                .join(".dlang/packages")
                .join("acme")
                .join("core")
                .join(COMMIT)
        );
        assert!(cache.has("acme", "core", COMMIT).await);
        assert_eq!(cache.get("acme", "core", COMMIT).await, Some(path.clone()));
        assert_eq!(
            std::fs::read_to_string(path.join("index.dlang")).unwrap(),
            "model Core {}"
        );
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (_temp, cache, tarball) = setup();
        let first = cache.put("acme", "core", COMMIT, &tarball).await.unwrap();
        let second = cache.put("acme", "core", COMMIT, &tarball).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_converge() {
        let (_temp, cache, tarball) = setup();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let tarball = tarball.clone();
                tokio::spawn(async move { cache.put("acme", "core", COMMIT, &tarball).await })
            })
            .collect();

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }
        assert!(paths.windows(2).all(|w| w[0] == w[1]));

        let repo_dir = cache.root().join("acme").join("core");
        let names: Vec<String> = std::fs::read_dir(&repo_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![COMMIT.to_string()], "leftover temp dirs");
    }

    #[tokio::test]
    async fn test_failed_put_leaves_nothing_behind() {
        let (temp, cache, _) = setup();
        let bad = temp.path().join("bad.tar.gz");
        std::fs::write(&bad, b"not a tarball").unwrap();

        let err = cache.put("acme", "core", COMMIT, &bad).await.unwrap_err();

        assert!(matches!(err, CacheError::Install { .. }));
        assert!(err.to_string().contains("acme/core"));
        assert!(!cache.has("acme", "core", COMMIT).await);
        let leftovers = std::fs::read_dir(cache.root().join("acme").join("core"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let (_temp, cache, tarball) = setup();
        let err = cache.put("..", "core", COMMIT, &tarball).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
        assert!(cache.get("acme", "core/../x", COMMIT).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (_temp, cache, tarball) = setup();
        cache.put("acme", "core", COMMIT, &tarball).await.unwrap();
        cache.put("acme", "utils", COMMIT, &tarball).await.unwrap();

        assert!(cache.remove("acme", "core", COMMIT).await.unwrap());
        assert!(!cache.remove("acme", "core", COMMIT).await.unwrap());
        assert!(!cache.has("acme", "core", COMMIT).await);
        assert!(cache.has("acme", "utils", COMMIT).await);

        cache.clear().await.unwrap();
        assert!(!cache.has("acme", "utils", COMMIT).await);
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_skips_temp_dirs_and_sidecars() {
        let (_temp, cache, tarball) = setup();
        cache.put("zeta", "last", COMMIT, &tarball).await.unwrap();
        cache.put("acme", "core", COMMIT, &tarball).await.unwrap();
        std::fs::create_dir_all(cache.root().join("acme/core/.tmp-stale")).unwrap();
        let metadata = PackageMetadata {
            integrity: "sha512-x".into(),
            resolved: "u".into(),
            commit_sha: COMMIT.into(),
        };
        cache
            .write_metadata("acme", "core", COMMIT, &metadata)
            .await
            .unwrap();

        let listed = cache.list().await.unwrap();

        let ids: Vec<_> = listed
            .iter()
            .map(|p| format!("{}/{}@{}", p.owner, p.repo, p.commit))
            .collect();
        assert_eq!(
            ids,
            vec![format!("acme/core@{COMMIT}"), format!("zeta/last@{COMMIT}")]
        );
    }

    #[tokio::test]
    async fn test_list_empty_cache() {
        let temp = TempDir::new().unwrap();
        let cache = PackageCache::for_workspace(temp.path());
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_roundtrip_and_corruption() {
        let (_temp, cache, _) = setup();
        assert!(cache.read_metadata("acme", "core", COMMIT).await.is_none());

        let metadata = PackageMetadata {
            integrity: "sha512-abc".into(),
            resolved: "https://api.github.com/repos/acme/core/tarball/x".into(),
            commit_sha: COMMIT.into(),
        };
        cache
            .write_metadata("acme", "core", COMMIT, &metadata)
            .await
            .unwrap();
        assert_eq!(
            cache.read_metadata("acme", "core", COMMIT).await,
            Some(metadata)
        );

        std::fs::write(
            cache.root().join("acme/core").join(format!("{COMMIT}.json")),
            "{ broken",
        )
        .unwrap();
        assert!(cache.read_metadata("acme", "core", COMMIT).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_metadata_readers_never_see_partial_writes() {
        let (_temp, cache, _) = setup();
        let cache = Arc::new(cache);
        let metadata = |n: usize| PackageMetadata {
            integrity: format!("sha512-{}", "x".repeat(4096 + n)),
            resolved: format!("https://api.github.com/repos/acme/core/tarball/{n}"),
            commit_sha: COMMIT.into(),
        };
        cache
            .write_metadata("acme", "core", COMMIT, &metadata(0))
            .await
            .unwrap();

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for n in 1..50 {
                    cache
                        .write_metadata("acme", "core", COMMIT, &metadata(n))
                        .await
                        .unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let read = cache.read_metadata("acme", "core", COMMIT).await;
                        assert!(read.is_some(), "sidecar was read mid-write");
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }

        let leftovers: Vec<_> = std::fs::read_dir(cache.root().join("acme/core"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
