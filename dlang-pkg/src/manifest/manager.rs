//! Workspace discovery and cached manifest/lock loading.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::error::{ManifestError, ManifestResult};
use super::lockfile::{parse_lock_file, LockFile};
use super::types::{DependencySource, ManifestDocument, Manifest};
use super::validate::{resolve_inside_root, validate_manifest};
use crate::cache::package_dir;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "model.yaml";

/// Lock file name, next to the manifest.
pub const LOCK_FILE: &str = "model.lock";

/// Package cache location, relative to the workspace root.
pub const PACKAGES_DIR: &str = ".dlang/packages";

/// Entry file used when a package manifest does not name one.
pub const DEFAULT_ENTRY: &str = "index.dlang";

/// Source file extension.
pub const SOURCE_EXTENSION: &str = "dlang";

/// A parsed file remembered together with the modification time it was
/// parsed at.
struct Cached<T> {
    path: PathBuf,
    modified: Option<SystemTime>,
    value: Arc<T>,
}

/// Workspace-scoped access to `model.yaml` and `model.lock`.
///
/// The workspace root is discovered once; concurrent
/// [`initialize`](Self::initialize) calls share one discovery. The manifest
/// and lock file are re-read only when their modification time changes or
/// the caches are invalidated.
#[derive(Default)]
pub struct ManifestManager {
    root: OnceCell<PathBuf>,
    manifest_cache: Mutex<Option<Cached<Manifest>>>,
    lock_cache: Mutex<Option<Cached<LockFile>>>,
}

impl ManifestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager for a known workspace root, skipping discovery.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let manager = Self::default();
        // A fresh cell cannot already be set.
        let _ = manager.root.set(root.into());
        manager
    }

    /// Discover the workspace root by walking up from `start_path` to the
    /// nearest directory containing [`MANIFEST_FILE`], falling back to
    /// `start_path` itself.
    ///
    /// Only the first call performs discovery; later calls (and callers
    /// racing the first one) get the same root.
    pub async fn initialize(&self, start_path: &Path) -> &Path {
        self.root
            .get_or_init(|| find_workspace_root(start_path))
            .await
            .as_path()
    }

    /// Workspace root, if initialized.
    pub fn workspace_root(&self) -> Option<&Path> {
        self.root.get().map(PathBuf::as_path)
    }

    fn root(&self) -> ManifestResult<&Path> {
        self.workspace_root().ok_or(ManifestError::NotInitialized)
    }

    pub fn manifest_path(&self) -> ManifestResult<PathBuf> {
        Ok(self.root()?.join(MANIFEST_FILE))
    }

    pub fn lock_path(&self) -> ManifestResult<PathBuf> {
        Ok(self.root()?.join(LOCK_FILE))
    }

    pub fn packages_dir(&self) -> ManifestResult<PathBuf> {
        Ok(self.root()?.join(PACKAGES_DIR))
    }

    /// Load and validate the manifest. Returns `None` if there is none.
    pub async fn get_manifest(&self) -> ManifestResult<Option<Arc<Manifest>>> {
        let root = self.root()?;
        let path = root.join(MANIFEST_FILE);

        let Some(modified) = modified_time(&path).await? else {
            self.invalidate_manifest_cache();
            return Ok(None);
        };
        if let Some(manifest) = lookup(&self.manifest_cache, &path, modified) {
            return Ok(Some(manifest));
        }

        let text = read_text(&path).await?;
        let doc = parse_manifest_document(&path, &text)?;
        let manifest = Arc::new(validate_manifest(doc, root)?);
        debug!(
            path = %path.display(),
            dependencies = manifest.dependencies.len(),
            "Loaded manifest"
        );

        store(&self.manifest_cache, path, modified, manifest.clone());
        Ok(Some(manifest))
    }

    /// Forget the cached manifest.
    pub fn invalidate_manifest_cache(&self) {
        *self.manifest_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Forget both the cached manifest and the cached lock file.
    pub fn invalidate_cache(&self) {
        self.invalidate_manifest_cache();
        *self.lock_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Load the lock file. Returns `None` if there is none.
    pub async fn get_lock_file(&self) -> ManifestResult<Option<Arc<LockFile>>> {
        let path = self.lock_path()?;

        let Some(modified) = modified_time(&path).await? else {
            *self.lock_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
            return Ok(None);
        };
        if let Some(lock) = lookup(&self.lock_cache, &path, modified) {
            return Ok(Some(lock));
        }

        let text = read_text(&path).await?;
        let lock = parse_lock_file(&text).map_err(|e| ManifestError::LockParse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let lock = Arc::new(lock);
        debug!(
            path = %path.display(),
            dependencies = lock.dependencies.len(),
            "Loaded lock file"
        );

        store(&self.lock_cache, path, modified, lock.clone());
        Ok(Some(lock))
    }

    /// Drop the cached lock file and load it again.
    pub async fn refresh_lock_file(&self) -> ManifestResult<Option<Arc<LockFile>>> {
        *self.lock_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.get_lock_file().await
    }

    /// Write the lock file atomically (temp file in the workspace root, then
    /// rename).
    pub async fn write_lock_file(&self, lock: &LockFile) -> ManifestResult<()> {
        let root = self.root()?.to_path_buf();
        let path = root.join(LOCK_FILE);
        let text = lock.to_json_string().map_err(|e| ManifestError::Write {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(&root)?;
            temp.write_all(text.as_bytes())?;
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|result| result)
        .map_err(|source| ManifestError::Write {
            path: path.clone(),
            source,
        })?;

        *self.lock_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!(
            path = %path.display(),
            dependencies = lock.dependencies.len(),
            "Wrote lock file"
        );
        Ok(())
    }

    /// Resolve an import specifier that names a manifest dependency.
    ///
    /// The dependency whose key is the longest prefix of `specifier` wins.
    /// A bare key resolves to the package's entry file (its own manifest's
    /// `model.entry` if it stays inside the package, else [`DEFAULT_ENTRY`]);
    /// `key/sub/path` resolves inside the package. Git packages resolve into
    /// the cache at their locked commit. Returns `None` when no dependency matches.
    pub async fn resolve_dependency_path(&self, specifier: &str) -> ManifestResult<Option<PathBuf>> {
        let root = self.root()?;
        let Some(manifest) = self.get_manifest().await? else {
            return Ok(None);
        };
        let Some(dependency) = manifest.dependency_for(specifier) else {
            return Ok(None);
        };

        let package_root = match &dependency.source {
            DependencySource::Path(path) => root.join(path),
            DependencySource::Git(git) => {
                let lock = self.get_lock_file().await?;
                let locked = lock
                    .as_ref()
                    .and_then(|lock| lock.dependencies.get(&git.package_id()))
                    .filter(|locked| locked.reference == git.reference)
                    .ok_or_else(|| ManifestError::DependencyNotLocked {
                        key: dependency.key.clone(),
                    })?;
                package_dir(&self.packages_dir()?, &git.owner, &git.repo, &locked.commit)
            }
        };

        let subpath = specifier[dependency.key.len()..].trim_start_matches('/');
        if !subpath.is_empty() {
            return resolve_inside_root(&package_root, specifier, subpath).map(Some);
        }

        let entry = package_entry(&package_root).await;
        match resolve_inside_root(&package_root, &dependency.key, &entry) {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                warn!(
                    package = %dependency.key,
                    entry = %entry,
                    error = %e,
                    "Package entry leaves the package, using default entry"
                );
                Ok(Some(package_root.join(DEFAULT_ENTRY)))
            }
        }
    }
}

async fn find_workspace_root(start_path: &Path) -> PathBuf {
    let start = std::path::absolute(start_path).unwrap_or_else(|_| start_path.to_path_buf());

    for dir in start.ancestors() {
        if fs::try_exists(dir.join(MANIFEST_FILE)).await.unwrap_or(false) {
            debug!(root = %dir.display(), "Found workspace root");
            return dir.to_path_buf();
        }
    }

    debug!(root = %start.display(), "No manifest found, using start path as workspace root");
    start
}

/// Modification time, or `None` if the file does not exist.
async fn modified_time(path: &Path) -> ManifestResult<Option<Option<SystemTime>>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.modified().ok())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ManifestError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn read_text(path: &Path) -> ManifestResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_manifest_document(path: &Path, text: &str) -> ManifestResult<ManifestDocument> {
    if text.trim().is_empty() {
        return Ok(ManifestDocument::default());
    }
    serde_yaml_ng::from_str(text).map_err(|e| ManifestError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Entry file named by a package's own manifest.
async fn package_entry(package_root: &Path) -> String {
    let path = package_root.join(MANIFEST_FILE);
    let Ok(text) = fs::read_to_string(&path).await else {
        return DEFAULT_ENTRY.to_string();
    };
    match parse_manifest_document(&path, &text) {
        Ok(doc) => doc
            .model
            .and_then(|model| model.entry)
            .unwrap_or_else(|| DEFAULT_ENTRY.to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable package manifest");
            DEFAULT_ENTRY.to_string()
        }
    }
}

fn lookup<T>(
    cache: &Mutex<Option<Cached<T>>>,
    path: &Path,
    modified: Option<SystemTime>,
) -> Option<Arc<T>> {
    let cache = cache.lock().unwrap_or_else(|e| e.into_inner());
    cache
        .as_ref()
        .filter(|c| c.path == path && modified.is_some() && c.modified == modified)
        .map(|c| c.value.clone())
}

fn store<T>(
    cache: &Mutex<Option<Cached<T>>>,
    path: PathBuf,
    modified: Option<SystemTime>,
    value: Arc<T>,
) {
    *cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(Cached {
        path,
        modified,
        value,
    });
}
