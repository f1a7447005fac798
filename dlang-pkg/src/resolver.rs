//! Import specifier resolution.
//!
//! An import specifier is one of:
//!
//! - relative (`./x`, `../x`), resolved against the importing file's directory
//! - an alias (`@lib/x`), resolved through the manifest `paths` map
//! - a dependency key (`acme/core`, `shared/sub/file`), resolved through
//!   the manifest dependencies and the lock file
//!
//! A resolved directory means its `index.dlang`; a resolved path without an
//! extension gets `.dlang` appended.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::manifest::{
    resolve_inside_root, ManifestError, ManifestManager, DEFAULT_ENTRY, SOURCE_EXTENSION,
};

/// Import resolution errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Empty import specifier")]
    EmptySpecifier,

    /// Nothing in the manifest matches the specifier.
    #[error("Cannot resolve import '{0}'. Hint: add it to 'dependencies' or 'paths' in model.yaml, or use a relative path.")]
    Unresolved(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Resolves import specifiers to files.
pub struct ImportResolver {
    manifest: Arc<ManifestManager>,
}

impl ImportResolver {
    pub fn new(manifest: Arc<ManifestManager>) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &ManifestManager {
        &self.manifest
    }

    /// Resolve `specifier` as imported from a file in `base_dir`.
    ///
    /// Initializes the manifest manager from `base_dir` if needed.
    pub async fn resolve_from(&self, base_dir: &Path, specifier: &str) -> Result<PathBuf, ResolveError> {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return Err(ResolveError::EmptySpecifier);
        }

        let resolved = if is_relative(specifier) {
            base_dir.join(specifier)
        } else if specifier.starts_with('@') {
            self.resolve_alias(base_dir, specifier).await?
        } else {
            let root = self.manifest.initialize(base_dir).await;
            trace!(specifier, root = %root.display(), "Resolving dependency import");
            self.manifest
                .resolve_dependency_path(specifier)
                .await?
                .ok_or_else(|| ResolveError::Unresolved(specifier.to_string()))?
        };

        Ok(finalize(resolved).await)
    }

    async fn resolve_alias(&self, base_dir: &Path, specifier: &str) -> Result<PathBuf, ResolveError> {
        let root = self.manifest.initialize(base_dir).await;
        let manifest = self
            .manifest
            .get_manifest()
            .await?
            .ok_or_else(|| ResolveError::Unresolved(specifier.to_string()))?;
        let (alias, target) = manifest
            .alias_for(specifier)
            .ok_or_else(|| ResolveError::Unresolved(specifier.to_string()))?;

        let rest = specifier[alias.len()..].trim_start_matches('/');
        let target = target.join(rest);
        Ok(resolve_inside_root(
            root,
            specifier,
            &target.to_string_lossy(),
        )?)
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Directories resolve to their entry file; bare paths get the extension.
async fn finalize(path: PathBuf) -> PathBuf {
    if tokio::fs::metadata(&path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
    {
        return path.join(DEFAULT_ENTRY);
    }
    if path.extension().is_none() {
        return path.with_extension(SOURCE_EXTENSION);
    }
    path
}
