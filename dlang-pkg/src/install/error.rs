use std::path::PathBuf;
use thiserror::Error;

use super::drift::DriftReport;
use crate::cache::CacheError;
use crate::githost::GitHostError;
use crate::http::TransportError;
use crate::manifest::ManifestError;

/// Install errors.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("No model.yaml found in {0}. Hint: create one or run from inside a workspace.")]
    ManifestNotFound(PathBuf),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Frozen install found the lock file out of date.
    #[error("{0}")]
    FrozenDrift(DriftReport),

    /// Downloaded bytes do not match the locked hash.
    #[error("Integrity check failed for {package}: expected {expected}, got {actual}. Hint: the upstream tarball changed; verify the source and remove the lock entry to accept it.")]
    Integrity {
        package: String,
        expected: String,
        actual: String,
    },

    /// Two manifest entries point at the same package with different refs.
    #[error("{package} is required at both '{first}' and '{second}'. Hint: use a single ref per package.")]
    ConflictingRefs {
        package: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    GitHost(#[from] GitHostError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to stage download for {package}: {source}")]
    Staging {
        package: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
