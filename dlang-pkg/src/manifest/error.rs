//! Error types for the manifest module.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors raised while loading or validating the manifest and lock file.
///
/// Configuration mistakes always say how to fix them.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Reading a file failed.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing a file failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The manifest is not valid YAML or has the wrong shape.
    #[error("Invalid manifest {path}: {message}. Hint: check the YAML syntax and that 'dependencies' and 'paths' are maps.")]
    Parse { path: PathBuf, message: String },

    /// The lock file is not valid JSON.
    #[error("Invalid lock file {path}: {message}. Hint: delete the lock file and run install again to regenerate it.")]
    LockParse { path: PathBuf, message: String },

    /// The workspace root has not been discovered yet.
    #[error("Workspace not initialized. Hint: call initialize() with a path inside the workspace first.")]
    NotInitialized,

    /// A dependency sets both `source` and `path`.
    #[error("Dependency '{key}' sets both 'source' and 'path'. Hint: use 'source' (with 'ref') for a git package or 'path' for a local folder, not both.")]
    MixedSource { key: String },

    /// A dependency sets neither `source` nor `path`.
    #[error("Dependency '{key}' has no 'source' or 'path'. Hint: add 'source: owner/repo' with a 'ref', or 'path: ./local/dir'.")]
    MissingSource { key: String },

    /// A git dependency has no `ref`.
    #[error("Dependency '{key}' has a 'source' but no 'ref'. Hint: pin it to a tag, branch or commit, e.g. 'ref: v1.0.0'.")]
    MissingRef { key: String },

    /// A git dependency source is not `owner/repo`.
    #[error("Dependency '{key}' has invalid source '{value}'. Hint: sources are written 'owner/repo'.")]
    InvalidSource { key: String, value: String },

    /// A path is absolute.
    #[error("'{key}' uses absolute path '{path}'. Hint: use a path relative to the workspace root, e.g. './lib/shared'.")]
    AbsolutePath { key: String, path: String },

    /// A path resolves outside the workspace root.
    #[error("'{key}' path '{path}' escapes the workspace root. Hint: local dependencies and path aliases must stay inside the workspace.")]
    PathEscapesWorkspace { key: String, path: String },

    /// A path alias does not start with `@`.
    #[error("Path alias '{alias}' must start with '@'. Hint: rename it to '@{alias}'.")]
    InvalidAlias { alias: String },

    /// A git dependency has no lock entry.
    #[error("Dependency '{key}' is not installed. Hint: run install to resolve it and update the lock file.")]
    DependencyNotLocked { key: String },
}
