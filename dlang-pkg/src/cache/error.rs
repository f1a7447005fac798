use std::path::PathBuf;
use thiserror::Error;

/// Package cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Owner, repo or commit is not usable as a directory name.
    #[error("Invalid cache key component '{0}'")]
    InvalidKey(String),

    /// Filesystem operation on a cache path failed.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Installing a package into the cache failed.
    #[error("Failed to install {package} into the cache: {source}")]
    Install {
        package: String,
        source: std::io::Error,
    },
}
