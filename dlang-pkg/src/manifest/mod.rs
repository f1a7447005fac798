//! Workspace manifest (`model.yaml`) and lock file (`model.lock`).
//!
//! - [`types`](self::types) - the manifest document and its canonical form
//! - [`validate`](self::validate) - structural and path-safety validation
//! - [`lockfile`](self::lockfile) - lock file model and lenient parsing
//! - [`ManifestManager`] - workspace discovery, cached loading, dependency
//!   path resolution

mod error;
mod lockfile;
mod manager;
mod types;
mod validate;

pub use error::{ManifestError, ManifestResult};
pub use lockfile::{parse_lock_file, LockFile, LockedDependency, RefType, LOCK_FILE_VERSION};
pub use manager::{
    ManifestManager, DEFAULT_ENTRY, LOCK_FILE, MANIFEST_FILE, PACKAGES_DIR, SOURCE_EXTENSION,
};
pub use types::{
    parse_package_id, Dependency, DependencySource, DependencySpec, ExtendedDependency,
    GitDependency, Manifest, ManifestDocument, ModelInfo,
};
pub use validate::{resolve_inside_root, validate_manifest};
