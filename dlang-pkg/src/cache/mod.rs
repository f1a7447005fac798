//! Workspace package cache.
//!
//! Extracted packages live at
//!
//! ```text
//! <workspace>/.dlang/packages/<owner>/<repo>/<commit>/
//! <workspace>/.dlang/packages/<owner>/<repo>/<commit>.json   (metadata)
//! ```
//!
//! Entries are keyed by commit, so an entry never changes once written.
//! Installation extracts into a temporary sibling directory and renames it
//! into place, which makes concurrent installs of the same package safe.

mod error;
mod extract;
mod metadata;
mod store;

pub use error::CacheError;
pub use extract::extract_tarball;
pub use metadata::PackageMetadata;
pub use store::{package_dir, CachedPackage, PackageCache};
