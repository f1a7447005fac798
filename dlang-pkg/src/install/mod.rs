//! Installing manifest dependencies.
//!
//! [`InstallService`] resolves each git dependency to a commit, downloads
//! and verifies its tarball, extracts it into the package cache and records
//! the result in `model.lock`.

mod drift;
mod error;
mod events;
mod integrity;
mod service;

pub use drift::{detect_drift, DriftReport};
pub use error::InstallError;
pub use events::{InstallEvent, ProgressCallback};
pub use integrity::{compute_integrity, verify_integrity};
pub use service::{InstallOptions, InstallResult, InstallService};
