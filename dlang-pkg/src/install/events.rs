//! Install progress events.

use std::sync::Arc;

/// Progress reported while installing.
///
/// For any one package the order is `PackageStart`, any number of
/// `PackageProgress`, then exactly one of `PackageComplete` or
/// `PackageError`. Events for different packages may interleave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// Installation is starting.
    Start { total: usize },
    PackageStart { package: String },
    PackageProgress {
        package: String,
        bytes_received: u64,
        total_bytes: Option<u64>,
    },
    PackageComplete {
        package: String,
        commit: String,
        /// Served from the cache without downloading.
        cached: bool,
    },
    PackageError { package: String, message: String },
}

impl InstallEvent {
    /// Package the event belongs to, if any.
    pub fn package(&self) -> Option<&str> {
        match self {
            InstallEvent::Start { .. } => None,
            InstallEvent::PackageStart { package }
            | InstallEvent::PackageProgress { package, .. }
            | InstallEvent::PackageComplete { package, .. }
            | InstallEvent::PackageError { package, .. } => Some(package),
        }
    }
}

/// Callback receiving install events.
pub type ProgressCallback = Arc<dyn Fn(InstallEvent) + Send + Sync>;
