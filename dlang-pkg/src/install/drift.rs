//! Manifest versus lock file comparison for frozen installs.

use std::collections::BTreeMap;
use std::fmt;

use crate::manifest::{GitDependency, LockFile};

/// Differences between the manifest and the lock file.
///
/// Each list holds `owner/repo` package ids in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// In the manifest but not in the lock file.
    pub added: Vec<String>,
    /// In the lock file but not in the manifest.
    pub removed: Vec<String>,
    /// In both, with a different ref.
    pub changed: Vec<String>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock file is out of date with the manifest")?;
        for (label, packages) in [
            ("added", &self.added),
            ("removed", &self.removed),
            ("changed", &self.changed),
        ] {
            if !packages.is_empty() {
                write!(f, "; {}: {}", label, packages.join(", "))?;
            }
        }
        write!(f, ". Run install without --frozen to update the lock file.")
    }
}

/// Compare manifest git dependencies against the lock file. No network.
pub fn detect_drift<'a>(
    dependencies: impl IntoIterator<Item = &'a GitDependency>,
    lock: &LockFile,
) -> DriftReport {
    let wanted: BTreeMap<String, &str> = dependencies
        .into_iter()
        .map(|dep| (dep.package_id(), dep.reference.as_str()))
        .collect();

    let mut report = DriftReport::default();
    for (package, reference) in &wanted {
        match lock.dependencies.get(package) {
            None => report.added.push(package.clone()),
            Some(locked) if locked.reference != *reference => report.changed.push(package.clone()),
            Some(_) => {}
        }
    }
    report.removed = lock
        .dependencies
        .keys()
        .filter(|package| !wanted.contains_key(*package))
        .cloned()
        .collect();
    report
}
