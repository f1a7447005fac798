//! Version tag comparison and upgrade classification.
//!
//! Git tags are free-form, so only tags of the form `v?MAJOR.MINOR.PATCH`
//! take part in version ordering. Everything else (`latest`, `nightly`,
//! `v2.0.0-rc.1`) is ignored when looking for the newest release.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;

/// Kind of upgrade between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpgradeKind {
    Patch,
    Minor,
    Major,
}

impl fmt::Display for UpgradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeKind::Major => write!(f, "major"),
            UpgradeKind::Minor => write!(f, "minor"),
            UpgradeKind::Patch => write!(f, "patch"),
        }
    }
}

fn release_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)$").expect("release tag pattern is valid")
    })
}

/// Parse a release tag (`v1.2.3` or `1.2.3`) into a [`Version`].
///
/// Returns `None` for anything that is not a plain three-component release.
pub fn parse_release_tag(tag: &str) -> Option<Version> {
    let caps = release_tag_pattern().captures(tag.trim())?;
    let major = caps[1].parse().ok()?;
    let minor = caps[2].parse().ok()?;
    let patch = caps[3].parse().ok()?;
    Some(Version::new(major, minor, patch))
}

/// Returns true if the tag looks like a release version.
pub fn is_release_tag(tag: &str) -> bool {
    parse_release_tag(tag).is_some()
}

/// Compare two version strings by numeric components.
///
/// A leading `v` is ignored. Missing or non-numeric components compare as 0,
/// so `"1.2"` equals `"v1.2.0"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = numeric_components(a);
    let right = numeric_components(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn numeric_components(version: &str) -> Vec<u64> {
    strip_v(version)
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

fn strip_v(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

/// Find the newest release tag.
///
/// Tags that are not `v?MAJOR.MINOR.PATCH` are skipped. Returns `None` when
/// no tag qualifies.
pub fn find_latest_version<S: AsRef<str>>(tags: &[S]) -> Option<String> {
    let mut releases: Vec<(Version, &str)> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|tag| parse_release_tag(tag).map(|v| (v, tag)))
        .collect();

    releases.sort_by(|a, b| b.0.cmp(&a.0));
    releases.first().map(|(_, tag)| tag.to_string())
}

/// Classify the upgrade from `current` to `latest`.
///
/// Compares the first differing component: major, then minor, and anything
/// else counts as a patch upgrade.
pub fn classify_upgrade(current: &str, latest: &str) -> UpgradeKind {
    let current: Vec<&str> = strip_v(current).split('.').collect();
    let latest: Vec<&str> = strip_v(latest).split('.').collect();

    if current.first() != latest.first() {
        UpgradeKind::Major
    } else if current.get(1) != latest.get(1) {
        UpgradeKind::Minor
    } else {
        UpgradeKind::Patch
    }
}

/// Returns true if `latest` is strictly newer than `current`.
pub fn is_newer(current: &str, latest: &str) -> bool {
    compare_versions(latest, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_find_latest_version_skips_non_release_tags() {
        let tags = ["v1.0.0", "v1.2.0", "latest"];
        assert_eq!(find_latest_version(&tags), Some("v1.2.0".to_string()));
    }

    #[test]
    fn test_find_latest_version_none_when_no_release() {
        assert_eq!(find_latest_version(&["latest"]), None);
        let empty: [&str; 0] = [];
        assert_eq!(find_latest_version(&empty), None);
    }

    #[test]
    fn test_find_latest_version_numeric_not_lexical() {
        let tags = ["v1.9.0", "v1.10.0", "v1.2.0"];
        assert_eq!(find_latest_version(&tags), Some("v1.10.0".to_string()));
    }

    #[test]
    fn test_find_latest_version_accepts_unprefixed() {
        let tags = vec!["0.9.0".to_string(), "1.0.0".to_string(), "v0.10.0".to_string()];
        assert_eq!(find_latest_version(&tags), Some("1.0.0".to_string()));
    }

    #[test]
    fn test_prerelease_tags_are_ignored() {
        let tags = ["v1.0.0", "v2.0.0-rc.1"];
        assert_eq!(find_latest_version(&tags), Some("v1.0.0".to_string()));
    }

    #[test]
    fn test_classify_upgrade() {
        assert_eq!(classify_upgrade("v1.0.0", "v2.0.0"), UpgradeKind::Major);
        assert_eq!(classify_upgrade("v1.0.0", "v1.1.0"), UpgradeKind::Minor);
        assert_eq!(classify_upgrade("v1.0.0", "v1.0.1"), UpgradeKind::Patch);
        assert_eq!(classify_upgrade("1.0.0", "v1.0.1"), UpgradeKind::Patch);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("v1.2.0", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("v1.10.0", "v1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("0.1.0", "0.1.1"), Ordering::Less);
        assert!(is_newer("v1.0.0", "v1.0.1"));
        assert!(!is_newer("v1.0.1", "v1.0.1"));
    }

    #[test]
    fn test_upgrade_kind_display() {
        assert_eq!(UpgradeKind::Major.to_string(), "major");
        assert_eq!(UpgradeKind::Minor.to_string(), "minor");
        assert_eq!(UpgradeKind::Patch.to_string(), "patch");
    }

    proptest! {
        #[test]
        fn latest_is_never_older_than_any_release(
            versions in prop::collection::vec((0u64..50, 0u64..50, 0u64..50), 1..20)
        ) {
            let tags: Vec<String> = versions
                .iter()
                .map(|(a, b, c)| format!("v{}.{}.{}", a, b, c))
                .collect();
            let latest = find_latest_version(&tags).unwrap();
            for tag in &tags {
                prop_assert_ne!(compare_versions(tag, &latest), Ordering::Greater);
            }
        }
    }
}
