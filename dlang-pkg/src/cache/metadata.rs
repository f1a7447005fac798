//! Metadata sidecar stored next to each cached package.

use serde::{Deserialize, Serialize};

/// Provenance of a cached package, written as `<commit>.json` beside the
/// package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// SRI hash of the tarball the package was extracted from.
    pub integrity: String,
    /// Tarball URL.
    pub resolved: String,
    pub commit_sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let metadata = PackageMetadata {
            integrity: "sha512-abc".into(),
            resolved: "https://example.com/t".into(),
            commit_sha: "abc123".into(),
        };
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["integrity"], "sha512-abc");
        assert_eq!(json["resolved"], "https://example.com/t");
        assert_eq!(json["commitSha"], "abc123");
    }
}
