//! Lock file model (`model.lock`).
//!
//! The lock file is pretty-printed JSON with dependencies sorted by package
//! id so rewrites produce stable diffs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::parse_package_id;

/// Lock file format version written by this crate.
pub const LOCK_FILE_VERSION: &str = "1";

/// How a dependency ref was resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Tag,
    Branch,
    /// Entries written before ref types were recorded load as commits.
    #[default]
    Commit,
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefType::Tag => write!(f, "tag"),
            RefType::Branch => write!(f, "branch"),
            RefType::Commit => write!(f, "commit"),
        }
    }
}

/// One resolved dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedDependency {
    /// Ref as written in the manifest.
    #[serde(rename = "ref")]
    pub reference: String,

    #[serde(default)]
    pub ref_type: RefType,

    /// Tarball URL the package was fetched from.
    pub resolved: String,

    pub commit: String,

    /// SRI hash (`sha512-<base64>`) of the downloaded tarball.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// The whole lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            version: LOCK_FILE_VERSION.to_string(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// Serialize as pretty JSON with a trailing newline.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

/// Parse lock file text.
///
/// Only malformed JSON fails. A non-string `version` is stringified, and
/// entries that do not have the expected shape (or whose key is not
/// `owner/repo`) are dropped with a warning.
pub fn parse_lock_file(text: &str) -> Result<LockFile, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    let version = match value.get("version") {
        Some(serde_json::Value::String(v)) => v.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => LOCK_FILE_VERSION.to_string(),
    };

    let mut dependencies = BTreeMap::new();
    if let Some(entries) = value.get("dependencies").and_then(|d| d.as_object()) {
        for (package, entry) in entries {
            if parse_package_id(package).is_none() {
                warn!(package = %package, "Discarding lock entry with invalid package id");
                continue;
            }
            match serde_json::from_value::<LockedDependency>(entry.clone()) {
                Ok(locked) => {
                    dependencies.insert(package.clone(), locked);
                }
                Err(e) => {
                    warn!(package = %package, error = %e, "Discarding malformed lock entry");
                }
            }
        }
    }

    Ok(LockFile {
        version,
        dependencies,
    })
}
