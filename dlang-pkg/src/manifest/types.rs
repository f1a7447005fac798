//! Manifest document types.
//!
//! A dependency is written either as a bare ref string (the key doubles as
//! `owner/repo`) or as an extended map. [`DependencySpec::normalize`] is the
//! single place those shapes are reconciled; everything downstream works on
//! the canonical [`Dependency`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw `model.yaml` document as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, String>,
}

/// The `model:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Entry file, relative to the package root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

/// A dependency as written in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `owner/repo: v1.0.0`
    Ref(String),
    /// `name: { source: owner/repo, ref: v1.0.0 }` or `name: { path: ./lib }`
    Extended(ExtendedDependency),
}

/// Extended dependency form. Exactly one of `source` and `path` is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DependencySpec {
    /// Normalize to the extended form. The short form uses the key as source.
    pub fn normalize(&self, key: &str) -> ExtendedDependency {
        match self {
            DependencySpec::Ref(reference) => ExtendedDependency {
                source: Some(key.to_string()),
                reference: Some(reference.clone()),
                ..Default::default()
            },
            DependencySpec::Extended(extended) => extended.clone(),
        }
    }
}

/// Where a validated dependency comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// A package hosted in a git repository.
    Git(GitDependency),
    /// A local folder, relative to the workspace root.
    Path(PathBuf),
}

/// A git-hosted dependency pinned to a ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitDependency {
    pub owner: String,
    pub repo: String,
    /// Tag, branch or commit, as written in the manifest.
    pub reference: String,
}

impl GitDependency {
    /// Package identifier `owner/repo`, the lock file key.
    pub fn package_id(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// A validated dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Manifest key; import specifiers are matched against it.
    pub key: String,
    pub source: DependencySource,
    pub description: Option<String>,
}

impl Dependency {
    pub fn as_git(&self) -> Option<&GitDependency> {
        match &self.source {
            DependencySource::Git(git) => Some(git),
            DependencySource::Path(_) => None,
        }
    }
}

/// A validated manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub model: Option<ModelInfo>,
    /// Dependencies keyed by manifest key.
    pub dependencies: BTreeMap<String, Dependency>,
    /// Path aliases (`@alias` to workspace-relative path).
    pub paths: BTreeMap<String, PathBuf>,
}

impl Manifest {
    /// Git dependencies in key order.
    pub fn git_dependencies(&self) -> impl Iterator<Item = &GitDependency> {
        self.dependencies.values().filter_map(Dependency::as_git)
    }

    /// Dependency whose key is the longest prefix of `specifier`
    /// (either equal to it or followed by `/`).
    pub fn dependency_for(&self, specifier: &str) -> Option<&Dependency> {
        longest_prefix_match(self.dependencies.iter(), specifier)
    }

    /// Path alias whose name is the longest prefix of `specifier`.
    pub fn alias_for(&self, specifier: &str) -> Option<(&str, &PathBuf)> {
        self.paths
            .iter()
            .filter(|(alias, _)| matches_prefix(specifier, alias))
            .max_by_key(|(alias, _)| alias.len())
            .map(|(alias, target)| (alias.as_str(), target))
    }
}

fn longest_prefix_match<'a, V>(
    entries: impl Iterator<Item = (&'a String, &'a V)>,
    specifier: &str,
) -> Option<&'a V> {
    entries
        .filter(|(key, _)| matches_prefix(specifier, key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, value)| value)
}

/// `specifier` equals `prefix` or continues it with a `/` segment.
pub(crate) fn matches_prefix(specifier: &str, prefix: &str) -> bool {
    match specifier.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Split `owner/repo` into its parts.
///
/// Both parts must be non-empty, contain only ASCII alphanumerics, `-`, `_`
/// or `.`, and must not be `.` or `..`. They become cache directory names.
pub fn parse_package_id(id: &str) -> Option<(String, String)> {
    let (owner, repo) = id.split_once('/')?;
    if is_valid_segment(owner) && is_valid_segment(repo) {
        Some((owner.to_string(), repo.to_string()))
    } else {
        None
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
