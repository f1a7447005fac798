//! Manifest validation.
//!
//! Turns a [`ManifestDocument`] into a [`Manifest`]: every dependency is
//! normalized, checked for a usable source, and every local path is checked
//! to stay inside the workspace root.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::error::{ManifestError, ManifestResult};
use super::types::{
    parse_package_id, Dependency, DependencySource, GitDependency, Manifest, ManifestDocument,
};

/// Validate a parsed manifest document.
///
/// Errors are reported for the first offending entry in key order.
pub fn validate_manifest(doc: ManifestDocument, workspace_root: &Path) -> ManifestResult<Manifest> {
    let mut dependencies = BTreeMap::new();
    for (key, spec) in &doc.dependencies {
        let extended = spec.normalize(key);

        let source = match (extended.source, extended.path) {
            (Some(_), Some(_)) => return Err(ManifestError::MixedSource { key: key.clone() }),
            (None, None) => return Err(ManifestError::MissingSource { key: key.clone() }),
            (Some(source), None) => {
                let reference = extended
                    .reference
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| ManifestError::MissingRef { key: key.clone() })?;
                let (owner, repo) =
                    parse_package_id(&source).ok_or_else(|| ManifestError::InvalidSource {
                        key: key.clone(),
                        value: source.clone(),
                    })?;
                DependencySource::Git(GitDependency {
                    owner,
                    repo,
                    reference,
                })
            }
            (None, Some(path)) => {
                resolve_inside_root(workspace_root, key, &path)?;
                DependencySource::Path(PathBuf::from(path))
            }
        };

        dependencies.insert(
            key.clone(),
            Dependency {
                key: key.clone(),
                source,
                description: extended.description,
            },
        );
    }

    let mut paths = BTreeMap::new();
    for (alias, target) in doc.paths {
        if !alias.starts_with('@') {
            return Err(ManifestError::InvalidAlias { alias });
        }
        resolve_inside_root(workspace_root, &alias, &target)?;
        paths.insert(alias, PathBuf::from(target));
    }

    Ok(Manifest {
        model: doc.model,
        dependencies,
        paths,
    })
}

/// Join a relative `path` onto `root`, rejecting absolute paths and any path
/// whose `..` segments climb above `root`.
///
/// The check is lexical, so the target does not need to exist.
pub fn resolve_inside_root(root: &Path, key: &str, path: &str) -> ManifestResult<PathBuf> {
    if is_absolute_like(path) {
        return Err(ManifestError::AbsolutePath {
            key: key.to_string(),
            path: path.to_string(),
        });
    }

    let mut depth: usize = 0;
    let mut resolved = root.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                depth += 1;
                resolved.push(part);
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ManifestError::PathEscapesWorkspace {
                        key: key.to_string(),
                        path: path.to_string(),
                    });
                }
                depth -= 1;
                resolved.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ManifestError::AbsolutePath {
                    key: key.to_string(),
                    path: path.to_string(),
                })
            }
        }
    }
    Ok(resolved)
}

// Windows-style absolute paths are rejected on every platform so a manifest
// means the same thing everywhere.
fn is_absolute_like(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::types::{DependencySpec, ExtendedDependency};

    fn root() -> PathBuf {
        PathBuf::from("/work/model")
    }

    fn doc_with(key: &str, spec: DependencySpec) -> ManifestDocument {
        let mut doc = ManifestDocument::default();
        doc.dependencies.insert(key.to_string(), spec);
        doc
    }

    fn extended(source: Option<&str>, path: Option<&str>, reference: Option<&str>) -> DependencySpec {
        DependencySpec::Extended(ExtendedDependency {
            source: source.map(String::from),
            path: path.map(String::from),
            reference: reference.map(String::from),
            description: None,
        })
    }

    #[test]
    fn test_short_form_becomes_git_dependency() {
        let doc = doc_with("acme/core", DependencySpec::Ref("v1.0.0".into()));
        let manifest = validate_manifest(doc, &root()).unwrap();

        let dep = &manifest.dependencies["acme/core"];
        let git = dep.as_git().unwrap();
        assert_eq!(git.owner, "acme");
        assert_eq!(git.repo, "core");
        assert_eq!(git.reference, "v1.0.0");
        assert_eq!(git.package_id(), "acme/core");
    }

    #[test]
    fn test_both_source_and_path_rejected_with_hint() {
        let doc = doc_with("x", extended(Some("acme/core"), Some("./lib"), Some("v1")));
        let err = validate_manifest(doc, &root()).unwrap_err();

        assert!(matches!(err, ManifestError::MixedSource { .. }));
        assert!(err.to_string().contains("Hint:"));
    }

    #[test]
    fn test_neither_source_nor_path_rejected() {
        let doc = doc_with("x", extended(None, None, Some("v1")));
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingSource { .. }));
    }

    #[test]
    fn test_source_without_ref_rejected() {
        let doc = doc_with("x", extended(Some("acme/core"), None, None));
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingRef { .. }));

        let doc = doc_with("x", extended(Some("acme/core"), None, Some("  ")));
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingRef { .. }));
    }

    #[test]
    fn test_malformed_source_rejected() {
        let doc = doc_with("core", DependencySpec::Ref("v1.0.0".into()));
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidSource { .. }));
    }

    #[test]
    fn test_local_path_inside_root_accepted() {
        let doc = doc_with("shared", extended(None, Some("./lib/shared"), None));
        let manifest = validate_manifest(doc, &root()).unwrap();

        assert_eq!(
            manifest.dependencies["shared"].source,
            DependencySource::Path(PathBuf::from("./lib/shared"))
        );
    }

    #[test]
    fn test_escaping_path_rejected() {
        let doc = doc_with("secret", extended(None, Some("../../secret"), None));
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::PathEscapesWorkspace { .. }));
    }

    #[test]
    fn test_absolute_path_rejected() {
        for path in ["/etc/passwd", "\\\\server\\share", "C:\\models"] {
            let doc = doc_with("abs", extended(None, Some(path), None));
            let err = validate_manifest(doc, &root()).unwrap_err();
            assert!(
                matches!(err, ManifestError::AbsolutePath { .. }),
                "{path} should be rejected as absolute"
            );
        }
    }

    #[test]
    fn test_alias_must_start_with_at() {
        let mut doc = ManifestDocument::default();
        doc.paths.insert("lib".into(), "./lib".into());
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAlias { .. }));
    }

    #[test]
    fn test_alias_target_must_stay_inside() {
        let mut doc = ManifestDocument::default();
        doc.paths.insert("@up".into(), "../outside".into());
        let err = validate_manifest(doc, &root()).unwrap_err();
        assert!(matches!(err, ManifestError::PathEscapesWorkspace { .. }));
    }

    #[test]
    fn test_resolve_inside_root_allows_inner_parent_segments() {
        let resolved = resolve_inside_root(&root(), "k", "lib/../models/./user").unwrap();
        assert_eq!(resolved, PathBuf::from("/work/model/models/user"));

        assert!(resolve_inside_root(&root(), "k", "lib/../../x").is_err());
    }
}
