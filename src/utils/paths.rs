//! Lexical path helpers.
//!
//! Everything that flows between the dependency walker, the template extractor
//! and the detector is a repository-root-relative string with forward slashes.
//! These helpers convert filesystem paths into that form without touching the
//! filesystem, so they work equally for paths that only exist on one git ref.

use std::path::{Component, Path, PathBuf};

use crate::constants::REMOTE_REFERENCE_PREFIXES;

/// Normalizes a path by resolving `.` and `..` components lexically.
///
/// Symlinks are not followed and the path does not have to exist.
///
/// # Examples
///
/// ```rust,no_run
/// use gitops_impact::utils::normalize_path;
/// use std::path::Path;
///
/// let normalized = normalize_path(Path::new("/repo/components/a/../b/./base"));
/// assert_eq!(normalized, Path::new("/repo/components/b/base"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or a prefix
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Express `path` relative to `root` as a forward-slash string.
///
/// Both paths are normalized first. Returns `None` when `path` lies outside
/// `root`. The root itself maps to `"."`.
#[must_use]
pub fn relative_to_root(root: &Path, path: &Path) -> Option<String> {
    let root = normalize_path(root);
    let path = normalize_path(path);
    let rel = path.strip_prefix(&root).ok()?;

    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        Some(".".to_string())
    } else {
        Some(parts.join("/"))
    }
}

/// Directory-aware prefix test on repository-relative paths.
///
/// `file` matches when it equals `dir` or lives below it. A trailing slash on
/// `dir` is optional, so `components/foo` does not match `components/foobar/x`.
/// An empty `dir` matches nothing.
#[must_use]
pub fn path_has_prefix(file: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        return false;
    }
    file == dir || file.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// Whether a kustomization reference points outside the repository.
#[must_use]
pub fn is_remote_reference(reference: &str) -> bool {
    REMOTE_REFERENCE_PREFIXES.iter().any(|prefix| reference.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("a/./b")), PathBuf::from("a/b"));
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn test_relative_to_root() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_to_root(root, Path::new("/repo/components/x/../y/base")),
            Some("components/y/base".to_string())
        );
        assert_eq!(relative_to_root(root, Path::new("/repo")), Some(".".to_string()));
        assert_eq!(relative_to_root(root, Path::new("/repo/../other/file")), None);
    }

    #[test]
    fn test_path_has_prefix() {
        assert!(path_has_prefix("components/foo/base/a.yaml", "components/foo"));
        assert!(path_has_prefix("components/foo/base/a.yaml", "components/foo/"));
        assert!(path_has_prefix("components/foo", "components/foo"));
        assert!(!path_has_prefix("components/foobar/a.yaml", "components/foo"));
        assert!(!path_has_prefix("other/a.yaml", "components/foo"));
        assert!(!path_has_prefix("a.yaml", ""));
    }

    #[test]
    fn test_is_remote_reference() {
        assert!(is_remote_reference("https://github.com/org/repo//path?ref=v1"));
        assert!(is_remote_reference("git@github.com:org/repo.git"));
        assert!(is_remote_reference("ssh://git@host/repo"));
        assert!(!is_remote_reference("../base"));
        assert!(!is_remote_reference("deployment.yaml"));
    }
}
