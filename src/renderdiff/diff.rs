//! Per-component diff results.

use serde::Serialize;
use similar::TextDiff;

use super::normalize::normalize_manifests;
use crate::constants::DIFF_CONTEXT_LINES;
use crate::models::{ComponentPath, Environment};

/// Diff outcome for one (environment, component path) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDiff {
    /// Component path relative to the repository root.
    pub path: String,
    /// Cluster directory when the component targets one cluster.
    pub cluster_dir: Option<String>,
    /// Environment whose overlay deploys the component.
    pub env: Environment,
    /// Rendered output on base; `None` for a new component.
    #[serde(skip)]
    pub base_manifest: Option<Vec<u8>>,
    /// Rendered output on HEAD; `None` for a removed component.
    #[serde(skip)]
    pub head_manifest: Option<Vec<u8>>,
    /// Unified diff of the normalized manifests.
    pub diff: String,
    /// Lines added.
    pub added: usize,
    /// Lines removed.
    pub removed: usize,
    /// Set when the component could not be rendered. Such entries are kept so
    /// they can be reported, but are left out of totals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentDiff {
    /// An empty entry for `component` in `env`.
    #[must_use]
    pub fn new(component: &ComponentPath, env: Environment) -> Self {
        Self {
            path: component.path.clone(),
            cluster_dir: component.cluster_dir.clone(),
            env,
            base_manifest: None,
            head_manifest: None,
            diff: String::new(),
            added: 0,
            removed: 0,
            error: None,
        }
    }

    /// Whether the normalized manifests differ.
    #[must_use]
    pub fn has_diff(&self) -> bool {
        !self.diff.is_empty()
    }

    /// Whether rendering failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Fill `diff`, `added` and `removed` from the two manifests.
    ///
    /// Leaves the diff empty when the normalized manifests are identical.
    pub fn compute_diff(&mut self) {
        let base = normalize_manifests(self.base_manifest.as_deref().unwrap_or_default());
        let head = normalize_manifests(self.head_manifest.as_deref().unwrap_or_default());
        if base == head {
            return;
        }

        let base = String::from_utf8_lossy(&base);
        let head = String::from_utf8_lossy(&head);
        self.diff = unified_diff(&self.path, &base, &head);
        (self.added, self.removed) = count_stats(&self.diff);
    }
}

/// Unified diff with [`DIFF_CONTEXT_LINES`] of context and
/// `<path> (base)` / `<path> (head)` headers.
#[must_use]
pub fn unified_diff(path: &str, base: &str, head: &str) -> String {
    TextDiff::from_lines(base, head)
        .unified_diff()
        .context_radius(DIFF_CONTEXT_LINES)
        .header(&format!("{path} (base)"), &format!("{path} (head)"))
        .to_string()
}

/// Count added and removed lines in a unified diff.
///
/// The `---`/`+++` file headers before the first hunk are not counted; a
/// removed line that itself starts with `--` still is.
#[must_use]
pub fn count_stats(diff: &str) -> (usize, usize) {
    let mut added = 0;
    let mut removed = 0;
    let mut in_hunk = false;

    for line in diff.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }
        if !in_hunk {
            continue;
        }
        if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') {
            removed += 1;
        }
    }
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_stats() {
        let diff = "--- a/file\n+++ b/file\n@@ -1,3 +1,3 @@\n unchanged\n-removed line\n+added line\n unchanged\n+another added\n";
        assert_eq!(count_stats(diff), (2, 1));
    }

    #[test]
    fn test_count_stats_yaml_separator_lines() {
        let diff = "--- x (base)\n+++ x (head)\n@@ -1,2 +1,1 @@\n a: 1\n----\n";
        assert_eq!(count_stats(diff), (0, 1));
        assert_eq!(count_stats(""), (0, 0));
    }

    #[test]
    fn test_unified_diff_headers_and_context() {
        let base = "a\nb\nc\nd\ne\nf\ng\nh\n";
        let head = "a\nb\nc\nd\nE\nf\ng\nh\n";
        let diff = unified_diff("components/x", base, head);
        assert!(diff.starts_with("--- components/x (base)\n+++ components/x (head)\n"));
        assert!(diff.contains("-e\n+E\n"));
        // three lines of context either side, so "a" is outside the hunk
        assert!(!diff.contains("\n a\n"));
        assert!(diff.contains("\n b\n"));
    }

    #[test]
    fn test_compute_diff_changed() {
        let mut cd = ComponentDiff::new(&ComponentPath::new("components/foo"), Environment::Staging);
        cd.base_manifest = Some(b"apiVersion: v1\nkind: ConfigMap\ndata:\n  key: old-value\n".to_vec());
        cd.head_manifest = Some(b"apiVersion: v1\nkind: ConfigMap\ndata:\n  key: new-value\n".to_vec());
        cd.compute_diff();

        assert!(cd.has_diff());
        assert!(cd.diff.contains("-  key: old-value"));
        assert!(cd.diff.contains("+  key: new-value"));
        assert_eq!((cd.added, cd.removed), (1, 1));
    }

    #[test]
    fn test_compute_diff_reorder_only() {
        let mut cd = ComponentDiff::new(&ComponentPath::new("components/foo"), Environment::Staging);
        cd.base_manifest = Some(b"kind: A\nmetadata:\n  name: a\n---\nkind: B\nmetadata:\n  name: b\n".to_vec());
        cd.head_manifest = Some(b"kind: B\nmetadata:\n  name: b\n---\nkind: A\nmetadata:\n  name: a\n".to_vec());
        cd.compute_diff();

        assert!(!cd.has_diff());
        assert_eq!((cd.added, cd.removed), (0, 0));
    }

    #[test]
    fn test_compute_diff_new_component() {
        let mut cd = ComponentDiff::new(&ComponentPath::with_cluster("c/x", "p01"), Environment::Production);
        cd.head_manifest = Some(b"apiVersion: v1\nkind: Service\n".to_vec());
        cd.compute_diff();

        assert_eq!(cd.cluster_dir.as_deref(), Some("p01"));
        assert_eq!((cd.added, cd.removed), (2, 0));
    }
}
