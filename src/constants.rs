//! Global constants used throughout the gitops-impact codebase.
//!
//! These are the defaults for the persisted configuration in
//! [`crate::config::ImpactConfig`] plus a few fixed tables the dependency
//! walker relies on. Defining them centrally keeps the defaults discoverable.

use std::time::Duration;

use crate::models::Environment;

/// Default overlays root, relative to the repository root.
pub const DEFAULT_OVERLAYS_DIR: &str = "argo-cd-apps/overlays";

/// Directory holding the root ArgoCD Applications that deploy every overlay.
///
/// Any change below it affects every environment.
pub const DEFAULT_ROOT_APPS_DIR: &str = "argo-cd-apps/app-of-app-sets";

/// Default overlay-name to environment mapping.
///
/// Several overlays may map to the same environment.
pub const DEFAULT_OVERLAY_ENVIRONMENTS: &[(&str, Environment)] = &[
    ("development", Environment::Development),
    ("konflux-public-staging", Environment::Staging),
    ("staging-downstream", Environment::Staging),
    ("konflux-public-production", Environment::Production),
    ("production-downstream", Environment::Production),
];

/// Kustomize convention directories that are never cluster names.
pub const DEFAULT_RESERVED_CLUSTER_DIRS: &[&str] = &["base", "overlay"];

/// Recognized kustomization filenames, tried in order; first match wins.
pub const DEFAULT_KUSTOMIZATION_FILENAMES: &[&str] =
    &["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Reference prefixes that point outside the repository and are never walked.
pub const REMOTE_REFERENCE_PREFIXES: &[&str] =
    &["http://", "https://", "ssh://", "git@", "git://"];

/// Kind of the generator manifests the template extractor understands.
pub const APPLICATION_SET_KIND: &str = "ApplicationSet";

/// Label added when production is affected so merges wait for a human.
pub const HOLD_PRODUCTION_LABEL: &str = "do-not-merge/hold-production";

/// Label used when the tool ran and found no environment impact.
pub const NO_ENVIRONMENT_LABEL: &str = "environment/none";

/// Default render program.
pub const DEFAULT_RENDER_PROGRAM: &str = "kustomize";

/// Default render arguments; the directory is appended last.
pub const DEFAULT_RENDER_ARGS: &[&str] = &["build", "--load-restrictor", "LoadRestrictionsNone"];

/// Timeout for a single render invocation (5 minutes).
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for git worktree creation (60 seconds).
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default CPU core count when detection fails.
///
/// Used as a fallback when `std::thread::available_parallelism()` returns an error.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Lines of context on each side of a change in unified diffs.
pub const DIFF_CONTEXT_LINES: usize = 3;

/// Diffs larger than this are truncated in CI step summaries (50 KiB).
pub const CI_SUMMARY_TRUNCATE_BYTES: usize = 50 * 1024;

/// Environment variable naming the folder diff tool for `render-diff --open`.
pub const DIFFTOOL_ENV: &str = "DIFFTOOL";

/// Marker identifying the render-diff PR comment so it can be updated in place.
pub const RENDER_DIFF_COMMENT_MARKER: &str = "<!-- render-diff-comment -->";
