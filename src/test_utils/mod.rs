//! Test utilities for gitops-impact
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite:
//!
//! - [`FakeRepo`] - in-memory [`RepoAccessor`](crate::repo::RepoAccessor) with
//!   scripted listings, renders and dependency sets
//! - [`fixtures`] - ApplicationSet and manifest YAML builders
//! - [`TestGit`] - thin wrapper around the `git` binary for building fixture
//!   repositories
//!
//! # Example
//!
//! ```rust,no_run
//! use gitops_impact::test_utils::{FakeRepo, fixtures};
//!
//! let head = FakeRepo::new()
//!     .with_overlay("overlays", "development", fixtures::static_app_set("foo", "components/foo"))
//!     .with_deps("components/foo", ["components/foo/kustomization.yaml"]);
//! ```

pub mod fake_repo;
pub mod fixtures;
pub mod git_helper;

pub use fake_repo::FakeRepo;
pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has any effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=gitops_impact=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
