//! Integration test suite for gitops-impact
//!
//! End-to-end tests against real git repositories built in temporary
//! directories. Rendering goes through a small shell script instead of
//! kustomize, so the suite only needs `git` and `sh`.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **cli**: argument validation and the two subcommands end to end
//! - **detection**: the detector and diff engine over an on-disk repository
//! - **git_plumbing**: changed files, ref resolution and base worktrees

mod common;

mod cli;
#[cfg(unix)]
mod detection;
mod git_plumbing;
