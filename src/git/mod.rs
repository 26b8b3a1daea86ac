//! Git plumbing for impact detection.
//!
//! Uses the system `git` binary through [`command_builder::GitCommand`], the
//! same way for every call:
//!
//! - [`resolve_ref`] - short SHA of a ref, for display
//! - [`changed_files`] - files that differ between a base ref and HEAD
//! - [`top_level`] - repository root containing a directory
//! - [`merge_base`] - fork point of two refs
//! - [`BaseWorktree`] - a detached checkout of the base ref in a temporary
//!   directory, used as the base side of a comparison
//!
//! The changed-file list is a two-point diff (`git diff <base> HEAD`), not a
//! three-dot diff, so commits that landed on the base after the branch point
//! show up as changes too.

pub mod command_builder;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::constants::GIT_WORKTREE_TIMEOUT;
use command_builder::GitCommand;

/// Resolve `ref_name` to its abbreviated commit SHA.
///
/// # Errors
///
/// Returns an error if git fails or the ref does not exist.
pub async fn resolve_ref(repo_root: &Path, ref_name: &str) -> Result<String> {
    GitCommand::rev_parse_short(ref_name)
        .current_dir(repo_root)
        .execute_stdout()
        .await
        .with_context(|| format!("resolving {ref_name}"))
}

/// Files changed between `base_ref` and HEAD, in git's output order.
///
/// # Errors
///
/// Returns an error if git fails.
pub async fn changed_files(repo_root: &Path, base_ref: &str) -> Result<Vec<String>> {
    let stdout = GitCommand::diff_names(base_ref)
        .current_dir(repo_root)
        .execute_stdout()
        .await
        .with_context(|| format!("listing files changed between {base_ref} and HEAD"))?;

    Ok(stdout.lines().map(str::trim).filter(|line| !line.is_empty()).map(ToString::to_string).collect())
}

/// Root of the working tree that contains `dir`.
///
/// # Errors
///
/// Returns an error if `dir` is not inside a git repository.
pub async fn top_level(dir: &Path) -> Result<PathBuf> {
    let root = GitCommand::show_toplevel()
        .current_dir(dir)
        .execute_stdout()
        .await
        .with_context(|| format!("finding the repository containing {}", dir.display()))?;
    Ok(PathBuf::from(root))
}

/// Best common ancestor of `a` and `b`, as a full SHA.
///
/// # Errors
///
/// Returns an error if either ref is unknown or they share no history.
pub async fn merge_base(repo_root: &Path, a: &str, b: &str) -> Result<String> {
    GitCommand::merge_base(a, b)
        .current_dir(repo_root)
        .execute_stdout()
        .await
        .with_context(|| format!("computing merge-base of {a} and {b}"))
}

/// A detached worktree of the base ref in a temporary directory.
///
/// Call [`cleanup`](Self::cleanup) when done. If the value is dropped without
/// cleanup, the worktree is removed synchronously on a best-effort basis.
#[derive(Debug)]
pub struct BaseWorktree {
    repo_root: PathBuf,
    dir: Option<TempDir>,
}

impl BaseWorktree {
    /// Check out `ref_name` from the repository at `repo_root` into a new
    /// temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created or
    /// `git worktree add` fails.
    pub async fn create(repo_root: &Path, ref_name: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gitops-impact-worktree-")
            .tempdir()
            .context("creating temporary directory for the base worktree")?;

        GitCommand::worktree_add(dir.path(), ref_name)
            .current_dir(repo_root)
            .with_timeout(Some(GIT_WORKTREE_TIMEOUT))
            .with_context(ref_name)
            .execute_success()
            .await
            .with_context(|| format!("creating worktree at {ref_name}"))?;

        tracing::debug!("Created base worktree for {} at {}", ref_name, dir.path().display());

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            dir: Some(dir),
        })
    }

    /// Root of the checked-out base tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map_or_else(|| Path::new(""), TempDir::path)
    }

    /// Remove the worktree and its directory.
    ///
    /// Failure to deregister the worktree is logged, not returned; the
    /// directory is removed either way.
    pub async fn cleanup(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if let Err(e) =
            GitCommand::worktree_remove(dir.path()).current_dir(&self.repo_root).execute_success().await
        {
            tracing::warn!("Failed to remove worktree {}: {:#}", dir.path().display(), e);
        }
        if let Err(e) = dir.close() {
            tracing::debug!("Failed to remove worktree directory: {}", e);
        }
    }
}

impl Drop for BaseWorktree {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["worktree", "remove", "--force"])
            .arg(dir.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if !status.is_ok_and(|s| s.success()) {
            tracing::warn!("Failed to remove worktree {}", dir.path().display());
        }
    }
}
