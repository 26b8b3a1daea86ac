//! Git test helper utilities
//!
//! Builds throwaway repositories for tests that exercise real git plumbing.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs git commands inside one repository, failing loudly on error.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    fn run_git_command(&self, args: &[&str], action: &str) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }

        Ok(output)
    }

    /// Wrap the repository at `repo_path`.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// `git init` on branch `main` with a test identity configured.
    pub fn init_main(&self) -> Result<()> {
        self.run_git_command(&["init"], "Failed to initialize git repository")?;
        self.run_git_command(&["symbolic-ref", "HEAD", "refs/heads/main"], "Failed to set HEAD to main")?;
        self.run_git_command(&["config", "user.email", "test@gitops-impact.example"], "Failed to configure git user email")?;
        self.run_git_command(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        self.run_git_command(&["config", "commit.gpgsign", "false"], "Failed to disable commit signing")?;
        Ok(())
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.repo_path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Delete the file or directory at `rel`.
    pub fn remove(&self, rel: &str) -> Result<()> {
        let path = self.repo_path.join(rel);
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        }
        .with_context(|| format!("Failed to remove {}", path.display()))
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.run_git_command(&["add", "-A"], "Failed to add files to git")?;
        self.run_git_command(&["commit", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Create and switch to a new branch.
    pub fn create_branch(&self, branch_name: &str) -> Result<()> {
        self.run_git_command(
            &["checkout", "-b", branch_name],
            &format!("Failed to create branch: {branch_name}"),
        )?;
        Ok(())
    }

    /// Switch to an existing branch.
    pub fn checkout(&self, ref_name: &str) -> Result<()> {
        self.run_git_command(&["checkout", ref_name], &format!("Failed to checkout: {ref_name}"))?;
        Ok(())
    }

    /// Full SHA of HEAD.
    pub fn rev_parse_head(&self) -> Result<String> {
        let output = self.run_git_command(&["rev-parse", "HEAD"], "Failed to get current commit SHA")?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Output of `git worktree list --porcelain`.
    pub fn worktree_list(&self) -> Result<String> {
        let output =
            self.run_git_command(&["worktree", "list", "--porcelain"], "Failed to list worktrees")?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Repository root.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
