//! Fluent builder for git subprocesses
//!
//! Every git invocation in the crate goes through [`GitCommand`] so logging,
//! timeouts and error mapping stay consistent.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::ImpactError;

#[cfg(windows)]
const GIT_PROGRAM: &str = "git.exe";
#[cfg(not(windows))]
const GIT_PROGRAM: &str = "git";

/// Builder for constructing and executing git commands.
///
/// # Examples
///
/// ```rust,no_run
/// use gitops_impact::git::command_builder::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let sha = GitCommand::new()
///     .args(["rev-parse", "--short", "HEAD"])
///     .current_dir("/path/to/repo")
///     .execute_stdout()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// New commands capture output, run in the process working directory unless
/// [`current_dir`](Self::current_dir) is set, and time out after 5 minutes.
pub struct GitCommand {
    /// Command arguments (e.g., ["diff", "--name-only", "main", "HEAD"])
    args: Vec<String>,

    /// Passed to git as `-C <dir>`
    current_dir: Option<PathBuf>,

    /// Maximum duration to wait for command completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Optional context string for log lines
    context: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            timeout_duration: Some(Duration::from_secs(300)),
            context: None,
        }
    }
}

impl GitCommand {
    /// Creates a new git command builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git against the repository at `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a custom timeout for the command (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a context for logging (e.g., which ref is being prepared)
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn full_args(&self) -> Vec<String> {
        let mut full_args = Vec::with_capacity(self.args.len() + 2);
        if let Some(dir) = &self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.iter().cloned());
        full_args
    }

    /// The git subcommand, for error messages (`worktree add`, `diff`, ...).
    fn operation(&self) -> String {
        match self.args.first().map(String::as_str) {
            Some("worktree") => {
                format!("worktree {}", self.args.get(1).map_or("", String::as_str)).trim().to_string()
            }
            Some(op) => op.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Execute the command and return the output
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let full_args = self.full_args();
        let mut cmd = Command::new(GIT_PROGRAM);
        cmd.args(&full_args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        if let Some(ctx) = &self.context {
            tracing::debug!(target: "git", "({}) Executing command: git {}", ctx, full_args.join(" "));
        } else {
            tracing::debug!(target: "git", "Executing command: git {}", full_args.join(" "));
        }

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result
            } else {
                tracing::warn!(
                    target: "git",
                    "Command timed out after {} seconds: git {}",
                    duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(ImpactError::GitCommandError {
                    operation: self.operation(),
                    stderr: format!(
                        "git command timed out after {} seconds. Try running it manually: git {}",
                        duration.as_secs(),
                        full_args.join(" ")
                    ),
                }
                .into());
            }
        } else {
            output_future.await
        };

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImpactError::GitNotFound.into());
            }
            Err(e) => {
                return Err(e).context(format!("Failed to execute git {}", full_args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "git",
                "Command failed with exit code: {:?}",
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "git", "Error: {}", stderr.trim());
            }

            return Err(ImpactError::GitCommandError {
                operation: self.operation(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            }
            .into());
        }

        if !stderr.trim().is_empty() {
            tracing::trace!(target: "git", "{}", stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            tracing::debug!(
                target: "git::perf",
                "Git {} took {}ms",
                self.operation(),
                elapsed.as_millis()
            );
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and return only stdout as a trimmed string
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute the command and check for success
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Output from a git command
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output from the git command
    pub stdout: String,
    /// Standard error output from the git command
    pub stderr: String,
}

// Convenience builders for the operations impact detection needs

impl GitCommand {
    /// `git rev-parse --short <ref>`
    pub fn rev_parse_short(ref_name: &str) -> Self {
        Self::new().args(["rev-parse", "--short", ref_name])
    }

    /// `git rev-parse --show-toplevel`
    pub fn show_toplevel() -> Self {
        Self::new().args(["rev-parse", "--show-toplevel"])
    }

    /// `git merge-base <a> <b>`
    pub fn merge_base(a: &str, b: &str) -> Self {
        Self::new().args(["merge-base", a, b])
    }

    /// Two-point `git diff --name-only --no-renames <base> HEAD`
    ///
    /// Renames are listed as a deletion plus an addition so both paths are reported.
    pub fn diff_names(base_ref: &str) -> Self {
        Self::new().args(["diff", "--name-only", "--no-renames", base_ref, "HEAD"])
    }

    /// `git worktree add --detach <path> <ref>`
    pub fn worktree_add(path: &Path, ref_name: &str) -> Self {
        Self::new().args(["worktree", "add", "--detach"]).arg(path.display().to_string()).arg(ref_name)
    }

    /// `git worktree remove --force <path>`
    pub fn worktree_remove(path: &Path) -> Self {
        Self::new().args(["worktree", "remove", "--force"]).arg(path.display().to_string())
    }
}
