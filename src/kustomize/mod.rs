//! Render capability backed by an external build tool.
//!
//! [`RenderCommand`] runs the configured program (by default
//! `kustomize build --load-restrictor LoadRestrictionsNone <dir>`) through
//! `tokio::process` with a timeout and returns the rendered YAML from stdout.
//! Nothing else in the crate knows how a directory gets rendered.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::RenderConfig;
use crate::core::ImpactError;

/// Builder for invocations of the external render tool.
///
/// # Examples
///
/// ```rust,no_run
/// use gitops_impact::kustomize::RenderCommand;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let yaml = RenderCommand::new().render(Path::new("argo-cd-apps/overlays/development")).await?;
/// println!("{} bytes", yaml.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    program: String,
    args: Vec<String>,
    timeout_duration: Option<Duration>,
}

impl Default for RenderCommand {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl RenderCommand {
    /// Default `kustomize build` invocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[render]` configuration table.
    #[must_use]
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout_duration: Some(config.timeout()),
        }
    }

    /// Use a different program, keeping the arguments.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the arguments placed before the directory.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set a custom timeout (None for no timeout).
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Program that will be executed.
    #[must_use]
    pub fn program_name(&self) -> &str {
        &self.program
    }

    /// Check that the program can be found before any render is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::RenderToolNotFound`] when the program is neither
    /// a path to an existing file nor found in `PATH`.
    pub fn ensure_available(&self) -> Result<(), ImpactError> {
        which::which(&self.program).map(|_| ()).map_err(|_| ImpactError::RenderToolNotFound {
            program: self.program.clone(),
        })
    }

    /// Render `dir` and return stdout.
    ///
    /// # Errors
    ///
    /// - [`ImpactError::RenderToolNotFound`] if the program cannot be spawned
    ///   because it does not exist
    /// - [`ImpactError::RenderTimeout`] if the timeout elapses; the child is killed
    /// - [`ImpactError::RenderFailed`] on a non-zero exit, with stderr attached
    /// - [`ImpactError::IoError`] for any other spawn failure
    pub async fn render(&self, dir: &Path) -> Result<Vec<u8>, ImpactError> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            target: "render",
            "Executing command: {} {} {}",
            self.program,
            self.args.join(" "),
            dir.display()
        );

        let output_future = cmd.output();
        let output = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "render",
                        "Render timed out after {} seconds: {}",
                        duration.as_secs(),
                        dir.display()
                    );
                    return Err(ImpactError::RenderTimeout {
                        path: dir.display().to_string(),
                        seconds: duration.as_secs(),
                    });
                }
            },
            None => output_future.await,
        };

        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImpactError::RenderToolNotFound {
                    program: self.program.clone(),
                }
            } else {
                ImpactError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(
                target: "render",
                "Command failed with exit code {:?}: {}",
                output.status.code(),
                stderr
            );
            return Err(ImpactError::RenderFailed {
                program: self.program.clone(),
                dir: dir.display().to_string(),
                stderr,
            });
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::debug!(
                target: "render::perf",
                "Rendering {} took {:.2}s",
                dir.display(),
                elapsed.as_secs_f64()
            );
        }

        Ok(output.stdout)
    }
}
