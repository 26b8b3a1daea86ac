//! Command-line interface for gitops-impact.
//!
//! Two subcommands share one set of global options:
//!
//! - `detect` - classify the current branch's changes against environments
//!   and clusters, and print the labels a pull request would get
//! - `render-diff` - render every affected component on HEAD and on the base
//!   ref and show what would change in the deployed manifests
//!
//! # Streams
//!
//! Results go to stdout. Logs go to stderr (and optionally a file), so the
//! output of either command can be piped or captured without log noise.
//!
//! ```bash
//! gitops-impact detect --base-ref origin/main
//! gitops-impact detect --format json | jq '.labels'
//! gitops-impact render-diff --output-mode ci-summary,ci-comment
//! gitops-impact -v --log-file render.log render-diff
//! ```

mod common;
mod detect;
mod logging;
mod output;
mod render_diff;

pub use detect::{DetectCommand, OutputFormat, pull_request_labels};
pub use logging::init_logging;
pub use output::{ColorChoice, OutputMode};
pub use render_diff::RenderDiffCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Settings derived from the global flags, handed to every subcommand.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: &'static str,
    /// Disable spinners.
    pub no_progress: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
    /// Additional DEBUG log file.
    pub log_file: Option<PathBuf>,
}

/// Change-impact analysis for kustomize/ApplicationSet GitOps repositories.
#[derive(Parser, Debug)]
#[command(
    name = "gitops-impact",
    about = "Change-impact analysis for kustomize GitOps repositories",
    version,
    long_about = "Detects which environments and clusters a change to a kustomize/ApplicationSet \
                  GitOps repository affects, and renders the resulting manifest differences."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors, and hide spinners.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write debug logs, with timestamps, to this file.
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Path to a configuration file.
    ///
    /// Defaults to `gitops-impact.toml` at the repository root when present.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable spinners. Implied when stderr is not a terminal.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect which environments and clusters the changes affect
    Detect(DetectCommand),

    /// Render affected components on both refs and diff the output
    RenderDiff(RenderDiffCommand),
}

impl Cli {
    /// Initialise logging and run the selected subcommand.
    ///
    /// # Errors
    ///
    /// Returns whatever error the subcommand fails with.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        init_logging(config.log_level, config.log_file.as_deref())?;
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
            log_file: self.log_file.clone(),
        }
    }

    /// Run the subcommand with an explicit configuration, skipping logging setup.
    ///
    /// # Errors
    ///
    /// Returns whatever error the subcommand fails with.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Detect(cmd) => cmd.execute(&config).await,
            Commands::RenderDiff(cmd) => cmd.execute(&config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_levels() {
        let cli = Cli::parse_from(["gitops-impact", "detect"]);
        assert_eq!(cli.build_config().log_level, "info");

        let cli = Cli::parse_from(["gitops-impact", "-v", "detect"]);
        assert_eq!(cli.build_config().log_level, "debug");

        let cli = Cli::parse_from(["gitops-impact", "detect", "--quiet"]);
        let config = cli.build_config();
        assert_eq!(config.log_level, "warn");
        assert!(config.no_progress);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["gitops-impact", "-v", "-q", "detect"]).is_err());
    }

    #[test]
    fn test_global_paths() {
        let cli = Cli::parse_from([
            "gitops-impact",
            "render-diff",
            "--config",
            "/tmp/impact.toml",
            "--log-file",
            "/tmp/impact.log",
        ]);
        let config = cli.build_config();
        assert_eq!(config.config_path, Some(PathBuf::from("/tmp/impact.toml")));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/impact.log")));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
