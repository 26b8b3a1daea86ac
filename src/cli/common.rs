//! Shared setup for the subcommands: repository discovery, configuration
//! loading and construction of the repository accessors.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use super::CliConfig;
use crate::config::ImpactConfig;
use crate::detector::{Detector, DetectorSettings};
use crate::git;
use crate::kustomize::RenderCommand;
use crate::repo::RepoRef;
use crate::utils::normalize_path;

/// Options that locate the repository, shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RepoArgs {
    /// Repository root. Defaults to the top level of the git repository
    /// containing the current directory.
    #[arg(long, value_name = "DIR")]
    pub repo_root: Option<PathBuf>,

    /// Overlays directory relative to the repository root.
    ///
    /// Overrides `overlays_dir` from the configuration file.
    #[arg(long, value_name = "DIR")]
    pub overlays_dir: Option<String>,
}

/// Everything a subcommand needs to know about the repository it runs in.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Absolute root of the working tree under review.
    pub repo_root: PathBuf,
    /// Loaded configuration with command-line overrides applied.
    pub config: ImpactConfig,
}

impl CommandContext {
    /// Resolve the repository root and load its configuration.
    ///
    /// # Errors
    ///
    /// Fails when no repository root can be determined or the configuration
    /// cannot be loaded.
    pub async fn load(args: &RepoArgs, cli: &CliConfig) -> Result<Self> {
        let repo_root = match &args.repo_root {
            Some(root) => std::path::absolute(root)
                .with_context(|| format!("resolving repository root {}", root.display()))?,
            None => {
                let cwd = std::env::current_dir().context("reading the current directory")?;
                git::top_level(&cwd).await?
            }
        };
        let repo_root = normalize_path(&repo_root);

        let mut config = ImpactConfig::load_or_default(cli.config_path.as_deref(), &repo_root).await?;
        if let Some(dir) = &args.overlays_dir {
            config.overlays_dir.clone_from(dir);
        }

        tracing::debug!(
            "Repository root {}, overlays under {}",
            repo_root.display(),
            config.overlays_dir
        );
        Ok(Self {
            repo_root,
            config,
        })
    }

    /// Fail early with a clear message when the render tool is missing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::core::ImpactError::RenderToolNotFound`].
    pub fn ensure_renderer(&self) -> Result<()> {
        RenderCommand::from_config(&self.config.render).ensure_available()?;
        Ok(())
    }

    /// Accessor for the working tree under review.
    #[must_use]
    pub fn head(&self) -> RepoRef {
        RepoRef::from_config(&self.repo_root, &self.config)
    }

    /// Accessor for a checkout of the base ref.
    #[must_use]
    pub fn base(&self, worktree: &Path) -> RepoRef {
        RepoRef::from_config(worktree, &self.config)
    }

    /// Detector over HEAD and the given base checkout.
    ///
    /// # Errors
    ///
    /// See [`Detector::with_settings`].
    pub fn detector(&self, worktree: &Path) -> Result<Detector<RepoRef, RepoRef>> {
        Detector::with_settings(
            self.head(),
            self.base(worktree),
            self.config.overlays_dir.clone(),
            DetectorSettings::from_config(&self.config),
        )
        .context("initializing detector")
    }
}
