//! Persisted configuration for gitops-impact.
//!
//! The configuration describes the shape of the GitOps repository rather than
//! user preferences: where the overlays live, which environment each overlay
//! belongs to, which directory names are never clusters, and how to render a
//! kustomize directory.
//!
//! # File Location
//!
//! The file is looked up in this order:
//!
//! 1. The path given with `--config`
//! 2. `gitops-impact.toml` at the repository root
//! 3. Built-in defaults (see [`crate::constants`])
//!
//! # File Format
//!
//! ```toml
//! overlays_dir = "argo-cd-apps/overlays"
//! root_apps_dir = "argo-cd-apps/app-of-app-sets"
//! reserved_cluster_dirs = ["base", "overlay"]
//! max_parallel = 8
//!
//! [overlays]
//! development = "development"
//! konflux-public-staging = "staging"
//! production-downstream = "production"
//!
//! [render]
//! program = "kustomize"
//! args = ["build", "--load-restrictor", "LoadRestrictionsNone"]
//! timeout_secs = 300
//! ```
//!
//! Environment names in `[overlays]` are validated at load time; an unknown
//! name is a configuration error.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gitops_impact::config::ImpactConfig;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ImpactConfig::load_or_default(None, Path::new(".")).await?;
//! println!("overlays live in {}", config.overlays_dir);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    DEFAULT_KUSTOMIZATION_FILENAMES, DEFAULT_OVERLAYS_DIR, DEFAULT_OVERLAY_ENVIRONMENTS,
    DEFAULT_RENDER_ARGS, DEFAULT_RENDER_PROGRAM, DEFAULT_RENDER_TIMEOUT,
    DEFAULT_RESERVED_CLUSTER_DIRS, DEFAULT_ROOT_APPS_DIR,
};
use crate::core::ImpactError;
use crate::models::Environment;

/// Name of the per-repository configuration file.
pub const CONFIG_FILE_NAME: &str = "gitops-impact.toml";

fn default_overlays_dir() -> String {
    DEFAULT_OVERLAYS_DIR.to_string()
}

fn default_root_apps_dir() -> String {
    DEFAULT_ROOT_APPS_DIR.to_string()
}

fn default_overlays() -> BTreeMap<String, Environment> {
    DEFAULT_OVERLAY_ENVIRONMENTS.iter().map(|(name, env)| ((*name).to_string(), *env)).collect()
}

fn default_reserved_cluster_dirs() -> Vec<String> {
    DEFAULT_RESERVED_CLUSTER_DIRS.iter().map(ToString::to_string).collect()
}

fn default_kustomization_filenames() -> Vec<String> {
    DEFAULT_KUSTOMIZATION_FILENAMES.iter().map(ToString::to_string).collect()
}

fn default_render_program() -> String {
    DEFAULT_RENDER_PROGRAM.to_string()
}

fn default_render_args() -> Vec<String> {
    DEFAULT_RENDER_ARGS.iter().map(ToString::to_string).collect()
}

const fn default_render_timeout_secs() -> u64 {
    DEFAULT_RENDER_TIMEOUT.as_secs()
}

/// Repository layout and render settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpactConfig {
    /// Overlays root, relative to the repository root.
    #[serde(default = "default_overlays_dir")]
    pub overlays_dir: String,

    /// Root applications directory; changes below it affect every environment.
    #[serde(default = "default_root_apps_dir")]
    pub root_apps_dir: String,

    /// Overlay directory name to environment.
    ///
    /// Every overlay directory found on either ref must appear here.
    #[serde(default = "default_overlays")]
    pub overlays: BTreeMap<String, Environment>,

    /// Directory names that are never reported as clusters.
    #[serde(default = "default_reserved_cluster_dirs")]
    pub reserved_cluster_dirs: Vec<String>,

    /// Kustomization filenames, tried in order.
    #[serde(default = "default_kustomization_filenames")]
    pub kustomization_filenames: Vec<String>,

    /// Upper bound on concurrent renders. `None` uses host parallelism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// How to render a directory.
    #[serde(default)]
    pub render: RenderConfig,
}

/// External render tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    /// Executable name or path.
    #[serde(default = "default_render_program")]
    pub program: String,

    /// Arguments placed before the directory.
    #[serde(default = "default_render_args")]
    pub args: Vec<String>,

    /// Per-invocation timeout in seconds.
    #[serde(default = "default_render_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            program: default_render_program(),
            args: default_render_args(),
            timeout_secs: default_render_timeout_secs(),
        }
    }
}

impl RenderConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            overlays_dir: default_overlays_dir(),
            root_apps_dir: default_root_apps_dir(),
            overlays: default_overlays(),
            reserved_cluster_dirs: default_reserved_cluster_dirs(),
            kustomization_filenames: default_kustomization_filenames(),
            max_parallel: None,
            render: RenderConfig::default(),
        }
    }
}

impl ImpactConfig {
    /// Load configuration from a specific file.
    ///
    /// Missing keys take their defaults. Unknown keys and unknown environment
    /// names are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or fails
    /// validation.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the explicit file if given, else `gitops-impact.toml` under
    /// `repo_root` if present, else defaults.
    ///
    /// An explicit path that does not exist is an error; a missing
    /// repository-level file is not.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected file cannot be loaded.
    pub async fn load_or_default(explicit: Option<&Path>, repo_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path).await;
        }

        let path = Self::repository_path(repo_root);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, repo_root.display());
            Ok(Self::default())
        }
    }

    /// Location of the repository-level configuration file.
    #[must_use]
    pub fn repository_path(repo_root: &Path) -> PathBuf {
        repo_root.join(CONFIG_FILE_NAME)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::TomlError`] for syntax errors and unknown
    /// environment names, [`ImpactError::ConfigError`] for semantic problems.
    pub fn from_toml(content: &str) -> Result<Self, ImpactError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ImpactError::ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ImpactError> {
        if self.overlays_dir.trim().is_empty() {
            return Err(ImpactError::ConfigError {
                message: "overlays_dir must not be empty".to_string(),
            });
        }
        if self.overlays.is_empty() {
            return Err(ImpactError::ConfigError {
                message: "[overlays] must map at least one overlay to an environment".to_string(),
            });
        }
        if self.kustomization_filenames.is_empty() {
            return Err(ImpactError::ConfigError {
                message: "kustomization_filenames must not be empty".to_string(),
            });
        }
        if self.render.program.trim().is_empty() {
            return Err(ImpactError::ConfigError {
                message: "render.program must not be empty".to_string(),
            });
        }
        if self.render.timeout_secs == 0 {
            return Err(ImpactError::ConfigError {
                message: "render.timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.max_parallel == Some(0) {
            return Err(ImpactError::ConfigError {
                message: "max_parallel must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Distinct environments named in the overlay map.
    #[must_use]
    pub fn known_environments(&self) -> Vec<Environment> {
        let mut envs: Vec<Environment> = self.overlays.values().copied().collect();
        envs.sort();
        envs.dedup();
        envs
    }
}
