//! Read-only access to one git ref's file tree.
//!
//! The detector and the diff engine never touch the filesystem or the render
//! tool directly. They go through [`RepoAccessor`], which production code
//! implements with [`RepoRef`] (a checkout on disk) and tests implement with an
//! in-memory fake.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::ImpactConfig;
use crate::core::ImpactError;
use crate::deptree::{DependencySet, Resolver};
use crate::kustomize::RenderCommand;

/// Filesystem-shaped queries and rendering against a single ref.
///
/// Paths are repository-root-relative. Implementations must be safe to share
/// between concurrent render jobs.
pub trait RepoAccessor: Send + Sync {
    /// Names of the immediate subdirectories of `rel`.
    fn list_subdirs(&self, rel: &str) -> Result<Vec<String>>;

    /// Whether `rel` exists and is a directory.
    fn dir_exists(&self, rel: &str) -> bool;

    /// Render the directory `rel` and return the manifest stream.
    fn render(&self, rel: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Files the kustomization at `rel` depends on.
    ///
    /// [`ImpactError::KustomizationNotFound`] means "match by prefix".
    fn resolve_deps(&self, rel: &str) -> Result<DependencySet, ImpactError>;
}

/// A checkout of the repository at some ref.
///
/// Both sides of a comparison are `RepoRef`s: HEAD is usually the working
/// copy, base is usually a temporary worktree.
#[derive(Debug, Clone)]
pub struct RepoRef {
    root: PathBuf,
    renderer: RenderCommand,
    resolver: Resolver,
}

impl RepoRef {
    /// Access the tree at `root` with the default renderer and filenames.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            renderer: RenderCommand::new(),
            resolver: Resolver::default(),
        }
    }

    /// Access the tree at `root` using the renderer and filenames from `config`.
    pub fn from_config(root: impl Into<PathBuf>, config: &ImpactConfig) -> Self {
        Self {
            root: root.into(),
            renderer: RenderCommand::from_config(&config.render),
            resolver: Resolver::new(config.kustomization_filenames.clone()),
        }
    }

    /// Replace the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: RenderCommand) -> Self {
        self.renderer = renderer;
        self
    }

    /// Root of the checkout.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a repository-relative path.
    #[must_use]
    pub fn abs_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl RepoAccessor for RepoRef {
    fn list_subdirs(&self, rel: &str) -> Result<Vec<String>> {
        let dir = self.abs_path(rel);
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn dir_exists(&self, rel: &str) -> bool {
        self.abs_path(rel).is_dir()
    }

    async fn render(&self, rel: &str) -> Result<Vec<u8>> {
        let dir = self.abs_path(rel);
        Ok(self.renderer.render(&dir).await?)
    }

    fn resolve_deps(&self, rel: &str) -> Result<DependencySet, ImpactError> {
        self.resolver.resolve(&self.root, rel)
    }
}
