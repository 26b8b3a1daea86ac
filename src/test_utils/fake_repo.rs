//! In-memory repository accessor for deterministic tests.

use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::ImpactError;
use crate::deptree::DependencySet;
use crate::repo::RepoAccessor;

fn key(rel: &str) -> String {
    rel.trim_end_matches('/').to_string()
}

/// Scripted [`RepoAccessor`].
///
/// Everything not explicitly configured behaves as absent: listings fail,
/// directories do not exist, renders fail and dependency resolution reports
/// no kustomization. Clones share the render counters.
#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    listings: BTreeMap<String, Vec<String>>,
    existing: BTreeSet<String>,
    renders: BTreeMap<String, std::result::Result<Vec<u8>, String>>,
    deps: BTreeMap<String, DependencySet>,
    render_delay: Option<Duration>,
    path_delays: BTreeMap<String, Duration>,
    render_calls: Arc<AtomicUsize>,
    renders_finished: Arc<AtomicUsize>,
}

impl FakeRepo {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `rel` list the given subdirectories (and exist).
    #[must_use]
    pub fn with_listing<I, S>(mut self, rel: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing.insert(key(rel));
        self.listings.insert(key(rel), names.into_iter().map(Into::into).collect());
        self
    }

    /// Mark `rel` as an existing directory.
    #[must_use]
    pub fn with_dir(mut self, rel: &str) -> Self {
        self.existing.insert(key(rel));
        self
    }

    /// Make `rel` exist and render to `yaml`.
    #[must_use]
    pub fn with_render(mut self, rel: &str, yaml: impl Into<Vec<u8>>) -> Self {
        self.existing.insert(key(rel));
        self.renders.insert(key(rel), Ok(yaml.into()));
        self
    }

    /// Make `rel` exist and fail to render with `message`.
    #[must_use]
    pub fn with_render_error(mut self, rel: &str, message: &str) -> Self {
        self.existing.insert(key(rel));
        self.renders.insert(key(rel), Err(message.to_string()));
        self
    }

    /// Register an overlay under `overlays_dir` that renders to `yaml`.
    #[must_use]
    pub fn with_overlay(mut self, overlays_dir: &str, name: &str, yaml: impl Into<Vec<u8>>) -> Self {
        let listing = self.listings.entry(key(overlays_dir)).or_default();
        if !listing.iter().any(|n| n == name) {
            listing.push(name.to_string());
        }
        self.existing.insert(key(overlays_dir));
        self.with_render(&format!("{}/{}", key(overlays_dir), name), yaml)
    }

    /// Make `rel` exist with a kustomization depending on `files`.
    #[must_use]
    pub fn with_deps<I, S>(mut self, rel: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing.insert(key(rel));
        self.deps.insert(key(rel), files.into_iter().map(Into::into).collect());
        self
    }

    /// Delay every render, to exercise concurrency.
    #[must_use]
    pub const fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = Some(delay);
        self
    }

    /// Delay renders of `rel` only.
    #[must_use]
    pub fn with_render_delay_for(mut self, rel: &str, delay: Duration) -> Self {
        self.path_delays.insert(key(rel), delay);
        self
    }

    /// Number of render calls that ran to completion, successful or not.
    #[must_use]
    pub fn finished_render_count(&self) -> usize {
        self.renders_finished.load(Ordering::SeqCst)
    }

    /// Number of render calls so far.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl RepoAccessor for FakeRepo {
    fn list_subdirs(&self, rel: &str) -> Result<Vec<String>> {
        self.listings.get(&key(rel)).cloned().ok_or_else(|| anyhow!("no such directory: {rel}"))
    }

    fn dir_exists(&self, rel: &str) -> bool {
        self.existing.contains(&key(rel))
    }

    async fn render(&self, rel: &str) -> Result<Vec<u8>> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.path_delays.get(&key(rel)).or(self.render_delay.as_ref()) {
            tokio::time::sleep(*delay).await;
        }
        let rendered = match self.renders.get(&key(rel)) {
            Some(Ok(yaml)) => Ok(yaml.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("no kustomization at {rel}")),
        };
        self.renders_finished.fetch_add(1, Ordering::SeqCst);
        rendered
    }

    fn resolve_deps(&self, rel: &str) -> std::result::Result<DependencySet, ImpactError> {
        self.deps.get(&key(rel)).cloned().ok_or_else(|| ImpactError::KustomizationNotFound {
            dir: rel.to_string(),
        })
    }
}
