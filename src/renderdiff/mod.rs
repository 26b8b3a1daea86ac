//! Render-diff engine.
//!
//! Renders every affected component on both refs, normalizes the manifests
//! and produces a unified diff per component. Jobs run on a bounded pool of
//! tokio tasks; a single consumer collects finished jobs, forwards them to an
//! optional progress sink and keeps the running totals.
//!
//! Per-component render failures are not fatal: they are recorded on that
//! component's [`ComponentDiff::error`] and the batch continues. Anything
//! else (a panicking worker, cancellation) stops further submissions and is
//! returned as the single error of the run.

pub mod diff;
pub mod normalize;

pub use diff::{ComponentDiff, count_stats, unified_diff};
pub use normalize::normalize_manifests;

use anyhow::{Result, anyhow, bail};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::ImpactError;
use crate::detector::AffectedComponents;
use crate::models::{ComponentPath, Environment};
use crate::repo::RepoAccessor;
use crate::utils::default_parallelism;

/// Aggregate output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Components with a real difference, plus components that failed to render.
    pub diffs: Vec<ComponentDiff>,
    /// Lines added across successful components.
    pub total_added: usize,
    /// Lines removed across successful components.
    pub total_removed: usize,
}

impl DiffResult {
    fn record(&mut self, diff: ComponentDiff) {
        if !diff.is_error() {
            self.total_added += diff.added;
            self.total_removed += diff.removed;
        }
        self.diffs.push(diff);
    }

    /// Number of components that failed to render.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diffs.iter().filter(|d| d.is_error()).count()
    }
}

/// Sort diffs by environment, then path, for display.
pub fn sort_diffs(diffs: &mut [ComponentDiff]) {
    diffs.sort_by(|a, b| a.env.cmp(&b.env).then_with(|| a.path.cmp(&b.path)));
}

/// Renders and diffs components across two refs.
#[derive(Debug)]
pub struct Engine<H, B> {
    head: Arc<H>,
    base: Arc<B>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<H, B> Engine<H, B>
where
    H: RepoAccessor + 'static,
    B: RepoAccessor + 'static,
{
    /// Engine over `head` and `base` with host parallelism.
    pub fn new(head: H, base: B) -> Self {
        Self::from_shared(Arc::new(head), Arc::new(base))
    }

    /// Engine over accessors that are already shared.
    pub fn from_shared(head: Arc<H>, base: Arc<B>) -> Self {
        Self {
            head,
            base,
            concurrency: default_parallelism(),
            cancel: CancellationToken::new(),
        }
    }

    /// Limit the number of components rendered at once (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop runs when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Diff every component in `affected`.
    ///
    /// # Errors
    ///
    /// Fails on cancellation or an unexpected worker failure. Render errors
    /// are recorded per component instead.
    pub async fn run(&self, affected: &AffectedComponents) -> Result<DiffResult> {
        self.run_progressive(affected, |_| {}).await
    }

    /// Like [`Engine::run`], calling `sink` with each component as it finishes.
    ///
    /// Components are delivered in completion order. The returned result is
    /// the same as [`Engine::run`] would produce.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::run`].
    pub async fn run_progressive<F>(&self, affected: &AffectedComponents, mut sink: F) -> Result<DiffResult>
    where
        F: FnMut(&ComponentDiff),
    {
        let jobs: Vec<(Environment, ComponentPath)> = affected
            .iter()
            .flat_map(|(env, paths)| paths.iter().map(move |cp| (*env, cp.clone())))
            .collect();
        let mut result = DiffResult::default();
        if jobs.is_empty() {
            return Ok(result);
        }

        tracing::info!(
            target: "renderdiff",
            "Diffing {} component(s) with {} worker(s)",
            jobs.len(),
            self.concurrency
        );

        // Queued tasks that have not started yet check this before rendering
        let run_token = self.cancel.child_token();
        let mut finished = stream::iter(jobs)
            .map(|(env, component)| {
                let head = Arc::clone(&self.head);
                let base = Arc::clone(&self.base);
                let token = run_token.clone();
                tokio::spawn(async move {
                    if token.is_cancelled() {
                        return Ok(None);
                    }
                    diff_component(head.as_ref(), base.as_ref(), env, component).await
                })
            })
            .buffer_unordered(self.concurrency);

        loop {
            let next = tokio::select! {
                biased;
                () = run_token.cancelled() => {
                    bail!("render diff cancelled");
                }
                next = finished.next() => next,
            };

            let outcome = match next {
                None => break,
                Some(Ok(outcome)) => outcome,
                Some(Err(join_error)) => {
                    run_token.cancel();
                    return Err(anyhow!(join_error).context("render diff worker failed"));
                }
            };

            match outcome {
                Ok(Some(diff)) => {
                    sink(&diff);
                    result.record(diff);
                }
                Ok(None) => {}
                Err(e) => {
                    run_token.cancel();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            target: "renderdiff",
            "{} component(s) differ: +{} -{}",
            result.diffs.len(),
            result.total_added,
            result.total_removed
        );
        Ok(result)
    }
}

/// Render both sides of one component and diff them.
///
/// Returns `None` when the normalized manifests are identical.
async fn diff_component<H, B>(
    head: &H,
    base: &B,
    env: Environment,
    component: ComponentPath,
) -> Result<Option<ComponentDiff>>
where
    H: RepoAccessor,
    B: RepoAccessor,
{
    let mut diff = ComponentDiff::new(&component, env);

    match render_pair(head, base, &component.path).await {
        Ok((head_manifest, base_manifest)) => {
            diff.head_manifest = head_manifest;
            diff.base_manifest = base_manifest;
        }
        Err(e) if e.is_recoverable() => {
            tracing::warn!(target: "renderdiff", "Render error for {} ({env}): {e}", component.path);
            diff.error = Some(e.to_string());
            return Ok(Some(diff));
        }
        Err(e) => return Err(e.into()),
    }

    diff.compute_diff();
    if diff.has_diff() {
        Ok(Some(diff))
    } else {
        tracing::debug!(target: "renderdiff", "{} ({env}) renders identically", component.path);
        Ok(None)
    }
}

/// Render `path` on each ref where it exists. Either side may be absent, not both.
async fn render_pair<H, B>(
    head: &H,
    base: &B,
    path: &str,
) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), ImpactError>
where
    H: RepoAccessor,
    B: RepoAccessor,
{
    let head_manifest = if head.dir_exists(path) {
        let rendered = head.render(path).await.map_err(|e| ImpactError::ComponentRender {
            path: path.to_string(),
            git_ref: "HEAD".to_string(),
            reason: format!("{e:#}"),
        })?;
        Some(rendered)
    } else {
        None
    };

    let base_manifest = if base.dir_exists(path) {
        let rendered = base.render(path).await.map_err(|e| ImpactError::ComponentRender {
            path: path.to_string(),
            git_ref: "base".to_string(),
            reason: format!("{e:#}"),
        })?;
        Some(rendered)
    } else {
        None
    };

    if head_manifest.is_none() && base_manifest.is_none() {
        return Err(ImpactError::ComponentMissing {
            path: path.to_string(),
        });
    }
    Ok((head_manifest, base_manifest))
}
