//! Impact detection.
//!
//! [`Detector`] answers "which environments and clusters does this changeset
//! affect?" by comparing two refs of the repository:
//!
//! 1. Every overlay under the overlays root is rendered on HEAD and on base.
//! 2. Overlays that exist only on base mark their environment affected.
//! 3. Overlays whose rendered output differs mark their environment affected.
//! 4. ApplicationSets in each HEAD render are resolved into component paths.
//! 5. Each distinct (environment, path) pair gets a dependency set, or falls
//!    back to directory-prefix matching when no kustomization is reachable.
//! 6. Changed files are matched against those sets; a match marks the
//!    environment and, where known, the cluster affected.
//! 7. Any change under the root applications directory affects everything.
//!
//! Overlay names are validated against the environment map when the detector
//! is built, so a newly added overlay can never be dropped from analysis
//! without anyone noticing.
//!
//! # Example
//!
//! ```rust,no_run
//! use gitops_impact::detector::Detector;
//! use gitops_impact::repo::RepoRef;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let head = RepoRef::new("/work/repo");
//! let base = RepoRef::new("/tmp/base-worktree");
//! let detector = Detector::new(head, base, "argo-cd-apps/overlays")?;
//!
//! let result = detector.detect(&["components/foo/base/deploy.yaml".to_string()]).await?;
//! for label in result.labels().all() {
//!     println!("{label}");
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result, anyhow};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::appset::parse_application_sets;
use crate::config::ImpactConfig;
use crate::core::ImpactError;
use crate::deptree::DependencySet;
use crate::models::{ComponentPath, DetectionResult, Environment};
use crate::repo::RepoAccessor;
use crate::utils::{effective_parallelism, path_has_prefix};


/// Component paths grouped by the environment whose overlay produced them.
pub type AffectedComponents = BTreeMap<Environment, Vec<ComponentPath>>;

/// Repository layout knobs the detector needs beyond the overlays root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Overlay directory name to environment.
    pub overlays: BTreeMap<String, Environment>,
    /// Changes below this directory affect every known environment.
    pub root_apps_dir: String,
    /// Directory names never reported as clusters.
    pub reserved_cluster_dirs: BTreeSet<String>,
    /// Maximum number of overlays rendered at once.
    pub max_parallel: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from_config(&ImpactConfig::default())
    }
}

impl DetectorSettings {
    /// Take the relevant settings from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &ImpactConfig) -> Self {
        Self {
            overlays: config.overlays.clone(),
            root_apps_dir: config.root_apps_dir.clone(),
            reserved_cluster_dirs: config.reserved_cluster_dirs.iter().cloned().collect(),
            max_parallel: effective_parallelism(config.max_parallel),
        }
    }

    fn is_reserved(&self, name: &str) -> bool {
        self.reserved_cluster_dirs.contains(name)
    }

    fn known_environments(&self) -> BTreeSet<Environment> {
        self.overlays.values().copied().collect()
    }
}

/// One overlay to render on both refs.
#[derive(Debug)]
struct OverlayJob {
    name: String,
    rel: String,
    env: Environment,
}

async fn render_overlay<H, B>(head: Arc<H>, base: Arc<B>, job: OverlayJob) -> Result<OverlayBuild, ImpactError>
where
    H: RepoAccessor,
    B: RepoAccessor,
{
    let OverlayJob {
        name,
        rel,
        env,
    } = job;

    let head_render = async {
        head.render(&rel).await.map_err(|e| ImpactError::OverlayRender {
            overlay: name.clone(),
            git_ref: "HEAD".to_string(),
            reason: format!("{e:#}"),
        })
    };
    let base_render = async {
        if !base.dir_exists(&rel) {
            tracing::info!(
                target: "detector",
                "Overlay {name} does not exist on base (new overlay), treating as empty"
            );
            return Ok(Vec::new());
        }
        base.render(&rel).await.map_err(|e| ImpactError::OverlayRender {
            overlay: name.clone(),
            git_ref: "base".to_string(),
            reason: format!("{e:#}"),
        })
    };

    let (head_manifest, base_manifest) = tokio::join!(head_render, base_render);
    Ok(OverlayBuild {
        head: head_manifest?,
        base: base_manifest?,
        name,
        env,
    })
}

/// Rendered output of one overlay on both refs.
#[derive(Debug)]
struct OverlayBuild {
    name: String,
    env: Environment,
    head: Vec<u8>,
    /// Empty when the overlay does not exist on base.
    base: Vec<u8>,
}

/// How a component is matched against changed files.
#[derive(Debug)]
enum Dependencies {
    /// Exact membership in the resolved set.
    Tree(DependencySet),
    /// No kustomization reachable; match anything under the directory.
    Prefix,
}

#[derive(Debug)]
struct ResolvedComponent {
    env: Environment,
    component: ComponentPath,
    deps: Dependencies,
}

impl ResolvedComponent {
    fn matches(&self, changed: &BTreeSet<&str>) -> bool {
        match &self.deps {
            Dependencies::Tree(deps) => changed.iter().any(|file| deps.contains(*file)),
            Dependencies::Prefix => {
                changed.iter().any(|file| path_has_prefix(file, &self.component.path))
            }
        }
    }
}

/// Everything one pipeline run produces.
struct Analysis {
    result: DetectionResult,
    matched: AffectedComponents,
}

/// Classifies changesets against environments and clusters.
///
/// Built once per pair of refs and reusable for any number of detection
/// calls. `H` is the ref under review, `B` the ref it is compared against.
#[derive(Debug)]
pub struct Detector<H, B> {
    head: Arc<H>,
    base: Arc<B>,
    overlays_dir: String,
    settings: DetectorSettings,
    /// Validated mapping for the union of overlays on both refs.
    overlay_envs: BTreeMap<String, Environment>,
    head_overlays: Vec<String>,
    base_overlays: Vec<String>,
}

impl<H, B> Detector<H, B>
where
    H: RepoAccessor + 'static,
    B: RepoAccessor + 'static,
{
    /// Build a detector with the default overlay map and layout.
    ///
    /// # Errors
    ///
    /// See [`Detector::with_settings`].
    pub fn new(head: H, base: B, overlays_dir: impl Into<String>) -> Result<Self> {
        Self::with_settings(head, base, overlays_dir, DetectorSettings::default())
    }

    /// Build a detector and validate the overlays on both refs.
    ///
    /// The overlays root may be missing on base (a change that introduces
    /// it); it must be listable on HEAD.
    ///
    /// # Errors
    ///
    /// Fails when the overlays root cannot be listed on HEAD, or with
    /// [`ImpactError::UnknownOverlay`] when any overlay name on either ref is
    /// missing from the environment map.
    pub fn with_settings(
        head: H,
        base: B,
        overlays_dir: impl Into<String>,
        settings: DetectorSettings,
    ) -> Result<Self> {
        let overlays_dir = overlays_dir.into().trim_end_matches('/').to_string();

        let head_overlays =
            head.list_subdirs(&overlays_dir).context("listing overlay dirs on HEAD")?;
        let base_overlays = base.list_subdirs(&overlays_dir).unwrap_or_else(|e| {
            tracing::debug!(target: "detector", "No overlays on base ({e:#}), treating as none");
            Vec::new()
        });

        let mut overlay_envs = BTreeMap::new();
        for name in head_overlays.iter().chain(&base_overlays) {
            let env = settings.overlays.get(name).copied().ok_or_else(|| {
                ImpactError::UnknownOverlay {
                    name: name.clone(),
                    overlays_dir: overlays_dir.clone(),
                }
            })?;
            overlay_envs.insert(name.clone(), env);
        }

        Ok(Self {
            head: Arc::new(head),
            base: Arc::new(base),
            overlays_dir,
            settings,
            overlay_envs,
            head_overlays,
            base_overlays,
        })
    }

    /// Overlay names seen on either ref and their environments.
    #[must_use]
    pub const fn overlays(&self) -> &BTreeMap<String, Environment> {
        &self.overlay_envs
    }

    /// Accessor for the ref under review.
    pub fn head(&self) -> &H {
        &self.head
    }

    /// Accessor for the comparison ref.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Affected environments and clusters for `changed_files`.
    ///
    /// An empty changeset returns an empty result without rendering anything.
    ///
    /// # Errors
    ///
    /// Fails when an overlay cannot be rendered on either ref or a rendered
    /// overlay contains an undecodable document. No partial result is
    /// returned.
    pub async fn detect(&self, changed_files: &[String]) -> Result<DetectionResult> {
        Ok(self.analyze(changed_files).await?.result)
    }

    /// Component paths whose dependencies match `changed_files`, grouped by
    /// environment.
    ///
    /// Overlay diffs and the root applications rule are not attributable to
    /// individual components and contribute nothing here.
    ///
    /// # Errors
    ///
    /// Same as [`Detector::detect`].
    pub async fn affected_components(&self, changed_files: &[String]) -> Result<AffectedComponents> {
        Ok(self.analyze(changed_files).await?.matched)
    }

    async fn analyze(&self, changed_files: &[String]) -> Result<Analysis> {
        let mut analysis = Analysis {
            result: DetectionResult::new(changed_files.to_vec()),
            matched: AffectedComponents::new(),
        };
        if changed_files.is_empty() {
            tracing::info!(target: "detector", "No changed files, nothing to detect");
            return Ok(analysis);
        }

        let builds = self.render_overlays().await?;
        self.detect_removed_overlays(&mut analysis.result);
        detect_overlay_diffs(&builds, &mut analysis.result);

        let (env_paths, clusters) = extract_paths(&builds)?;
        let resolved = self.resolve_components(&env_paths);
        self.match_changed_files(changed_files, &resolved, &clusters, &mut analysis);
        self.apply_static_rules(changed_files, &mut analysis.result);

        Ok(analysis)
    }

    fn overlay_rel(&self, name: &str) -> String {
        format!("{}/{}", self.overlays_dir, name)
    }

    /// Render every HEAD overlay on both refs, sorted by overlay name.
    ///
    /// Each overlay renders in its own task. On the first failure no further
    /// overlays are started; renders already running finish on their own and
    /// their output is dropped.
    async fn render_overlays(&self) -> Result<Vec<OverlayBuild>> {
        let mut pending = stream::iter(&self.head_overlays)
            .map(|name| {
                let job = OverlayJob {
                    name: name.clone(),
                    rel: self.overlay_rel(name),
                    // Validated in the constructor
                    env: self.overlay_envs[name],
                };
                tokio::spawn(render_overlay(Arc::clone(&self.head), Arc::clone(&self.base), job))
            })
            .buffer_unordered(self.settings.max_parallel);

        let mut builds = Vec::with_capacity(self.head_overlays.len());
        while let Some(joined) = pending.next().await {
            let build = joined.map_err(|e| anyhow!(e).context("overlay render task failed"))??;
            builds.push(build);
        }
        builds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(builds)
    }

    fn detect_removed_overlays(&self, result: &mut DetectionResult) {
        for name in &self.base_overlays {
            if self.head.dir_exists(&self.overlay_rel(name)) {
                continue;
            }
            let env = self.overlay_envs[name];
            tracing::info!(target: "detector", "Overlay {name} removed on HEAD, marking {env}");
            result.affected_environments.insert(env);
        }
    }

    fn resolve_components(&self, env_paths: &AffectedComponents) -> Vec<ResolvedComponent> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();

        for (env, paths) in env_paths {
            for component in paths {
                if !seen.insert((*env, component.path.as_str())) {
                    continue;
                }

                // Stale references and not-yet-created cluster dirs are normal
                if !self.head.dir_exists(&component.path) {
                    tracing::debug!(target: "detector", "Skipping {} ({env}): not on HEAD", component.path);
                    continue;
                }

                let deps = match self.head.resolve_deps(&component.path) {
                    Ok(deps) => {
                        tracing::debug!(
                            target: "detector",
                            "Resolved {} ({env}): {} dependencies",
                            component.path,
                            deps.len()
                        );
                        Dependencies::Tree(deps)
                    }
                    Err(e @ ImpactError::KustomizationNotFound { .. }) => {
                        tracing::debug!(target: "detector", "{e}, using prefix match");
                        Dependencies::Prefix
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "detector",
                            "No dependency tree for {}: {e}, using prefix match",
                            component.path
                        );
                        Dependencies::Prefix
                    }
                };

                resolved.push(ResolvedComponent {
                    env: *env,
                    component: component.clone(),
                    deps,
                });
            }
        }
        resolved
    }

    fn match_changed_files(
        &self,
        changed_files: &[String],
        resolved: &[ResolvedComponent],
        clusters: &BTreeMap<String, Vec<String>>,
        analysis: &mut Analysis,
    ) {
        let changed: BTreeSet<&str> = changed_files.iter().map(String::as_str).collect();

        for component in resolved.iter().filter(|c| c.matches(&changed)) {
            tracing::info!(
                target: "detector",
                "Changed files match {} ({})",
                component.component.path,
                component.env
            );
            analysis.result.affected_environments.insert(component.env);
            self.attribute_clusters(&component.component, clusters, &mut analysis.result);

            let matched = analysis.matched.entry(component.env).or_default();
            if !matched.iter().any(|c| c.path == component.component.path) {
                matched.push(component.component.clone());
            }
        }
    }

    fn attribute_clusters(
        &self,
        component: &ComponentPath,
        clusters: &BTreeMap<String, Vec<String>>,
        result: &mut DetectionResult,
    ) {
        if let Some(cluster) = component.cluster_dir.as_deref()
            && !cluster.is_empty()
            && !self.settings.is_reserved(cluster)
        {
            result.affected_clusters.insert(cluster.to_string());
            return;
        }

        // Shared paths: credit every real cluster deploying something below them
        for (cluster, paths) in clusters {
            if self.settings.is_reserved(cluster) {
                continue;
            }
            if paths.iter().any(|p| path_has_prefix(p, &component.path)) {
                result.affected_clusters.insert(cluster.clone());
            }
        }
    }

    fn apply_static_rules(&self, changed_files: &[String], result: &mut DetectionResult) {
        let root_apps_dir = &self.settings.root_apps_dir;
        if let Some(file) = changed_files.iter().find(|f| path_has_prefix(f, root_apps_dir)) {
            tracing::info!(
                target: "detector",
                "{file} is under {root_apps_dir}, marking every environment"
            );
            result.affected_environments.extend(self.settings.known_environments());
        }
    }
}

fn detect_overlay_diffs(builds: &[OverlayBuild], result: &mut DetectionResult) {
    for build in builds.iter().filter(|b| b.head != b.base) {
        tracing::info!(target: "detector", "Overlay {} differs, marking {}", build.name, build.env);
        result.affected_environments.insert(build.env);
    }
}

/// Per-environment component paths and the global cluster map from the HEAD renders.
fn extract_paths(
    builds: &[OverlayBuild],
) -> Result<(AffectedComponents, BTreeMap<String, Vec<String>>)> {
    let mut env_paths = AffectedComponents::new();
    let mut clusters: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for build in builds {
        let parsed = parse_application_sets(&build.head)
            .with_context(|| format!("parsing ApplicationSets from overlay {}", build.name))?;

        env_paths.entry(build.env).or_default().extend(parsed.paths);
        for (cluster, paths) in parsed.clusters {
            clusters.entry(cluster).or_default().extend(paths);
        }
    }
    Ok((env_paths, clusters))
}
