//! gitops-impact - change-impact analysis for kustomize GitOps repositories
//!
//! Given the files changed on a branch, answers two questions for a monorepo
//! built from kustomize overlays and Argo CD ApplicationSets:
//!
//! - which deployment environments and clusters does the change affect?
//! - what would actually change in the rendered manifests?
//!
//! The answers drive CI decisions: environment labels, a hold on merges that
//! touch production, and reviewable render diffs.
//!
//! # How detection works
//!
//! Each overlay under the overlays root is rendered on both refs. The
//! ApplicationSets in the HEAD render are expanded into the component
//! directories they deploy, and each component's kustomize dependency tree is
//! resolved without invoking the renderer. A changed file affects an
//! environment when it is part of one of that environment's component trees,
//! when it changes an overlay's rendered output, or when it lives under the
//! root applications directory.
//!
//! # Core Modules
//!
//! - [`deptree`] - kustomize dependency-tree resolution
//! - [`appset`] - ApplicationSet parsing and path extraction
//! - [`detector`] - the impact detector
//! - [`renderdiff`] - concurrent render-and-diff engine and manifest normalization
//!
//! # Supporting Modules
//!
//! - [`repo`] - the [`RepoAccessor`](repo::RepoAccessor) capability and its filesystem implementation
//! - [`kustomize`] - the external render tool
//! - [`git`] - changed files, ref resolution and base worktrees
//! - [`config`] - `gitops-impact.toml`
//! - [`models`] - environments, component paths, detection results
//! - [`core`] - errors and user-facing error rendering
//! - [`cli`] - the `detect` and `render-diff` commands
//! - [`utils`] - paths, parallelism and spinners
//!
//! # Example
//!
//! ```rust,no_run
//! use gitops_impact::detector::Detector;
//! use gitops_impact::git::{self, BaseWorktree};
//! use gitops_impact::repo::RepoRef;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = Path::new("/work/infra-deployments");
//! let changed = git::changed_files(root, "main").await?;
//! let worktree = BaseWorktree::create(root, "main").await?;
//!
//! let detector = Detector::new(RepoRef::new(root), RepoRef::new(worktree.path()), "argo-cd-apps/overlays")?;
//! let result = detector.detect(&changed).await?;
//! worktree.cleanup().await;
//!
//! for env in &result.affected_environments {
//!     println!("affects {env}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod appset;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod deptree;
pub mod detector;
pub mod git;
pub mod kustomize;
pub mod models;
pub mod renderdiff;
pub mod repo;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
