//! A small GitOps repository on disk with a `main` branch and a `feature`
//! branch checked out.

#![allow(dead_code)]

use anyhow::{Context, Result};
use gitops_impact::config::ImpactConfig;
use gitops_impact::detector::{AffectedComponents, Detector, DetectorSettings};
use gitops_impact::git::{self, BaseWorktree};
use gitops_impact::models::DetectionResult;
use gitops_impact::repo::RepoRef;
use gitops_impact::test_utils::{TestGit, fixtures};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Concatenates every `*.yaml` in the directory as separate documents.
const RENDER_SCRIPT: &str = "for f in \"$1\"/*.yaml; do echo '---'; cat \"$f\"; done\n";

pub const OVERLAYS: &str = "argo-cd-apps/overlays";

pub struct GitopsRepo {
    _temp: TempDir,
    root: PathBuf,
    git: TestGit,
}

impl GitopsRepo {
    /// Commit the initial layout on `main`, then switch to `feature`.
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let base = temp.path().canonicalize()?;
        let root = base.join("repo");
        std::fs::create_dir_all(&root)?;

        let script = base.join("render.sh");
        std::fs::write(&script, RENDER_SCRIPT)?;

        let git = TestGit::new(&root);
        git.init_main()?;

        git.write(
            "gitops-impact.toml",
            &format!(
                "[overlays]\ndevelopment = \"development\"\nkonflux-public-staging = \"staging\"\n\n\
                 [render]\nprogram = \"sh\"\nargs = [\"{}\"]\n",
                script.display()
            ),
        )?;
        git.write("README.md", "# infra\n")?;
        git.write("argo-cd-apps/app-of-app-sets/root.yaml", "kind: Application\nmetadata:\n  name: root\n")?;

        for (overlay, env) in [("development", "development"), ("konflux-public-staging", "staging")] {
            git.write(&format!("{OVERLAYS}/{overlay}/kustomization.yaml"), "resources:\n  - appset.yaml\n")?;
            git.write(
                &format!("{OVERLAYS}/{overlay}/appset.yaml"),
                &fixtures::static_app_set(&format!("foo-{env}"), &format!("components/foo/{env}")),
            )?;
        }

        git.write("components/foo/base/kustomization.yaml", "resources:\n  - deployment.yaml\n")?;
        git.write(
            "components/foo/base/deployment.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: foo\nspec:\n  replicas: 1\n",
        )?;
        git.write("components/foo/development/kustomization.yaml", "resources:\n  - ../base\n")?;
        git.write("components/foo/staging/kustomization.yaml", "resources:\n  - ../base\nnamePrefix: stg-\n")?;

        git.commit_all("Initial layout")?;
        git.create_branch("feature")?;

        Ok(Self {
            _temp: temp,
            root,
            git,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> &TestGit {
        &self.git
    }

    /// Write `content` to `rel` and commit it on the current branch.
    pub fn commit_change(&self, rel: &str, content: &str) -> Result<()> {
        self.git.write(rel, content)?;
        self.git.commit_all(&format!("Change {rel}"))
    }

    pub async fn config(&self) -> Result<ImpactConfig> {
        ImpactConfig::load_or_default(None, &self.root).await
    }

    /// Run `f` with a detector over HEAD and a worktree of `base_ref`.
    async fn with_detector<T, F, Fut>(&self, base_ref: &str, f: F) -> Result<T>
    where
        F: FnOnce(Detector<RepoRef, RepoRef>, Vec<String>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let config = self.config().await?;
        let changed = git::changed_files(&self.root, base_ref).await?;
        let worktree = BaseWorktree::create(&self.root, base_ref).await?;

        let detector = Detector::with_settings(
            RepoRef::from_config(&self.root, &config),
            RepoRef::from_config(worktree.path(), &config),
            config.overlays_dir.clone(),
            DetectorSettings::from_config(&config),
        );
        let outcome = match detector {
            Ok(detector) => f(detector, changed).await,
            Err(e) => Err(e),
        };
        worktree.cleanup().await;
        outcome.context("running detector")
    }

    pub async fn detect(&self, base_ref: &str) -> Result<DetectionResult> {
        self.with_detector(base_ref, |detector, changed| async move { detector.detect(&changed).await })
            .await
    }

    pub async fn affected_components(&self, base_ref: &str) -> Result<AffectedComponents> {
        self.with_detector(base_ref, |detector, changed| async move {
            detector.affected_components(&changed).await
        })
        .await
    }
}
