//! Detection and render diffs over an on-disk repository.

use crate::common::{GitopsRepo, OVERLAYS};
use anyhow::Result;
use gitops_impact::core::ImpactError;
use gitops_impact::models::{ComponentPath, Environment};
use gitops_impact::renderdiff::{Engine, sort_diffs};
use gitops_impact::repo::RepoRef;
use gitops_impact::test_utils::fixtures;
use std::collections::BTreeSet;

#[tokio::test]
async fn test_component_change_affects_only_its_environment() -> Result<()> {
    gitops_impact::test_utils::init_test_logging(None);
    let repo = GitopsRepo::new()?;
    repo.commit_change("components/foo/staging/kustomization.yaml", "resources:\n  - ../base\nnamePrefix: staging-\n")?;

    let result = repo.detect("main").await?;
    assert_eq!(result.affected_environments, BTreeSet::from([Environment::Staging]));
    assert!(result.affected_clusters.is_empty());
    assert_eq!(result.changed_files, vec!["components/foo/staging/kustomization.yaml"]);
    Ok(())
}

#[tokio::test]
async fn test_shared_base_change_affects_every_consumer() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change(
        "components/foo/base/deployment.yaml",
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: foo\nspec:\n  replicas: 3\n",
    )?;

    let result = repo.detect("main").await?;
    assert_eq!(
        result.affected_environments,
        BTreeSet::from([Environment::Development, Environment::Staging])
    );
    Ok(())
}

#[tokio::test]
async fn test_unrelated_change_affects_nothing() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change("README.md", "# infra deployments\n")?;

    let result = repo.detect("main").await?;
    assert!(result.affected_environments.is_empty());
    assert_eq!(result.labels().all(), Vec::<String>::new());
    Ok(())
}

#[tokio::test]
async fn test_root_apps_change_affects_all_environments() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change("argo-cd-apps/app-of-app-sets/root.yaml", "kind: Application\nmetadata:\n  name: root2\n")?;

    let result = repo.detect("main").await?;
    assert_eq!(
        result.affected_environments,
        BTreeSet::from([Environment::Development, Environment::Staging])
    );
    Ok(())
}

#[tokio::test]
async fn test_overlay_render_change_is_detected() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change(
        &format!("{OVERLAYS}/development/appset.yaml"),
        &fixtures::static_app_set("foo-development", "components/foo/base"),
    )?;

    let result = repo.detect("main").await?;
    assert!(result.affects(Environment::Development));
    assert!(!result.affects(Environment::Staging));
    Ok(())
}

#[tokio::test]
async fn test_unknown_overlay_is_rejected() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change(&format!("{OVERLAYS}/preview/kustomization.yaml"), "resources: []\n")?;

    let err = repo.detect("main").await.unwrap_err();
    let unknown = err.chain().find_map(|e| e.downcast_ref::<ImpactError>());
    assert!(
        matches!(unknown, Some(ImpactError::UnknownOverlay { name, .. }) if name == "preview"),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[tokio::test]
async fn test_affected_components_feed_render_diff() -> Result<()> {
    let repo = GitopsRepo::new()?;
    repo.commit_change("components/foo/staging/kustomization.yaml", "resources:\n  - ../base\nnamePrefix: staging-\n")?;

    let affected = repo.affected_components("main").await?;
    assert_eq!(affected.len(), 1);
    assert_eq!(affected[&Environment::Staging], vec![ComponentPath::new("components/foo/staging")]);

    // Diff against a fresh worktree of main
    let config = repo.config().await?;
    let worktree = gitops_impact::git::BaseWorktree::create(repo.root(), "main").await?;
    let engine = Engine::new(
        RepoRef::from_config(repo.root(), &config),
        RepoRef::from_config(worktree.path(), &config),
    )
    .with_concurrency(2);
    let outcome = engine.run(&affected).await;
    worktree.cleanup().await;

    let mut result = outcome?;
    sort_diffs(&mut result.diffs);
    assert_eq!(result.diffs.len(), 1);
    let diff = &result.diffs[0];
    assert_eq!(diff.path, "components/foo/staging");
    assert_eq!((diff.added, diff.removed), (1, 1));
    assert!(diff.diff.contains("-namePrefix: stg-"));
    assert!(diff.diff.contains("+namePrefix: staging-"));
    Ok(())
}
