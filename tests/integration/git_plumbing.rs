//! Git helpers against real repositories.

use anyhow::Result;
use gitops_impact::git::{self, BaseWorktree};
use gitops_impact::test_utils::TestGit;
use tempfile::TempDir;

fn repo_with_feature_branch() -> Result<(TempDir, TestGit, String)> {
    let temp = TempDir::new()?;
    let git = TestGit::new(temp.path().canonicalize()?);
    git.init_main()?;
    git.write("components/a/kustomization.yaml", "resources: []\n")?;
    git.write("components/b/kustomization.yaml", "resources: []\n")?;
    git.commit_all("Initial")?;
    let main_sha = git.rev_parse_head()?;

    git.create_branch("feature")?;
    git.write("components/a/kustomization.yaml", "resources:\n  - deploy.yaml\n")?;
    git.write("components/c/kustomization.yaml", "resources: []\n")?;
    git.remove("components/b")?;
    git.commit_all("Feature work")?;
    Ok((temp, git, main_sha))
}

#[tokio::test]
async fn test_changed_files_between_refs() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;

    let mut changed = git::changed_files(git.repo_path(), "main").await?;
    changed.sort();
    assert_eq!(
        changed,
        vec![
            "components/a/kustomization.yaml",
            "components/b/kustomization.yaml",
            "components/c/kustomization.yaml",
        ]
    );

    assert!(git::changed_files(git.repo_path(), "HEAD").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_moved_file_reports_both_paths() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;
    let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: bar\ndata:\n  key: value\n";
    git.write("components/bar/prod/x.yaml", manifest)?;
    git.commit_all("Add bar")?;
    let before_move = git.rev_parse_head()?;

    git.remove("components/bar/prod/x.yaml")?;
    git.write("components/bar/shared/x.yaml", manifest)?;
    git.commit_all("Move bar manifest")?;

    let mut changed = git::changed_files(git.repo_path(), &before_move).await?;
    changed.sort();
    assert_eq!(changed, vec!["components/bar/prod/x.yaml", "components/bar/shared/x.yaml"]);
    Ok(())
}

#[tokio::test]
async fn test_resolve_ref_and_merge_base() -> Result<()> {
    let (_temp, git, main_sha) = repo_with_feature_branch()?;

    let short = git::resolve_ref(git.repo_path(), "main").await?;
    assert!(short.len() >= 7);
    assert!(main_sha.starts_with(&short));

    let base = git::merge_base(git.repo_path(), "HEAD", "main").await?;
    assert_eq!(base, main_sha);

    assert!(git::resolve_ref(git.repo_path(), "no-such-branch").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_top_level_from_subdirectory() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;
    let top = git::top_level(&git.repo_path().join("components/a")).await?;
    assert_eq!(top, git.repo_path());
    Ok(())
}

#[tokio::test]
async fn test_base_worktree_lifecycle() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;

    let worktree = BaseWorktree::create(git.repo_path(), "main").await?;
    let path = worktree.path().to_path_buf();
    let marker = path.file_name().unwrap().to_string_lossy().to_string();

    // main's content, not the feature branch's
    assert_eq!(std::fs::read_to_string(path.join("components/a/kustomization.yaml"))?, "resources: []\n");
    assert!(path.join("components/b").is_dir());
    assert!(!path.join("components/c").exists());
    assert!(git.worktree_list()?.contains(&marker));

    worktree.cleanup().await;
    assert!(!path.exists());
    assert!(!git.worktree_list()?.contains(&marker));
    Ok(())
}

#[tokio::test]
async fn test_base_worktree_removed_on_drop() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;

    let worktree = BaseWorktree::create(git.repo_path(), "main").await?;
    let path = worktree.path().to_path_buf();
    drop(worktree);

    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn test_base_worktree_unknown_ref_fails() -> Result<()> {
    let (_temp, git, _) = repo_with_feature_branch()?;
    assert!(BaseWorktree::create(git.repo_path(), "does-not-exist").await.is_err());
    Ok(())
}
