//! The `gitops-impact` binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn gitops_impact() -> Command {
    let mut cmd = Command::cargo_bin("gitops-impact").unwrap();
    cmd.env("GITOPS_IMPACT_NO_PROGRESS", "1").env_remove("RUST_LOG").env_remove("GITHUB_STEP_SUMMARY");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    gitops_impact()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("render-diff"));
}

#[test]
fn test_version() {
    gitops_impact()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_output_mode_rejected() {
    gitops_impact()
        .args(["render-diff", "--output-mode", "local,slack"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("slack"));
}

#[test]
fn test_invalid_color_rejected() {
    gitops_impact()
        .args(["render-diff", "--color", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    gitops_impact().args(["-v", "-q", "detect"]).assert().failure();
}

#[test]
fn test_outside_a_repository_fails_with_error_display() {
    let temp = TempDir::new().unwrap();
    gitops_impact()
        .current_dir(temp.path())
        .args(["--quiet", "detect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[cfg(unix)]
mod with_repository {
    use super::gitops_impact;
    use crate::common::GitopsRepo;
    use predicates::prelude::*;

    fn staging_change() -> GitopsRepo {
        let repo = GitopsRepo::new().unwrap();
        repo.commit_change("components/foo/staging/kustomization.yaml", "resources:\n  - ../base\nnamePrefix: staging-\n")
            .unwrap();
        repo
    }

    #[test]
    fn test_detect_text_report() {
        let repo = staging_change();
        gitops_impact()
            .args(["--quiet", "detect", "--base-ref", "main", "--repo-root"])
            .arg(repo.root())
            .assert()
            .success()
            .stdout(predicate::str::contains("Changed files:\n  components/foo/staging/kustomization.yaml"))
            .stdout(predicate::str::contains("Affected environments:\n  - staging"))
            .stdout(predicate::str::contains("  - environment/staging"));
    }

    #[test]
    fn test_detect_json_report() {
        let repo = staging_change();
        let output = gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "detect", "--base-ref", "main", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["affected_environments"], serde_json::json!(["staging"]));
        assert_eq!(report["labels"], serde_json::json!(["environment/staging"]));
    }

    #[test]
    fn test_detect_without_changes() {
        let repo = GitopsRepo::new().unwrap();
        gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "detect", "--base-ref", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("  - environment/none"));
    }

    #[test]
    fn test_render_diff_comment_and_artifacts() {
        let repo = staging_change();
        let out_dir = repo.root().parent().unwrap().join("diffs");

        gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "render-diff", "--color", "never", "--output-mode", "ci-comment,ci-artifact-dir"])
            .arg("--output-dir")
            .arg(&out_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("<!-- render-diff-comment -->"))
            .stdout(predicate::str::contains("| `components/foo/staging` | staging | +1 -1 |"))
            .stdout(predicate::str::contains("Wrote 1 diff files to"));

        let diff = std::fs::read_to_string(out_dir.join("components__foo__staging__staging.diff")).unwrap();
        assert!(diff.contains("+namePrefix: staging-"));
    }

    #[test]
    fn test_render_diff_local_stream() {
        let repo = staging_change();
        gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "render-diff", "--base-ref", "main", "--color", "never", "--max-parallel", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("=== components/foo/staging (staging) === +1 -1"))
            .stdout(predicate::str::contains("Total: 1 components, +1 -1 lines"));
    }

    #[test]
    fn test_render_diff_open_runs_difftool() {
        let repo = staging_change();
        gitops_impact()
            .current_dir(repo.root())
            .env("DIFFTOOL", "diff")
            .args(["--quiet", "render-diff", "--base-ref", "main", "--open"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Opening folder diff:"))
            .stdout(predicate::str::contains("< namePrefix: stg-"))
            .stdout(predicate::str::contains("> namePrefix: staging-"));
    }

    #[test]
    fn test_render_diff_artifact_mode_needs_output_dir() {
        let repo = staging_change();
        gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "render-diff", "--base-ref", "main", "--output-mode", "ci-artifact-dir"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("ci-artifact-dir"));
    }

    #[test]
    fn test_render_diff_unrelated_change() {
        let repo = GitopsRepo::new().unwrap();
        repo.commit_change("README.md", "# changed\n").unwrap();
        gitops_impact()
            .current_dir(repo.root())
            .args(["--quiet", "render-diff", "--base-ref", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No affected components detected"));
    }
}
