//! `detect`: classify the branch's changes and print the resulting labels.

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::fmt::Write as _;

use super::CliConfig;
use super::common::{CommandContext, RepoArgs};
use crate::constants::{HOLD_PRODUCTION_LABEL, NO_ENVIRONMENT_LABEL};
use crate::git::{self, BaseWorktree};
use crate::models::{DetectionResult, Environment};
use crate::utils::progress::Spinner;

/// Format of the `detect` report.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// A single JSON object
    Json,
}

/// Arguments for `gitops-impact detect`.
#[derive(Args, Debug)]
pub struct DetectCommand {
    #[command(flatten)]
    repo: RepoArgs,

    /// Ref to compare HEAD against.
    #[arg(long, default_value = "main", value_name = "REF")]
    base_ref: String,

    /// Include `cluster/<name>` labels alongside the environment labels.
    #[arg(long)]
    cluster_labels: bool,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl DetectCommand {
    /// Run detection between `--base-ref` and HEAD and print the report.
    ///
    /// # Errors
    ///
    /// Fails when git fails, the base worktree cannot be created, or detection
    /// fails.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let ctx = CommandContext::load(&self.repo, cli).await?;
        let root = &ctx.repo_root;

        let head_sha = git::resolve_ref(root, "HEAD").await?;
        let base_sha = git::resolve_ref(root, &self.base_ref).await?;
        let changed = git::changed_files(root, &self.base_ref).await?;

        let result = if changed.is_empty() {
            tracing::info!("No changed files between {} and HEAD", self.base_ref);
            DetectionResult::new(changed)
        } else {
            ctx.ensure_renderer()?;
            tracing::info!("Analyzing {} changed file(s) against {}", changed.len(), self.base_ref);

            let worktree = BaseWorktree::create(root, &self.base_ref).await?;
            let spinner = Spinner::start("Rendering overlays", !cli.no_progress);
            let outcome = async { ctx.detector(worktree.path())?.detect(&changed).await }.await;
            spinner.finish_and_clear();
            worktree.cleanup().await;
            outcome?
        };

        let report = DetectReport::new(head_sha, base_sha, &result, self.cluster_labels);
        match self.format {
            OutputFormat::Text => print!("{}", report.to_text()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}

/// Labels a pull request with this result should carry.
///
/// Environment labels always; cluster labels only when `include_clusters`.
/// `environment/none` stands in when no environment is affected, and the
/// production hold label is added whenever production is affected.
#[must_use]
pub fn pull_request_labels(result: &DetectionResult, include_clusters: bool) -> Vec<String> {
    let set = result.labels();
    let mut labels = if include_clusters {
        set.all()
    } else {
        set.environments
    };
    if result.affected_environments.is_empty() {
        labels.push(NO_ENVIRONMENT_LABEL.to_string());
    }
    if result.affects(Environment::Production) {
        labels.push(HOLD_PRODUCTION_LABEL.to_string());
    }
    labels
}

#[derive(Debug, Serialize)]
struct DetectReport {
    head: String,
    base: String,
    changed_files: Vec<String>,
    affected_environments: Vec<Environment>,
    affected_clusters: Vec<String>,
    labels: Vec<String>,
}

impl DetectReport {
    fn new(head: String, base: String, result: &DetectionResult, include_clusters: bool) -> Self {
        let mut changed_files = result.changed_files.clone();
        changed_files.sort();
        Self {
            head,
            base,
            changed_files,
            affected_environments: result.affected_environments.iter().copied().collect(),
            affected_clusters: result.affected_clusters.iter().cloned().collect(),
            labels: pull_request_labels(result, include_clusters),
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "HEAD: {}", self.head);
        let _ = writeln!(out, "Base: {}", self.base);
        let _ = writeln!(out);

        let _ = writeln!(out, "Changed files:");
        for file in &self.changed_files {
            let _ = writeln!(out, "  {file}");
        }
        let _ = writeln!(out);

        let envs: Vec<String> = self.affected_environments.iter().map(ToString::to_string).collect();
        write_list(&mut out, "Affected environments:", &envs);
        write_list(&mut out, "Affected clusters:", &self.affected_clusters);
        write_list(&mut out, "Labels that would be applied:", &self.labels);
        out
    }
}

fn write_list(out: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(out, "{heading}");
    if items.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
    let _ = writeln!(out);
}
