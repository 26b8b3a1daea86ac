//! `render-diff`: render affected components on HEAD and base and report the
//! differences.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::CliConfig;
use super::common::{CommandContext, RepoArgs};
use super::output::{self, ColorChoice, OutputMode};
use crate::detector::AffectedComponents;
use crate::git::{self, BaseWorktree};
use crate::renderdiff::{DiffResult, Engine, sort_diffs};
use crate::repo::RepoAccessor;
use crate::utils::effective_parallelism;
use crate::utils::progress::Spinner;

/// Arguments for `gitops-impact render-diff`.
#[derive(Args, Debug)]
pub struct RenderDiffCommand {
    #[command(flatten)]
    repo: RepoArgs,

    /// Ref to compare HEAD against. Defaults to the merge-base of HEAD and `main`.
    #[arg(long, value_name = "REF")]
    base_ref: Option<String>,

    /// Color terminal output.
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Comma-separated output modes.
    #[arg(long, value_enum, value_delimiter = ',', default_value = "local")]
    output_mode: Vec<OutputMode>,

    /// Directory for `.diff` files. Required by `ci-artifact-dir`; optional for `local`.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Maximum number of components rendered at once. Overrides `max_parallel`.
    #[arg(long, value_name = "N")]
    max_parallel: Option<usize>,

    /// In `local` mode, open the rendered manifests in `$DIFFTOOL` (or
    /// `git difftool`) instead of printing diffs.
    #[arg(long)]
    open: bool,
}

/// Abbreviated SHAs of the two refs, for report headers.
struct Refs {
    head: String,
    base: String,
}

impl RenderDiffCommand {
    /// Run the diff and emit every requested output mode.
    ///
    /// # Errors
    ///
    /// Fails on git, detection or engine errors, and when any output mode
    /// fails. Remaining modes still run after a mode fails.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let modes = output::dedupe_modes(&self.output_mode);
        let use_color = self.color.enabled();
        colored::control::set_override(use_color);

        let ctx = CommandContext::load(&self.repo, cli).await?;
        let root = &ctx.repo_root;

        let base_ref = match &self.base_ref {
            Some(r) => r.clone(),
            None => git::merge_base(root, "HEAD", "main")
                .await
                .context("no --base-ref given and the merge-base with main could not be computed")?,
        };
        let refs = Refs {
            head: git::resolve_ref(root, "HEAD").await?,
            base: git::resolve_ref(root, &base_ref).await?,
        };
        tracing::info!("Comparing {} (base) with {} (HEAD)", refs.base, refs.head);

        let changed = git::changed_files(root, &base_ref).await?;
        if changed.is_empty() {
            println!("No changed files detected, nothing to diff.");
            return Ok(());
        }
        tracing::info!("{} changed file(s)", changed.len());
        ctx.ensure_renderer()?;

        let worktree = BaseWorktree::create(root, &base_ref).await?;
        let outcome = self.diff_against(&ctx, cli, worktree.path(), &changed, &modes, &refs, use_color).await;
        worktree.cleanup().await;
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn diff_against(
        &self,
        ctx: &CommandContext,
        cli: &CliConfig,
        worktree: &Path,
        changed: &[String],
        modes: &[OutputMode],
        refs: &Refs,
        use_color: bool,
    ) -> Result<()> {
        let spinner = Spinner::start("Detecting affected components", !cli.no_progress);
        let affected = async { ctx.detector(worktree)?.affected_components(changed).await }.await;
        spinner.finish_and_clear();
        let affected = affected.context("detecting affected components")?;

        let total: usize = affected.values().map(Vec::len).sum();
        if total == 0 {
            println!("No affected components detected, nothing to diff.");
            return Ok(());
        }
        tracing::info!("{} affected component(s)", total);

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, stopping render diff");
                    cancel.cancel();
                }
            }
        });

        let engine = Engine::new(ctx.head(), ctx.base(worktree))
            .with_concurrency(effective_parallelism(self.max_parallel.or(ctx.config.max_parallel)))
            .with_cancellation(cancel);

        let outcome = if modes == [OutputMode::Local] && self.output_dir.is_none() && !self.open {
            stream_local(&engine, &affected, use_color).await
        } else {
            match engine.run(&affected).await {
                Ok(mut result) => {
                    sort_diffs(&mut result.diffs);
                    self.emit_all(&result, modes, refs, use_color).await
                }
                Err(e) => Err(e),
            }
        };
        interrupt.abort();
        outcome
    }

    async fn emit_all(&self, result: &DiffResult, modes: &[OutputMode], refs: &Refs, use_color: bool) -> Result<()> {
        let mut failed = Vec::new();
        for mode in modes {
            if let Err(e) = self.emit(*mode, result, refs, use_color).await {
                tracing::error!("Output mode {} failed: {:#}", mode, e);
                failed.push(mode.as_str());
            }
        }
        if !failed.is_empty() {
            bail!("output mode(s) failed: {}", failed.join(", "));
        }
        Ok(())
    }

    async fn emit(&self, mode: OutputMode, result: &DiffResult, refs: &Refs, use_color: bool) -> Result<()> {
        match mode {
            OutputMode::Local => {
                if let Some(dir) = &self.output_dir {
                    output::write_diff_files(result, dir).await.context("writing diff files")?;
                }
                if self.open {
                    return output::open_in_diff_tool(result).await.context("opening diff tool");
                }
                let mut stdout = std::io::stdout().lock();
                for diff in &result.diffs {
                    output::write_component_diff(&mut stdout, diff, use_color)?;
                }
                output::write_summary(&mut stdout, result)?;
                stdout.flush()?;
            }
            OutputMode::CiSummary => output::write_ci_summary(result)?,
            OutputMode::CiComment => print!("{}", output::comment_body(result, &refs.head, &refs.base)),
            OutputMode::CiArtifactDir => {
                let Some(dir) = &self.output_dir else {
                    bail!("--output-dir is required for ci-artifact-dir mode");
                };
                let written =
                    output::write_diff_files(result, dir).await.context("writing artifact diff files")?;
                println!("Wrote {} diff files to {}", written, dir.display());
            }
        }
        Ok(())
    }
}

/// Print each component as soon as it finishes, then the summary.
async fn stream_local<H, B>(
    engine: &Engine<H, B>,
    affected: &AffectedComponents,
    use_color: bool,
) -> Result<()>
where
    H: RepoAccessor + 'static,
    B: RepoAccessor + 'static,
{
    let mut result = engine
        .run_progressive(affected, |diff| {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = output::write_component_diff(&mut stdout, diff, use_color) {
                tracing::warn!("Failed to print {}: {}", diff.path, e);
            }
        })
        .await?;

    sort_diffs(&mut result.diffs);
    let mut stdout = std::io::stdout().lock();
    output::write_summary(&mut stdout, &result)?;
    stdout.flush()?;
    Ok(())
}
