//! Output formatting for `render-diff`.
//!
//! Every writer here expects the diffs already ordered with
//! [`crate::renderdiff::sort_diffs`], except [`write_component_diff`], which
//! is also used for streaming in completion order.

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::constants::{CI_SUMMARY_TRUNCATE_BYTES, DIFFTOOL_ENV, RENDER_DIFF_COMMENT_MARKER};
use crate::renderdiff::{ComponentDiff, DiffResult};

/// Where `render-diff` sends its results.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// Colored diffs and a summary on stdout
    Local,
    /// Markdown for the CI job summary
    CiSummary,
    /// Pull request comment body on stdout
    CiComment,
    /// One `.diff` file per component in `--output-dir`
    CiArtifactDir,
}

impl OutputMode {
    /// Name as accepted on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CiSummary => "ci-summary",
            Self::CiComment => "ci-comment",
            Self::CiArtifactDir => "ci-artifact-dir",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop repeated modes, keeping the first occurrence of each.
#[must_use]
pub fn dedupe_modes(modes: &[OutputMode]) -> Vec<OutputMode> {
    let mut unique = Vec::with_capacity(modes.len());
    for mode in modes {
        if !unique.contains(mode) {
            unique.push(*mode);
        }
    }
    unique
}

/// When to color terminal output.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorChoice {
    /// Color when stdout is a terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl ColorChoice {
    /// Resolve against the current stdout.
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::stdout().is_terminal(),
        }
    }
}

/// Print one component: a header line followed by its diff or render error.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_component_diff(w: &mut impl Write, diff: &ComponentDiff, use_color: bool) -> std::io::Result<()> {
    if let Some(error) = &diff.error {
        let header = format!("=== {} ({}) === BUILD ERROR", diff.path, diff.env);
        if use_color {
            writeln!(w, "{}", header.red().bold())?;
            writeln!(w, "{}", error.red())?;
        } else {
            writeln!(w, "{header}")?;
            writeln!(w, "{error}")?;
        }
        return writeln!(w);
    }

    let header = format!("=== {} ({}) === +{} -{}", diff.path, diff.env, diff.added, diff.removed);
    if use_color {
        writeln!(w, "{}", header.cyan().bold())?;
        write_colored_diff(w, &diff.diff)?;
    } else {
        writeln!(w, "{header}")?;
        write!(w, "{}", diff.diff)?;
    }
    writeln!(w)
}

fn write_colored_diff(w: &mut impl Write, diff: &str) -> std::io::Result<()> {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            writeln!(w, "{}", line.bold())?;
        } else if line.starts_with("@@") {
            writeln!(w, "{}", line.cyan())?;
        } else if line.starts_with('+') {
            writeln!(w, "{}", line.green())?;
        } else if line.starts_with('-') {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{line}")?;
        }
    }
    Ok(())
}

/// Print the per-component summary and totals.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_summary(w: &mut impl Write, result: &DiffResult) -> std::io::Result<()> {
    if result.diffs.is_empty() {
        return writeln!(w, "\nNo render differences detected.");
    }

    writeln!(w, "\n--- Summary ---")?;
    for d in &result.diffs {
        if d.is_error() {
            writeln!(w, "  {} ({}): BUILD ERROR", d.path, d.env)?;
        } else {
            writeln!(w, "  {} ({}): +{} -{}", d.path, d.env, d.added, d.removed)?;
        }
    }
    writeln!(
        w,
        "\nTotal: {} components, +{} -{} lines",
        result.diffs.len(),
        result.total_added,
        result.total_removed
    )
}

/// Longest prefix of `s` no longer than `max` bytes that ends on a char boundary.
#[must_use]
pub fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Markdown for a CI job summary, one collapsible block per component.
#[must_use]
pub fn ci_summary_markdown(result: &DiffResult) -> String {
    let mut out = String::new();
    if result.diffs.is_empty() {
        let _ = writeln!(out, "No render differences detected.");
        return out;
    }

    let _ = writeln!(out, "# Kustomize Render Diff\n");
    let _ = writeln!(
        out,
        "**{} components** with differences (+{} -{} lines)\n",
        result.diffs.len(),
        result.total_added,
        result.total_removed
    );

    for d in &result.diffs {
        if let Some(error) = &d.error {
            let _ = writeln!(out, "<details>\n<summary>{} ({}) - build error</summary>\n", d.path, d.env);
            let _ = writeln!(out, "```\n{error}\n```\n");
        } else {
            let _ = writeln!(
                out,
                "<details>\n<summary>{} ({}) - +{} -{}</summary>\n",
                d.path, d.env, d.added, d.removed
            );
            let body = truncate_at_char_boundary(&d.diff, CI_SUMMARY_TRUNCATE_BYTES);
            let _ = writeln!(out, "```diff\n{body}\n```\n");
            if body.len() < d.diff.len() {
                let _ = writeln!(out, "Diff truncated. Download the full artifact for the complete diff.");
            }
        }
        let _ = writeln!(out, "</details>\n");
    }
    out
}

/// Append the CI summary to `$GITHUB_STEP_SUMMARY`, or print it when unset.
///
/// # Errors
///
/// Fails when the summary file cannot be opened or written.
pub fn write_ci_summary(result: &DiffResult) -> Result<()> {
    let markdown = ci_summary_markdown(result);
    match std::env::var_os("GITHUB_STEP_SUMMARY").filter(|p| !p.is_empty()) {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .context("opening $GITHUB_STEP_SUMMARY")?;
            file.write_all(markdown.as_bytes()).context("writing $GITHUB_STEP_SUMMARY")?;
        }
        None => print!("{markdown}"),
    }
    Ok(())
}

/// Pull request comment body: a marker line, a table of changes and totals.
#[must_use]
pub fn comment_body(result: &DiffResult, head_sha: &str, base_sha: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RENDER_DIFF_COMMENT_MARKER}");
    let _ = writeln!(out, "### Kustomize Render Diff\n");
    let _ = writeln!(out, "Comparing `{base_sha}` → `{head_sha}`\n");

    if result.diffs.is_empty() {
        let _ = writeln!(out, "No render differences detected.");
        return out;
    }

    let _ = writeln!(out, "| Component | Environment | Changes |");
    let _ = writeln!(out, "|-----------|-------------|---------|");
    for d in &result.diffs {
        if d.is_error() {
            let _ = writeln!(out, "| `{}` | {} | build error |", d.path, d.env);
        } else {
            let _ = writeln!(out, "| `{}` | {} | +{} -{} |", d.path, d.env, d.added, d.removed);
        }
    }
    let _ = writeln!(
        out,
        "\n**Total:** {} components, +{} -{} lines\n",
        result.diffs.len(),
        result.total_added,
        result.total_removed
    );
    let _ = writeln!(
        out,
        "Full diff available in the [workflow summary](../actions) and as a downloadable artifact."
    );
    out
}

/// File name for a component's diff.
///
/// `<cluster>--<env>.diff` when the component targets one cluster, else the
/// path with `/` replaced by `__`, then `__<env>.diff`.
#[must_use]
pub fn diff_file_name(diff: &ComponentDiff) -> String {
    match &diff.cluster_dir {
        Some(cluster) if !cluster.is_empty() => format!("{cluster}--{}.diff", diff.env),
        _ => format!("{}__{}.diff", diff.path.replace('/', "__"), diff.env),
    }
}

/// Make `name` unique among the names handed out so far by appending `-2`,
/// `-3`, ... before the extension.
pub fn dedupe_file_name(name: String, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(name.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return name;
    }
    match name.rfind('.') {
        Some(dot) => format!("{}-{}{}", &name[..dot], count, &name[dot..]),
        None => format!("{name}-{count}"),
    }
}

/// Write one `.diff` file per successful component with a diff.
///
/// Returns the number of files written.
///
/// # Errors
///
/// Fails when the directory cannot be created or a file cannot be written.
pub async fn write_diff_files(result: &DiffResult, dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating output dir {}", dir.display()))?;

    let mut seen = HashMap::new();
    let mut written = 0;
    for d in result.diffs.iter().filter(|d| !d.is_error() && d.has_diff()) {
        let path = dir.join(dedupe_file_name(diff_file_name(d), &mut seen));
        tokio::fs::write(&path, &d.diff).await.with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }
    tracing::debug!("Wrote {} diff file(s) to {}", written, dir.display());
    Ok(written)
}

/// Write the base and head manifests of every successful component with a
/// diff into `base_dir` and `head_dir`, under the same `.yaml` name on both
/// sides. A side the component does not exist on is written as an empty file.
///
/// Returns the number of components written.
///
/// # Errors
///
/// Fails when a file cannot be written.
pub async fn write_manifest_pairs(result: &DiffResult, base_dir: &Path, head_dir: &Path) -> Result<usize> {
    let mut seen = HashMap::new();
    let mut written = 0;
    for d in result.diffs.iter().filter(|d| !d.is_error() && d.has_diff()) {
        let name = dedupe_file_name(diff_file_name(d), &mut seen);
        let name = format!("{}.yaml", name.trim_end_matches(".diff"));

        let base_path = base_dir.join(&name);
        tokio::fs::write(&base_path, d.base_manifest.as_deref().unwrap_or_default())
            .await
            .with_context(|| format!("writing base manifest for {}", d.path))?;
        let head_path = head_dir.join(&name);
        tokio::fs::write(&head_path, d.head_manifest.as_deref().unwrap_or_default())
            .await
            .with_context(|| format!("writing head manifest for {}", d.path))?;
        written += 1;
    }
    Ok(written)
}

/// Program and arguments for a folder comparison of `base_dir` and `head_dir`.
///
/// Uses `tool` when set, else `git difftool --no-index --dir-diff`.
#[must_use]
pub fn diff_tool_command(tool: Option<&str>, base_dir: &Path, head_dir: &Path) -> (String, Vec<String>) {
    let dirs = [base_dir.display().to_string(), head_dir.display().to_string()];
    match tool.map(str::trim).filter(|t| !t.is_empty()) {
        Some(tool) => (tool.to_string(), dirs.to_vec()),
        None => {
            let mut args: Vec<String> =
                ["difftool", "--no-index", "--dir-diff"].iter().map(ToString::to_string).collect();
            args.extend(dirs);
            ("git".to_string(), args)
        }
    }
}

/// Open every changed component in a folder diff tool.
///
/// Manifests go into two fresh temporary directories that are left in place
/// afterwards; GUI tools may still be reading them after they return. The
/// tool comes from `$DIFFTOOL`, falling back to `git difftool`. A non-zero
/// exit from the tool is not an error, since diff tools use it to report
/// differences.
///
/// # Errors
///
/// Fails when the directories cannot be created or written, or the tool
/// cannot be started.
pub async fn open_in_diff_tool(result: &DiffResult) -> Result<()> {
    if result.diffs.is_empty() {
        println!("No render differences to display.");
        return Ok(());
    }

    let base_dir = kept_temp_dir("render-diff-base-")?;
    let head_dir = kept_temp_dir("render-diff-head-")?;
    write_manifest_pairs(result, &base_dir, &head_dir).await?;

    let tool = std::env::var(DIFFTOOL_ENV).ok();
    let (program, args) = diff_tool_command(tool.as_deref(), &base_dir, &head_dir);
    println!("Opening folder diff: {} vs {}", base_dir.display(), head_dir.display());
    tracing::debug!("Executing command: {} {}", program, args.join(" "));

    let status = tokio::process::Command::new(&program)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("starting diff tool {program}"))?;
    if !status.success() {
        tracing::debug!("Diff tool {} exited with {}", program, status);
    }
    Ok(())
}

fn kept_temp_dir(prefix: &str) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .with_context(|| format!("creating temporary directory {prefix}*"))?;
    Ok(dir.keep())
}
