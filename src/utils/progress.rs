//! Spinners for long-running steps.
//!
//! Spinners draw on stderr and are hidden when disabled by the caller, when
//! stderr is not a terminal, or when `GITOPS_IMPACT_NO_PROGRESS` is set.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Environment variable that disables every spinner.
pub const NO_PROGRESS_ENV: &str = "GITOPS_IMPACT_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some() || !std::io::stderr().is_terminal()
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "])
}

/// An indeterminate progress indicator.
#[derive(Clone, Debug)]
pub struct Spinner {
    inner: IndicatifBar,
}

impl Spinner {
    /// Start a spinner showing `msg`. When `enabled` is false it draws nothing.
    #[must_use]
    pub fn start(msg: impl Into<String>, enabled: bool) -> Self {
        let inner = if !enabled || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        inner.set_message(msg.into());
        Self {
            inner,
        }
    }

    /// Replace the message.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Whether anything is drawn.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Stop and erase the spinner.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_spinner_is_hidden() {
        let spinner = Spinner::start("Rendering", false);
        assert!(spinner.is_hidden());
        spinner.set_message("still rendering");
        spinner.finish_and_clear();
    }
}
