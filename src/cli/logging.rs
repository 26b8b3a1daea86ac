//! Log setup for the binary.
//!
//! Two `fmt` layers with separate filters: a compact stderr layer at the
//! level chosen by the global flags (or `RUST_LOG`), and an optional file
//! layer that always records DEBUG and above with timestamps and no ANSI.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` for the stderr layer.
/// Calling this when a subscriber is already installed leaves the existing
/// one in place.
///
/// # Errors
///
/// Returns an error if `log_file` cannot be opened for appending.
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> Result<()> {
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    if tracing_subscriber::registry().with(stderr_layer).with(file_layer).try_init().is_err() {
        tracing::debug!("Logging already initialised");
    }
    Ok(())
}
