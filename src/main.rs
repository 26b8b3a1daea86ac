//! gitops-impact CLI entry point
//!
//! Parses arguments, runs the selected command and renders any error with
//! its context and suggestion before exiting with status 1.

use anyhow::Result;
use clap::Parser;
use gitops_impact::cli;
use gitops_impact::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
