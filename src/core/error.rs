//! Error handling for gitops-impact
//!
//! This module provides the error types and user-facing error reporting for the
//! change-impact engine. The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can tell recoverable conditions
//!    (a missing kustomization, a single component failing to render) from
//!    fatal ones (an unknown overlay, a broken generator manifest)
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`ImpactError`] - Enumerated error types for every failure the engine reports
//! - [`ErrorContext`] - Wrapper that adds details and suggestions for display
//!
//! # Error Categories
//!
//! - **Configuration**: [`ImpactError::UnknownOverlay`], [`ImpactError::ConfigError`]
//! - **Rendering**: [`ImpactError::OverlayRender`], [`ImpactError::ComponentRender`],
//!   [`ImpactError::RenderToolNotFound`], [`ImpactError::RenderTimeout`],
//!   [`ImpactError::RenderFailed`]
//! - **Parsing**: [`ImpactError::ManifestParse`], [`ImpactError::KustomizationParse`]
//! - **Dependency walking**: [`ImpactError::KustomizationNotFound`]
//! - **Git**: [`ImpactError::GitNotFound`], [`ImpactError::GitCommandError`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use gitops_impact::core::{ImpactError, user_friendly_error};
//!
//! let err = anyhow::Error::from(ImpactError::UnknownOverlay {
//!     name: "preview".to_string(),
//!     overlays_dir: "argo-cd-apps/overlays".to_string(),
//! });
//! user_friendly_error(err).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for gitops-impact operations.
///
/// Every fatal error carries the overlay, environment or component path it
/// concerns so the message is actionable without a debugger.
#[derive(Error, Debug)]
pub enum ImpactError {
    /// An overlay directory exists on one of the refs but has no environment mapping.
    #[error("unknown overlay '{name}' in {overlays_dir}: not present in the overlay environment map")]
    UnknownOverlay {
        /// Overlay directory name
        name: String,
        /// Overlays root the name was found under
        overlays_dir: String,
    },

    /// Rendering an overlay failed on one of the refs.
    #[error("rendering overlay '{overlay}' on {git_ref} failed: {reason}")]
    OverlayRender {
        /// Overlay directory name
        overlay: String,
        /// Which side of the comparison ("HEAD" or "base")
        git_ref: String,
        /// Renderer output explaining the failure
        reason: String,
    },

    /// Rendering a component directory failed on one of the refs.
    #[error("rendering {path} on {git_ref} failed: {reason}")]
    ComponentRender {
        /// Component path relative to the repository root
        path: String,
        /// Which side of the comparison ("HEAD" or "base")
        git_ref: String,
        /// Renderer output explaining the failure
        reason: String,
    },

    /// A component directory was requested but exists on neither ref.
    #[error("component {path} does not exist on either ref")]
    ComponentMissing {
        /// Component path relative to the repository root
        path: String,
    },

    /// The external render tool could not be started.
    #[error("render tool '{program}' was not found in PATH")]
    RenderToolNotFound {
        /// Program name from the render configuration
        program: String,
    },

    /// The external render tool did not finish in time.
    #[error("rendering {path} timed out after {seconds}s")]
    RenderTimeout {
        /// Directory being rendered
        path: String,
        /// Configured timeout
        seconds: u64,
    },

    /// The render tool ran but exited unsuccessfully.
    #[error("{program} failed for {dir}: {stderr}")]
    RenderFailed {
        /// Program name from the render configuration
        program: String,
        /// Directory being rendered
        dir: String,
        /// Captured standard error
        stderr: String,
    },

    /// No kustomization file is reachable from a directory.
    #[error("no kustomization file found in {dir}")]
    KustomizationNotFound {
        /// Directory that was searched
        dir: String,
    },

    /// A kustomization file exists but is not valid YAML.
    #[error("parsing {path}: {reason}")]
    KustomizationParse {
        /// Kustomization file path
        path: String,
        /// Parser message
        reason: String,
    },

    /// A rendered generator manifest could not be decoded.
    #[error("parsing generator manifest {manifest}: {reason}")]
    ManifestParse {
        /// Name or position of the offending manifest
        manifest: String,
        /// Parser message
        reason: String,
    },

    /// Git command execution failed.
    #[error("git operation failed: {operation}")]
    GitCommandError {
        /// The git subcommand that failed
        operation: String,
        /// Captured standard error
        stderr: String,
    },

    /// Git is not installed or not found in PATH.
    #[error("git is not installed or not found in PATH")]
    GitNotFound,

    /// Configuration file problems.
    #[error("configuration error: {message}")]
    ConfigError {
        /// What is wrong with the configuration
        message: String,
    },

    /// Standard I/O errors.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML decoding errors.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML decoding errors.
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Catch-all for errors that carry only a message.
    #[error("{message}")]
    Other {
        /// Error text
        message: String,
    },
}

impl ImpactError {
    /// Returns true for the errors the engine recovers from locally.
    ///
    /// A missing kustomization falls back to prefix matching and a single
    /// component render failure is recorded on that component; neither
    /// aborts a detection or diff run.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::KustomizationNotFound { .. }
                | Self::ComponentRender { .. }
                | Self::ComponentMissing { .. }
        )
    }
}

/// Error wrapper carrying user-facing details and a suggestion.
///
/// When displayed, errors show the main message in red, details in yellow and
/// the suggestion in green.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: ImpactError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: ImpactError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions where the
/// failure is one we recognise.
///
/// The full `anyhow` context chain is appended to the details so the overlay
/// or component that triggered the failure is visible.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(impact_error) = error.downcast_ref::<ImpactError>() {
        let inner = impact_error.to_string();
        let trail: Vec<String> =
            error.chain().map(ToString::to_string).filter(|msg| *msg != inner).collect();
        let ctx = create_error_context(impact_error);
        if trail.is_empty() {
            return ctx;
        }
        let trail = format!("while {}", trail.join(": "));
        let details = match ctx.details.clone() {
            Some(details) => format!("{details}\n{trail}"),
            None => trail,
        };
        return ctx.with_details(details);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::NotFound
    {
        return ErrorContext::new(ImpactError::Other {
            message: error.to_string(),
        })
        .with_suggestion("Check that --repo-root points at the repository checkout");
    }

    let mut message = error.to_string();
    if let Some(chain) = format_chain(&error) {
        message.push_str("\n\n");
        message.push_str(&chain);
    }

    ErrorContext::new(ImpactError::Other {
        message,
    })
}

fn format_chain(error: &anyhow::Error) -> Option<String> {
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if causes.is_empty() {
        return None;
    }

    let mut out = String::from("Caused by:");
    for (i, cause) in causes.iter().enumerate() {
        out.push_str(&format!("\n  {}: {}", i + 1, cause));
    }
    Some(out)
}

fn create_error_context(error: &ImpactError) -> ErrorContext {
    let owned = clone_for_display(error);
    match error {
        ImpactError::UnknownOverlay {
            ..
        } => ErrorContext::new(owned)
            .with_suggestion(
                "Add the overlay to the [overlays] table in gitops-impact.toml with its environment",
            )
            .with_details(
                "Every overlay on either ref must map to an environment so new overlays are never silently ignored",
            ),
        ImpactError::RenderToolNotFound {
            ..
        } => ErrorContext::new(owned).with_suggestion(
            "Install kustomize (https://kubectl.docs.kubernetes.io/installation/kustomize/) or set render.program in gitops-impact.toml",
        ),
        ImpactError::GitNotFound => ErrorContext::new(owned)
            .with_suggestion("Install git from https://git-scm.com/ and ensure it is in your PATH"),
        ImpactError::OverlayRender {
            overlay,
            ..
        } => ErrorContext::new(owned).with_suggestion(format!(
            "Run the render tool on the {overlay} overlay directory to reproduce the failure"
        )),
        ImpactError::ManifestParse {
            ..
        } => ErrorContext::new(owned).with_suggestion(
            "Render the overlay locally with `kustomize build` and check the ApplicationSet documents",
        ),
        ImpactError::GitCommandError {
            stderr,
            ..
        } if !stderr.is_empty() => ErrorContext::new(owned).with_details(stderr.trim().to_string()),
        ImpactError::ConfigError {
            ..
        }
        | ImpactError::TomlError(_) => ErrorContext::new(owned)
            .with_suggestion("Check gitops-impact.toml or the file passed with --config"),
        _ => ErrorContext::new(owned),
    }
}

/// Rebuild an owned copy of an error for display; foreign error sources are
/// flattened into their message.
fn clone_for_display(error: &ImpactError) -> ImpactError {
    match error {
        ImpactError::UnknownOverlay {
            name,
            overlays_dir,
        } => ImpactError::UnknownOverlay {
            name: name.clone(),
            overlays_dir: overlays_dir.clone(),
        },
        ImpactError::OverlayRender {
            overlay,
            git_ref,
            reason,
        } => ImpactError::OverlayRender {
            overlay: overlay.clone(),
            git_ref: git_ref.clone(),
            reason: reason.clone(),
        },
        ImpactError::ComponentRender {
            path,
            git_ref,
            reason,
        } => ImpactError::ComponentRender {
            path: path.clone(),
            git_ref: git_ref.clone(),
            reason: reason.clone(),
        },
        ImpactError::ComponentMissing {
            path,
        } => ImpactError::ComponentMissing {
            path: path.clone(),
        },
        ImpactError::RenderToolNotFound {
            program,
        } => ImpactError::RenderToolNotFound {
            program: program.clone(),
        },
        ImpactError::RenderTimeout {
            path,
            seconds,
        } => ImpactError::RenderTimeout {
            path: path.clone(),
            seconds: *seconds,
        },
        ImpactError::RenderFailed {
            program,
            dir,
            stderr,
        } => ImpactError::RenderFailed {
            program: program.clone(),
            dir: dir.clone(),
            stderr: stderr.clone(),
        },
        ImpactError::KustomizationNotFound {
            dir,
        } => ImpactError::KustomizationNotFound {
            dir: dir.clone(),
        },
        ImpactError::KustomizationParse {
            path,
            reason,
        } => ImpactError::KustomizationParse {
            path: path.clone(),
            reason: reason.clone(),
        },
        ImpactError::ManifestParse {
            manifest,
            reason,
        } => ImpactError::ManifestParse {
            manifest: manifest.clone(),
            reason: reason.clone(),
        },
        ImpactError::GitCommandError {
            operation,
            stderr,
        } => ImpactError::GitCommandError {
            operation: operation.clone(),
            stderr: stderr.clone(),
        },
        ImpactError::GitNotFound => ImpactError::GitNotFound,
        ImpactError::ConfigError {
            message,
        } => ImpactError::ConfigError {
            message: message.clone(),
        },
        other => ImpactError::Other {
            message: other.to_string(),
        },
    }
}
