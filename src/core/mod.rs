//! Core error types for gitops-impact.
//!
//! Every other module reports failures through [`ImpactError`], either
//! directly or wrapped in `anyhow` context. The CLI turns them into an
//! [`ErrorContext`] via [`user_friendly_error`] before printing.

pub mod error;

pub use error::{ErrorContext, ImpactError, user_friendly_error};
