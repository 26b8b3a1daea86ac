//! Path and parallelism helpers
//!
//! - [`paths`] - lexical path normalization and repository-relative paths
//! - [`progress`] - terminal spinners
//! - [`default_parallelism`] - worker-pool size derived from the host

pub mod paths;
pub mod progress;

pub use paths::{is_remote_reference, normalize_path, path_has_prefix, relative_to_root};

use crate::constants::FALLBACK_CORE_COUNT;

/// Number of concurrent jobs to run when no explicit limit is configured.
///
/// Uses the host's available parallelism, falling back to
/// [`FALLBACK_CORE_COUNT`] when it cannot be determined.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(FALLBACK_CORE_COUNT)
}

/// Resolve an optional user limit into a concrete pool size of at least one.
#[must_use]
pub fn effective_parallelism(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(default_parallelism).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parallelism_positive() {
        assert!(default_parallelism() >= 1);
    }

    #[test]
    fn test_effective_parallelism_clamps_zero() {
        assert_eq!(effective_parallelism(Some(0)), 1);
        assert_eq!(effective_parallelism(Some(3)), 3);
        assert_eq!(effective_parallelism(None), default_parallelism());
    }
}
