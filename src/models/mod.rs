//! Shared data models for impact detection.
//!
//! These types flow between the template extractor, the detector and the
//! render-diff engine:
//!
//! - [`Environment`] - the closed set of deployment environments
//! - [`ComponentPath`] - one deployment target recovered from an ApplicationSet
//! - [`DetectionResult`] - affected environments and clusters for a changeset
//! - [`LabelSet`] - the `environment/<name>` / `cluster/<name>` projection of a result

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core::ImpactError;

/// Label prefix for affected environments.
pub const ENVIRONMENT_LABEL_PREFIX: &str = "environment/";

/// Label prefix for affected clusters.
pub const CLUSTER_LABEL_PREFIX: &str = "cluster/";

/// Deployment environment an overlay belongs to.
///
/// Ordering follows promotion order (development, staging, production) and is
/// the ordering used when sorting output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development clusters
    Development,
    /// Staging clusters
    Staging,
    /// Production clusters
    Production,
}

impl Environment {
    /// All environments in promotion order.
    pub const ALL: [Self; 3] = [Self::Development, Self::Staging, Self::Production];

    /// Lowercase name used in labels and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ImpactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(ImpactError::ConfigError {
                message: format!(
                    "unknown environment '{other}': expected development, staging or production"
                ),
            }),
        }
    }
}

/// A single deployment target extracted from an ApplicationSet.
///
/// The environment is not stored here; it comes from the overlay that
/// produced the ApplicationSet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentPath {
    /// Directory the ApplicationSet points at, relative to the repository root.
    pub path: String,
    /// Set when the target is a specific cluster subdirectory (e.g. `stone-prod-p01`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_dir: Option<String>,
}

impl ComponentPath {
    /// A path with no cluster binding.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cluster_dir: None,
        }
    }

    /// A path bound to one cluster directory.
    pub fn with_cluster(path: impl Into<String>, cluster_dir: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            cluster_dir: Some(cluster_dir.into()),
        }
    }
}

/// Output of one detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Environments the changeset affects.
    pub affected_environments: BTreeSet<Environment>,
    /// Cluster names the changeset affects.
    pub affected_clusters: BTreeSet<String>,
    /// The changed files the result was computed from, in input order.
    pub changed_files: Vec<String>,
}

impl DetectionResult {
    /// An empty result echoing the given changed files.
    #[must_use]
    pub fn new(changed_files: Vec<String>) -> Self {
        Self {
            affected_environments: BTreeSet::new(),
            affected_clusters: BTreeSet::new(),
            changed_files,
        }
    }

    /// Whether the given environment is affected.
    #[must_use]
    pub fn affects(&self, env: Environment) -> bool {
        self.affected_environments.contains(&env)
    }

    /// Project the result into sorted label names.
    #[must_use]
    pub fn labels(&self) -> LabelSet {
        let mut environments: Vec<String> = self
            .affected_environments
            .iter()
            .map(|env| format!("{ENVIRONMENT_LABEL_PREFIX}{env}"))
            .collect();
        let mut clusters: Vec<String> = self
            .affected_clusters
            .iter()
            .map(|cluster| format!("{CLUSTER_LABEL_PREFIX}{cluster}"))
            .collect();
        environments.sort();
        clusters.sort();
        LabelSet {
            environments,
            clusters,
        }
    }
}

/// Labels derived from a [`DetectionResult`], split by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    /// e.g. `["environment/development", "environment/production"]`
    pub environments: Vec<String>,
    /// e.g. `["cluster/kflux-ocp-p01"]`
    pub clusters: Vec<String>,
}

impl LabelSet {
    /// Every label (environments and clusters) in sorted order.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> =
            self.environments.iter().chain(self.clusters.iter()).cloned().collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_roundtrip_names() {
        for env in Environment::ALL {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
        assert!("preview".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_ordering_is_promotion_order() {
        assert!(Environment::Development < Environment::Staging);
        assert!(Environment::Staging < Environment::Production);
    }

    #[test]
    fn test_result_labels() {
        let mut result = DetectionResult::new(vec!["a.yaml".to_string()]);
        result.affected_environments.insert(Environment::Production);
        result.affected_environments.insert(Environment::Development);
        result.affected_clusters.insert("stone-prod-p01".to_string());
        result.affected_clusters.insert("kflux-ocp-p01".to_string());

        let labels = result.labels();
        assert_eq!(labels.environments, vec!["environment/development", "environment/production"]);
        assert_eq!(labels.clusters, vec!["cluster/kflux-ocp-p01", "cluster/stone-prod-p01"]);
        assert_eq!(
            labels.all(),
            vec![
                "cluster/kflux-ocp-p01",
                "cluster/stone-prod-p01",
                "environment/development",
                "environment/production",
            ]
        );
    }

    #[test]
    fn test_empty_result_has_no_labels() {
        let labels = DetectionResult::default().labels();
        assert!(labels.environments.is_empty());
        assert!(labels.clusters.is_empty());
        assert!(labels.all().is_empty());
    }

    #[test]
    fn test_environment_serializes_lowercase() {
        let json = serde_json::to_string(&Environment::Staging).unwrap();
        assert_eq!(json, "\"staging\"");
    }
}
