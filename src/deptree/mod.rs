//! Offline kustomize dependency walker.
//!
//! Given a directory, [`Resolver::resolve`] returns every local file that can
//! influence its `kustomize build` output, without running kustomize. The walk
//! is a depth-first traversal over kustomization files:
//!
//! - `resources` entries that are directories are walked, files are recorded,
//!   and remote references are skipped
//! - `components` are walked like directory resources
//! - `patches`, `patchesStrategicMerge` and `patchesJson6902` contribute their
//!   file paths; inline patch bodies are ignored
//! - `configMapGenerator` and `secretGenerator` contribute `files` (with
//!   optional `key=path` syntax), `envs` and `env`
//! - `generators`, `transformers`, `validators`, `configurations`, `crds` and
//!   `openapi` contribute their files directly
//!
//! A directory without a kustomization file falls back to its immediate
//! subdirectories that have one, which covers environment directories whose
//! children are per-cluster overlays. When nothing in reach has a
//! kustomization file the walk fails with
//! [`ImpactError::KustomizationNotFound`], which callers treat as "match by
//! directory prefix instead".
//!
//! All returned paths are repository-root-relative with forward slashes.

use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_KUSTOMIZATION_FILENAMES;
use crate::core::ImpactError;
use crate::utils::{is_remote_reference, normalize_path, relative_to_root};

/// Repository-relative files a kustomize directory depends on.
pub type DependencySet = BTreeSet<String>;

/// Treat an explicit YAML `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The subset of a kustomization file that references other files.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Kustomization {
    #[serde(deserialize_with = "null_as_default")]
    resources: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    components: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    patches: Vec<PatchRef>,
    #[serde(deserialize_with = "null_as_default")]
    patches_strategic_merge: Vec<String>,
    #[serde(rename = "patchesJson6902", deserialize_with = "null_as_default")]
    patches_json6902: Vec<PatchRef>,
    #[serde(deserialize_with = "null_as_default")]
    config_map_generator: Vec<GeneratorArgs>,
    #[serde(deserialize_with = "null_as_default")]
    secret_generator: Vec<GeneratorArgs>,
    #[serde(deserialize_with = "null_as_default")]
    generators: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    transformers: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    validators: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    configurations: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    crds: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    openapi: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatchRef {
    #[serde(deserialize_with = "null_as_default")]
    path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratorArgs {
    #[serde(deserialize_with = "null_as_default")]
    files: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    envs: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    env: String,
}

/// Inline patch bodies are skipped; only file references are dependencies.
fn is_inline_patch(patch: &str) -> bool {
    patch.contains('\n') || patch.starts_with('{') || patch.starts_with('-')
}

/// Dependency walker configured with the recognized kustomization filenames.
#[derive(Debug, Clone)]
pub struct Resolver {
    filenames: Vec<String>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_KUSTOMIZATION_FILENAMES.iter().map(ToString::to_string).collect())
    }
}

impl Resolver {
    /// Create a resolver that tries `filenames` in order in every directory.
    #[must_use]
    pub fn new(filenames: Vec<String>) -> Self {
        Self { filenames }
    }

    /// Walk `dir` (relative to `repo_root`) and collect its dependencies.
    ///
    /// # Errors
    ///
    /// - [`ImpactError::KustomizationNotFound`] when no kustomization file is
    ///   reachable from `dir`
    /// - [`ImpactError::KustomizationParse`] when a reachable kustomization
    ///   file cannot be read or decoded
    /// - [`ImpactError::IoError`] when the repository root cannot be made absolute
    pub fn resolve(&self, repo_root: &Path, dir: &str) -> Result<DependencySet, ImpactError> {
        let root = normalize_path(&std::path::absolute(repo_root)?);
        let start = normalize_path(&root.join(dir));

        let mut walk = Walk {
            resolver: self,
            root,
            visited: HashSet::new(),
            deps: DependencySet::new(),
        };
        walk.visit(&start)?;

        tracing::trace!("Resolved {} dependencies for {}", walk.deps.len(), dir);
        Ok(walk.deps)
    }

    fn has_kustomization(&self, dir: &Path) -> bool {
        self.filenames.iter().any(|name| dir.join(name).exists())
    }

    /// Find and decode the first kustomization file in `dir`.
    fn load(&self, dir: &Path) -> Result<(Kustomization, PathBuf), ImpactError> {
        for name in &self.filenames {
            let path = dir.join(name);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ImpactError::KustomizationParse {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            };
            let kustomization = parse_kustomization(&content).map_err(|e| {
                ImpactError::KustomizationParse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok((kustomization, path));
        }

        Err(ImpactError::KustomizationNotFound {
            dir: dir.display().to_string(),
        })
    }
}

/// Resolve with the default kustomization filenames.
///
/// # Errors
///
/// See [`Resolver::resolve`].
pub fn resolve(repo_root: &Path, dir: &str) -> Result<DependencySet, ImpactError> {
    Resolver::default().resolve(repo_root, dir)
}

fn parse_kustomization(content: &str) -> Result<Kustomization, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Kustomization::default());
    }
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    if value.is_null() {
        return Ok(Kustomization::default());
    }
    serde_yaml::from_value(value)
}

/// State of one resolution.
struct Walk<'a> {
    resolver: &'a Resolver,
    root: PathBuf,
    visited: HashSet<PathBuf>,
    deps: DependencySet,
}

impl Walk<'_> {
    fn visit(&mut self, dir: &Path) -> Result<(), ImpactError> {
        // Cycles are legal; a revisit contributes nothing new.
        if !self.visited.insert(dir.to_path_buf()) {
            return Ok(());
        }

        let (kustomization, file) = match self.resolver.load(dir) {
            Ok(loaded) => loaded,
            Err(err) => return self.visit_children(dir, err),
        };

        self.record(&file);

        for resource in &kustomization.resources {
            if is_remote_reference(resource) {
                continue;
            }
            let path = normalize_path(&dir.join(resource));
            // Missing resources may be generated at build time
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if metadata.is_dir() {
                self.visit(&path)?;
            } else {
                self.record(&path);
            }
        }

        for patch in &kustomization.patches {
            self.add_file(dir, &patch.path);
        }
        for patch in &kustomization.patches_strategic_merge {
            if !is_inline_patch(patch) {
                self.add_file(dir, patch);
            }
        }
        for patch in &kustomization.patches_json6902 {
            self.add_file(dir, &patch.path);
        }

        for component in &kustomization.components {
            if is_remote_reference(component) {
                continue;
            }
            self.visit(&normalize_path(&dir.join(component)))?;
        }

        for generator in kustomization.config_map_generator.iter().chain(&kustomization.secret_generator)
        {
            for source in &generator.files {
                let path = source.split_once('=').map_or(source.as_str(), |(_, path)| path);
                self.add_file(dir, path);
            }
            for env in &generator.envs {
                self.add_file(dir, env);
            }
            self.add_file(dir, &generator.env);
        }

        for plugin in kustomization
            .generators
            .iter()
            .chain(&kustomization.transformers)
            .chain(&kustomization.validators)
        {
            if !is_remote_reference(plugin) {
                self.add_file(dir, plugin);
            }
        }

        for file in kustomization
            .configurations
            .iter()
            .chain(&kustomization.crds)
            .chain(kustomization.openapi.values())
        {
            self.add_file(dir, file);
        }

        Ok(())
    }

    /// Fallback for a directory without its own kustomization file.
    ///
    /// Succeeds if at least one immediate subdirectory with a kustomization
    /// file resolves; otherwise returns `original`.
    fn visit_children(&mut self, dir: &Path, original: ImpactError) -> Result<(), ImpactError> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Err(original);
        };

        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.path())
            .collect();
        children.sort();

        let mut found = false;
        for child in children {
            if !self.resolver.has_kustomization(&child) {
                continue;
            }
            match self.visit(&child) {
                Ok(()) => found = true,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", child.display(), e);
                }
            }
        }

        if found { Ok(()) } else { Err(original) }
    }

    /// Record a file referenced from `dir` without checking it exists.
    fn add_file(&mut self, dir: &Path, reference: &str) {
        if reference.is_empty() {
            return;
        }
        let path = normalize_path(&dir.join(reference));
        self.record(&path);
    }

    fn record(&mut self, path: &Path) {
        // Files outside the repository can never appear in a changeset
        if let Some(rel) = relative_to_root(&self.root, path) {
            self.deps.insert(rel);
        }
    }
}
