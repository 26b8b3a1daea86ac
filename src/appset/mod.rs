//! ApplicationSet template extraction.
//!
//! A rendered overlay is a multi-document YAML stream. Every `ApplicationSet`
//! in it carries a templated `spec.template.spec.source.path` and a list of
//! generators that supply the template values. [`parse_application_sets`]
//! resolves those templates into concrete [`ComponentPath`]s without running
//! ArgoCD, plus a map from cluster name to the cluster-specific paths that were
//! registered for it.
//!
//! Supported generator shapes:
//!
//! - a `clusters` generator whose `values` carry `sourceRoot` and `environment`
//! - a `merge` generator combining such a `clusters` generator with a `list`
//!   generator whose elements carry `nameNormalized` and an optional
//!   `values.clusterDir` override
//!
//! Anything else in a document is skipped without error. Only a document that
//! cannot be decoded at all is reported, as [`ImpactError::ManifestParse`].

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

use crate::constants::APPLICATION_SET_KIND;
use crate::core::ImpactError;
use crate::models::ComponentPath;

/// Placeholder that expands to a list element's normalized cluster name.
const NAME_NORMALIZED: &str = "nameNormalized";

/// Paths and cluster registrations extracted from one overlay render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Every resolved component path, in document order.
    pub paths: Vec<ComponentPath>,
    /// Cluster name to the cluster-specific paths registered for it.
    pub clusters: BTreeMap<String, Vec<String>>,
}

impl ParseResult {
    fn merge(&mut self, other: Self) {
        self.paths.extend(other.paths);
        for (cluster, paths) in other.clusters {
            self.clusters.entry(cluster).or_default().extend(paths);
        }
    }

    fn register(&mut self, cluster: &str, path: String) {
        self.clusters.entry(cluster.to_string()).or_default().push(path);
    }
}

/// Parse a rendered multi-document manifest and extract all ApplicationSet targets.
///
/// Documents of any other kind, and empty documents, are ignored.
///
/// # Errors
///
/// Returns [`ImpactError::ManifestParse`] naming the document when a document
/// is not valid YAML or is not a mapping.
pub fn parse_application_sets(rendered: &[u8]) -> Result<ParseResult, ImpactError> {
    let mut result = ParseResult::default();

    for (index, document) in serde_yaml::Deserializer::from_slice(rendered).enumerate() {
        let doc = Value::deserialize(document).map_err(|e| ImpactError::ManifestParse {
            manifest: format!("document {}", index + 1),
            reason: e.to_string(),
        })?;

        if doc.is_null() {
            continue;
        }
        if !doc.is_mapping() {
            return Err(ImpactError::ManifestParse {
                manifest: format!("document {}", index + 1),
                reason: "expected a mapping at the top level".to_string(),
            });
        }

        if doc.get("kind").and_then(Value::as_str) != Some(APPLICATION_SET_KIND) {
            continue;
        }

        let extracted = extract_from_application_set(&doc);
        tracing::trace!(
            "ApplicationSet {} yielded {} path(s)",
            document_name(&doc),
            extracted.paths.len()
        );
        result.merge(extracted);
    }

    Ok(result)
}

fn document_name(doc: &Value) -> &str {
    doc.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or("unknown")
}

/// Walk a chain of mapping keys, returning `None` at the first miss.
fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |current, key| current.get(*key))
}

fn string_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    lookup(value, keys).and_then(Value::as_str)
}

/// Whether `template` references `{{name}}`, tolerating inner whitespace.
fn references_placeholder(template: &str, name: &str) -> bool {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return false;
        };
        if after[..end].trim() == name {
            return true;
        }
        rest = &after[end + 2..];
    }
    false
}

fn extract_from_application_set(doc: &Value) -> ParseResult {
    let Some(path_template) = string_at(doc, &["spec", "template", "spec", "source", "path"]) else {
        return ParseResult::default();
    };

    let generators = match lookup(doc, &["spec", "generators"]).and_then(Value::as_sequence) {
        Some(generators) if !generators.is_empty() => generators,
        _ => return ParseResult::default(),
    };

    if !path_template.contains("{{") {
        return ParseResult {
            paths: vec![ComponentPath::new(path_template)],
            clusters: BTreeMap::new(),
        };
    }

    let mut result = ParseResult::default();
    for generator in generators {
        if let Some(merge) = generator.get("merge").filter(|v| v.is_mapping()) {
            let children = merge.get("generators").and_then(Value::as_sequence);
            result.merge(resolve_merge(path_template, children.map_or(&[][..], Vec::as_slice)));
        } else if let Some(clusters) = generator.get("clusters").filter(|v| v.is_mapping()) {
            result.paths.extend(resolve_clusters(clusters));
        }
    }
    result
}

/// A `list` generator element.
struct ListElement {
    name_normalized: String,
    cluster_dir: String,
}

/// Template values gathered from the children of a `merge` generator.
#[derive(Default)]
struct MergeValues {
    source_root: String,
    environment: String,
    /// `None` when the key is absent, which is not the same as present-but-empty.
    cluster_dir: Option<String>,
    elements: Vec<ListElement>,
}

impl MergeValues {
    fn collect(children: &[Value]) -> Self {
        let mut values = Self::default();

        for child in children {
            if let Some(clusters) = child.get("clusters").filter(|v| v.is_mapping()) {
                if let Some(source_root) = string_at(clusters, &["values", "sourceRoot"]) {
                    values.source_root = source_root.to_string();
                }
                if let Some(environment) = string_at(clusters, &["values", "environment"]) {
                    values.environment = environment.to_string();
                }
                if let Some(cluster_dir) = string_at(clusters, &["values", "clusterDir"]) {
                    values.cluster_dir = Some(cluster_dir.to_string());
                }
            }

            if let Some(list) = child.get("list").filter(|v| v.is_mapping()) {
                let elements = list.get("elements").and_then(Value::as_sequence);
                for element in elements.into_iter().flatten().filter(|e| e.is_mapping()) {
                    // The override key is the literal dotted name, not a nested path
                    values.elements.push(ListElement {
                        name_normalized: element
                            .get(NAME_NORMALIZED)
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        cluster_dir: element
                            .get("values.clusterDir")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
        }

        values
    }

    fn join(&self, leaf: &str) -> String {
        format!("{}/{}/{}", self.source_root, self.environment, leaf)
    }

    fn base(&self) -> String {
        format!("{}/{}", self.source_root, self.environment)
    }
}

fn resolve_merge(path_template: &str, children: &[Value]) -> ParseResult {
    let values = MergeValues::collect(children);
    let mut result = ParseResult::default();

    if values.source_root.is_empty() {
        return result;
    }

    if references_placeholder(path_template, NAME_NORMALIZED) {
        // Path is keyed by cluster name: the environment directory is a prefix
        // and each list element contributes its own subdirectory.
        result.paths.push(ComponentPath::new(values.join("")));
        for element in &values.elements {
            let dir = if element.cluster_dir.is_empty() {
                element.name_normalized.as_str()
            } else {
                element.cluster_dir.as_str()
            };
            if dir.is_empty() {
                continue;
            }
            let path = values.join(dir);
            result.paths.push(ComponentPath::with_cluster(path.clone(), dir));
            result.register(&element.name_normalized, path);
        }
        return result;
    }

    match values.cluster_dir.as_deref() {
        Some(cluster_dir) if !cluster_dir.is_empty() => {
            result.paths.push(ComponentPath::with_cluster(values.join(cluster_dir), cluster_dir));
        }
        // Explicitly empty and absent both resolve to the environment directory
        _ => result.paths.push(ComponentPath::new(values.base())),
    }

    for element in values.elements.iter().filter(|e| !e.cluster_dir.is_empty()) {
        let path = values.join(&element.cluster_dir);
        result.paths.push(ComponentPath::with_cluster(path.clone(), element.cluster_dir.as_str()));
        if !element.name_normalized.is_empty() {
            result.register(&element.name_normalized, path);
        }
    }

    result
}

fn resolve_clusters(clusters: &Value) -> Option<ComponentPath> {
    let source_root = string_at(clusters, &["values", "sourceRoot"]).unwrap_or_default();
    if source_root.is_empty() {
        return None;
    }
    let environment = string_at(clusters, &["values", "environment"]).unwrap_or_default();
    Some(ComponentPath::new(format!("{source_root}/{environment}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appset(name: &str, generators: &str, path: &str) -> String {
        format!(
            r"apiVersion: argoproj.io/v1alpha1
kind: ApplicationSet
metadata:
  name: {name}
spec:
  generators:
{generators}
  template:
    metadata:
      name: {name}-{{{{nameNormalized}}}}
    spec:
      project: default
      source:
        path: '{path}'
        repoURL: https://github.com/example/infra-deployments.git
        targetRevision: main
      destination:
        server: '{{{{server}}}}'
"
        )
    }

    const STRUCTURED_PATH: &str = "{{values.sourceRoot}}/{{values.environment}}/{{values.clusterDir}}";

    fn merge_generator(cluster_values: &str, elements: &str) -> String {
        format!(
            r"    - merge:
        mergeKeys:
          - nameNormalized
        generators:
          - clusters:
              values:
{cluster_values}
          - list:
              elements: {elements}
"
        )
    }

    #[test]
    fn test_structured_template_with_empty_cluster_dir() {
        let generators = merge_generator(
            "                sourceRoot: components/has\n                environment: staging\n                clusterDir: \"\"",
            "[]",
        );
        let result = parse_application_sets(appset("has", &generators, STRUCTURED_PATH).as_bytes()).unwrap();

        assert_eq!(result.paths, vec![ComponentPath::new("components/has/staging")]);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_structured_template_without_cluster_dir_key() {
        let generators = merge_generator(
            "                sourceRoot: components/has\n                environment: staging",
            "[]",
        );
        let result = parse_application_sets(appset("has", &generators, STRUCTURED_PATH).as_bytes()).unwrap();

        assert_eq!(result.paths, vec![ComponentPath::new("components/has/staging")]);
    }

    #[test]
    fn test_structured_template_with_cluster_dir_value() {
        let generators = merge_generator(
            "                sourceRoot: components/has\n                environment: production\n                clusterDir: stone-prd-rh01",
            "[]",
        );
        let result = parse_application_sets(appset("has", &generators, STRUCTURED_PATH).as_bytes()).unwrap();

        assert_eq!(
            result.paths,
            vec![ComponentPath::with_cluster("components/has/production/stone-prd-rh01", "stone-prd-rh01")]
        );
    }

    #[test]
    fn test_structured_template_with_cluster_overrides() {
        let generators = merge_generator(
            "                sourceRoot: components/smee-client\n                environment: staging\n                clusterDir: \"\"",
            "\n                - nameNormalized: kflux-ocp-p01\n                  values.clusterDir: kflux-ocp-p01\n                - nameNormalized: stone-prod-p01\n                  values.clusterDir: stone-prod-p01\n                - nameNormalized: plain-cluster",
        );
        let result =
            parse_application_sets(appset("smee-client", &generators, STRUCTURED_PATH).as_bytes()).unwrap();

        assert_eq!(
            result.paths,
            vec![
                ComponentPath::new("components/smee-client/staging"),
                ComponentPath::with_cluster("components/smee-client/staging/kflux-ocp-p01", "kflux-ocp-p01"),
                ComponentPath::with_cluster("components/smee-client/staging/stone-prod-p01", "stone-prod-p01"),
            ]
        );
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(
            result.clusters["stone-prod-p01"],
            vec!["components/smee-client/staging/stone-prod-p01".to_string()]
        );
        assert!(!result.clusters.contains_key("plain-cluster"));
    }

    #[test]
    fn test_name_placeholder_template_expands_every_element() {
        let generators = merge_generator(
            "                sourceRoot: components/monitoring\n                environment: production",
            "\n                - nameNormalized: stone-prd-rh01\n                - nameNormalized: kflux-prd-es01\n                  values.clusterDir: es01-override",
        );
        let result = parse_application_sets(
            appset("monitoring", &generators, "{{values.sourceRoot}}/{{values.environment}}/{{nameNormalized}}")
                .as_bytes(),
        )
        .unwrap();

        assert_eq!(
            result.paths,
            vec![
                ComponentPath::new("components/monitoring/production/"),
                ComponentPath::with_cluster("components/monitoring/production/stone-prd-rh01", "stone-prd-rh01"),
                ComponentPath::with_cluster("components/monitoring/production/es01-override", "es01-override"),
            ]
        );
        assert_eq!(
            result.clusters["kflux-prd-es01"],
            vec!["components/monitoring/production/es01-override".to_string()]
        );
        assert_eq!(
            result.clusters["stone-prd-rh01"],
            vec!["components/monitoring/production/stone-prd-rh01".to_string()]
        );
    }

    #[test]
    fn test_name_placeholder_with_spaces() {
        assert!(references_placeholder("a/{{ nameNormalized }}", NAME_NORMALIZED));
        assert!(references_placeholder("{{values.x}}/{{nameNormalized}}", NAME_NORMALIZED));
        assert!(!references_placeholder("{{values.clusterDir}}", NAME_NORMALIZED));
        assert!(!references_placeholder("{{nameNormalized", NAME_NORMALIZED));
    }

    #[test]
    fn test_missing_source_root_yields_nothing() {
        let generators = merge_generator("                environment: staging", "[]");
        let result = parse_application_sets(appset("x", &generators, STRUCTURED_PATH).as_bytes()).unwrap();
        assert!(result.paths.is_empty());
    }

    #[test]
    fn test_static_path() {
        let result = parse_application_sets(
            appset("internal-services", "    - clusters: {}", "components/internal-services").as_bytes(),
        )
        .unwrap();
        assert_eq!(result.paths, vec![ComponentPath::new("components/internal-services")]);
    }

    #[test]
    fn test_static_path_keeps_trailing_slash() {
        let generators = "    - merge:\n        generators:\n          - clusters: {}\n          - list:\n              elements: []";
        let result = parse_application_sets(
            appset("disable-self-provisioning", generators, "configs/disable-self-provisioning/").as_bytes(),
        )
        .unwrap();
        assert_eq!(result.paths, vec![ComponentPath::new("configs/disable-self-provisioning/")]);
    }

    #[test]
    fn test_static_path_without_generators_is_skipped() {
        let result = parse_application_sets(appset("orphan", "    []", "components/orphan").as_bytes()).unwrap();
        assert!(result.paths.is_empty());
    }

    #[test]
    fn test_direct_clusters_generator() {
        let generators = "    - clusters:\n        values:\n          sourceRoot: components/ingress\n          environment: development\n    - clusters:\n        values:\n          environment: development";
        let result = parse_application_sets(
            appset("ingress", generators, "{{values.sourceRoot}}/{{values.environment}}").as_bytes(),
        )
        .unwrap();
        assert_eq!(result.paths, vec![ComponentPath::new("components/ingress/development")]);
    }

    #[test]
    fn test_multiple_documents_and_other_kinds() {
        let generators = merge_generator(
            "                sourceRoot: components/has\n                environment: production\n                clusterDir: \"\"",
            "[]",
        );
        let stream = format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: test\ndata:\n  key: value\n---\n{}---\n---\n{}",
            appset("has", &generators, STRUCTURED_PATH),
            appset("internal-services", "    - clusters: {}", "components/internal-services"),
        );

        let result = parse_application_sets(stream.as_bytes()).unwrap();
        assert_eq!(
            result.paths,
            vec![
                ComponentPath::new("components/has/production"),
                ComponentPath::new("components/internal-services"),
            ]
        );
    }

    #[test]
    fn test_missing_template_fields_are_skipped() {
        let doc = "apiVersion: argoproj.io/v1alpha1\nkind: ApplicationSet\nmetadata:\n  name: broken\nspec:\n  generators:\n    - clusters: {}\n  template:\n    spec: {}\n";
        let result = parse_application_sets(doc.as_bytes()).unwrap();
        assert_eq!(result, ParseResult::default());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_application_sets(b"").unwrap(), ParseResult::default());
    }

    #[test]
    fn test_scalar_document_is_parse_error() {
        let err = parse_application_sets(b"kind: ConfigMap\n---\njust a string\n").unwrap_err();
        match err {
            ImpactError::ManifestParse { manifest, .. } => assert_eq!(manifest, "document 2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = parse_application_sets(b"kind: [unterminated\n").unwrap_err();
        assert!(matches!(err, ImpactError::ManifestParse { .. }));
    }
}
