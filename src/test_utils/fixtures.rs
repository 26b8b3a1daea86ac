//! YAML builders for ApplicationSet test data.

use std::fmt::Write;

/// An ApplicationSet pointing at a fixed `path`.
#[must_use]
pub fn static_app_set(name: &str, path: &str) -> String {
    format!(
        r"apiVersion: argoproj.io/v1alpha1
kind: ApplicationSet
metadata:
  name: {name}
spec:
  generators:
    - clusters: {{}}
  template:
    metadata:
      name: {name}
    spec:
      source:
        path: {path}
        repoURL: https://example.com/repo.git
      destination:
        server: '{{{{server}}}}'
"
    )
}

/// A merge-generator ApplicationSet using the structured
/// `{{values.sourceRoot}}/{{values.environment}}/{{values.clusterDir}}` path.
///
/// `cluster_dir` of `None` omits the key; `Some("")` sets it explicitly empty.
/// Each `(name, override)` element becomes a list element; an empty override
/// omits the `values.clusterDir` key.
#[must_use]
pub fn merge_app_set(
    name: &str,
    source_root: &str,
    environment: &str,
    cluster_dir: Option<&str>,
    elements: &[(&str, &str)],
) -> String {
    let mut values = format!(
        "                sourceRoot: {source_root}\n                environment: {environment}\n"
    );
    if let Some(cluster_dir) = cluster_dir {
        let _ = writeln!(values, "                clusterDir: \"{cluster_dir}\"");
    }

    let mut list = String::new();
    if elements.is_empty() {
        list.push_str("              elements: []\n");
    } else {
        list.push_str("              elements:\n");
        for (element, override_dir) in elements {
            let _ = writeln!(list, "                - nameNormalized: {element}");
            if !override_dir.is_empty() {
                let _ = writeln!(list, "                  values.clusterDir: {override_dir}");
            }
        }
    }

    format!(
        r"apiVersion: argoproj.io/v1alpha1
kind: ApplicationSet
metadata:
  name: {name}
spec:
  generators:
    - merge:
        mergeKeys:
          - nameNormalized
        generators:
          - clusters:
              values:
{values}          - list:
{list}  template:
    metadata:
      name: {name}-{{{{nameNormalized}}}}
    spec:
      source:
        path: '{{{{values.sourceRoot}}}}/{{{{values.environment}}}}/{{{{values.clusterDir}}}}'
        repoURL: https://example.com/repo.git
      destination:
        server: '{{{{server}}}}'
"
    )
}

/// A minimal namespaced ConfigMap manifest.
#[must_use]
pub fn config_map(name: &str, namespace: &str, data: &str) -> String {
    format!(
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\n  namespace: {namespace}\ndata:\n  value: {data}\n"
    )
}
