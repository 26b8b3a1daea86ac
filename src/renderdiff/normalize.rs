//! Canonical ordering for rendered manifest streams.
//!
//! kustomize does not promise a stable resource order across builds. Sorting
//! every document by its identity before diffing keeps reorderings out of the
//! diff.

use serde::Deserialize;
use serde_yaml::Value;

/// Identity of one Kubernetes resource. Missing fields compare as empty.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct ResourceKey {
    api_version: String,
    kind: String,
    namespace: String,
    name: String,
}

impl ResourceKey {
    fn of(doc: &Value) -> Self {
        let metadata = doc.get("metadata");
        Self {
            api_version: scalar(doc.get("apiVersion")),
            kind: scalar(doc.get("kind")),
            namespace: scalar(metadata.and_then(|m| m.get("namespace"))),
            name: scalar(metadata.and_then(|m| m.get("name"))),
        }
    }
}

fn scalar(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Sort a multi-document manifest stream by (apiVersion, kind, namespace, name).
///
/// The sort is stable. Streams with at most one document, and streams that
/// fail to parse or re-serialize, are returned unchanged. Applying it twice
/// gives the same bytes as applying it once.
#[must_use]
pub fn normalize_manifests(input: &[u8]) -> Vec<u8> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(input) {
        match Value::deserialize(document) {
            Ok(Value::Null) => {}
            Ok(doc) => docs.push((ResourceKey::of(&doc), doc)),
            Err(e) => {
                tracing::debug!(target: "renderdiff", "Not normalizing manifest: {e}");
                return input.to_vec();
            }
        }
    }

    if docs.len() <= 1 {
        return input.to_vec();
    }

    docs.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut out = String::with_capacity(input.len());
    for (i, (_, doc)) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        match serde_yaml::to_string(doc) {
            Ok(text) => out.push_str(&text),
            Err(e) => {
                tracing::debug!(target: "renderdiff", "Not normalizing manifest: {e}");
                return input.to_vec();
            }
        }
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::config_map;

    fn stream(docs: &[String]) -> Vec<u8> {
        docs.join("---\n").into_bytes()
    }

    fn names(normalized: &[u8]) -> Vec<String> {
        serde_yaml::Deserializer::from_slice(normalized)
            .map(|d| {
                let v = Value::deserialize(d).unwrap();
                v["metadata"]["name"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    #[test]
    fn test_sorts_by_identity() {
        let input = stream(&[
            config_map("zeta", "ns-a", "1"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\n  namespace: ns-a\n".to_string(),
            config_map("alpha", "ns-b", "2"),
            config_map("alpha", "ns-a", "3"),
        ]);

        let normalized = normalize_manifests(&input);
        // apps/v1 < v1, then namespace, then name
        assert_eq!(names(&normalized), vec!["app", "alpha", "zeta", "alpha"]);
        let text = String::from_utf8(normalized).unwrap();
        assert!(text.find("value: 3").unwrap() < text.find("value: 2").unwrap());
    }

    #[test]
    fn test_idempotent() {
        let input = stream(&[
            config_map("b", "ns", "x"),
            config_map("a", "ns", "y"),
            "kind: Secret\nmetadata:\n  name: s\n".to_string(),
        ]);
        let once = normalize_manifests(&input);
        let twice = normalize_manifests(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reordering_is_invisible() {
        let a = stream(&[config_map("a", "ns", "1"), config_map("b", "ns", "2")]);
        let b = stream(&[config_map("b", "ns", "2"), config_map("a", "ns", "1")]);
        assert_eq!(normalize_manifests(&a), normalize_manifests(&b));
    }

    #[test]
    fn test_single_document_unchanged() {
        let input = b"apiVersion: v1\nkind: ConfigMap   # keep my comment\n".to_vec();
        assert_eq!(normalize_manifests(&input), input);
    }

    #[test]
    fn test_empty_unchanged() {
        assert!(normalize_manifests(b"").is_empty());
    }

    #[test]
    fn test_parse_failure_unchanged() {
        let input = b"a: 1\n---\nnot: valid: yaml: [}\n".to_vec();
        assert_eq!(normalize_manifests(&input), input);
        assert_eq!(normalize_manifests(&normalize_manifests(&input)), input);
    }

    #[test]
    fn test_stable_for_equal_keys() {
        let input = b"kind: A\nvalue: first\n---\nkind: A\nvalue: second\n".to_vec();
        let text = String::from_utf8(normalize_manifests(&input)).unwrap();
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }
}
