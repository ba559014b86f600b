//! Data model for `bazel aquery --output=jsonproto`.
//!
//! The jsonproto rendering of Bazel's `ActionGraphContainer` is large; only
//! the arrays this engine consumes are modeled. Unknown fields are ignored by
//! serde, which keeps the decoder stable across Bazel releases.

use crate::error::{Error, Result};
use serde::Deserialize;

/// One labeled edge in Bazel's path trie. A file path is reconstructed by
/// joining the labels along the `parent_id` chain; a missing parent denotes a
/// root fragment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathFragment {
    pub id: u32,
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
}

/// One file produced or consumed by an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: u32,
    pub path_fragment_id: u32,
}

/// Bazel's deduplicated, union-friendly file collection: direct artifacts
/// plus references to further dep-sets. The graph is acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepSetOfFiles {
    pub id: u32,
    #[serde(default)]
    pub direct_artifact_ids: Vec<u32>,
    #[serde(default)]
    pub transitive_dep_set_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
}

/// One concrete compile invocation Bazel would perform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub target_id: u32,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub input_dep_set_ids: Vec<u32>,
}

impl Action {
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment_variables
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }
}

/// A configured target as reported by the query, e.g. `//pkg:name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueriedTarget {
    pub id: u32,
    pub label: String,
}

/// The decoded action-graph document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionGraph {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub dep_set_of_files: Vec<DepSetOfFiles>,
    #[serde(default)]
    pub path_fragments: Vec<PathFragment>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub targets: Vec<QueriedTarget>,
}

/// Decode an aquery jsonproto buffer.
///
/// An empty buffer is rejected up front: it means the aquery produced nothing
/// at all (as opposed to a graph with no actions), which callers treat as a
/// failed invocation.
pub fn parse_action_graph(bytes: &[u8]) -> Result<ActionGraph> {
    if bytes.is_empty() {
        return Err(Error::Custom(
            "aquery produced an empty action graph (0 bytes)".to_string(),
        ));
    }
    let text = std::str::from_utf8(bytes)?;
    serde_json::from_str(text).map_err(|err| Error::json(bytes.len(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_the_arrays_the_engine_consumes() {
        let doc = serde_json::json!({
            "artifacts": [{ "id": 1, "pathFragmentId": 3 }],
            "depSetOfFiles": [
                { "id": 1, "directArtifactIds": [1], "transitiveDepSetIds": [2] },
                { "id": 2, "directArtifactIds": [] }
            ],
            "pathFragments": [
                { "id": 1, "label": "Sources" },
                { "id": 3, "label": "Foo.swift", "parentId": 1 }
            ],
            "actions": [{
                "targetId": 7,
                "mnemonic": "SwiftCompile",
                "arguments": ["swiftc", "Sources/Foo.swift"],
                "environmentVariables": [
                    { "key": "APPLE_SDK_PLATFORM", "value": "MacOSX" }
                ],
                "inputDepSetIds": [1]
            }],
            "targets": [{ "id": 7, "label": "//app:Lib", "ruleClassId": 42 }]
        });

        let graph = parse_action_graph(doc.to_string().as_bytes()).unwrap();
        assert_eq!(graph.artifacts.len(), 1);
        assert_eq!(graph.dep_set_of_files.len(), 2);
        assert_eq!(graph.path_fragments[1].parent_id, Some(1));
        assert_eq!(graph.actions[0].env("APPLE_SDK_PLATFORM"), Some("MacOSX"));
        assert_eq!(graph.targets[0].label, "//app:Lib");
    }

    #[test]
    fn empty_buffer_is_an_error() {
        let err = parse_action_graph(b"").unwrap_err();
        assert!(err.to_string().contains("0 bytes"));
    }

    #[test]
    fn non_utf8_output_is_a_bazel_error() {
        let err = parse_action_graph(&[0xff, 0xfe, b'{']).unwrap_err();
        assert!(matches!(err, Error::Bazel(_)));
    }

    #[test]
    fn decode_failure_reports_the_buffer_size() {
        let err = parse_action_graph(b"not json at all").unwrap_err();
        assert!(err.to_string().contains("15 bytes"), "{err}");
    }
}
