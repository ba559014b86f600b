use serde::{Deserialize, Serialize};

/// One build target as served to the indexer: the accepted source files and
/// the normalized compiler invocation that covers them.
///
/// Equality and hashing are by value over all fields. Deduplication after the
/// parallel processing phase and the refresh diff in the engine both rely on
/// that, so freshly decoded records compare equal to cached ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BazelTarget {
    pub id: u32,
    /// `bazel://<label>#<id>`.
    pub uri: String,
    /// Canonical Bazel label, e.g. `//app:Lib`.
    pub label: String,
    /// Always `"swift_library"`: the action graph does not carry the rule
    /// class through to this layer.
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `file://` URIs of the sources accepted for this target.
    #[serde(default)]
    pub input_files: Vec<String>,
    #[serde(default)]
    pub compiler_arguments: Vec<String>,
}

impl BazelTarget {
    pub fn uri_for(label: &str, id: u32) -> String {
        format!("bazel://{label}#{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_embeds_label_and_id() {
        assert_eq!(BazelTarget::uri_for("//app:Lib", 7), "bazel:////app:Lib#7");
    }
}
