//! Id-keyed view over a decoded action graph: path reconstruction from the
//! fragment trie and dep-set closure computation.

use crate::aquery::{ActionGraph, Artifact, DepSetOfFiles, PathFragment, QueriedTarget};
use std::collections::HashMap;

#[derive(Debug)]
pub struct ActionGraphIndex<'a> {
    fragments: HashMap<u32, &'a PathFragment>,
    artifacts: HashMap<u32, &'a Artifact>,
    dep_sets: HashMap<u32, &'a DepSetOfFiles>,
    targets: HashMap<u32, &'a QueriedTarget>,
}

impl<'a> ActionGraphIndex<'a> {
    pub fn new(graph: &'a ActionGraph) -> Self {
        Self {
            fragments: graph.path_fragments.iter().map(|f| (f.id, f)).collect(),
            artifacts: graph.artifacts.iter().map(|a| (a.id, a)).collect(),
            dep_sets: graph.dep_set_of_files.iter().map(|d| (d.id, d)).collect(),
            targets: graph.targets.iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn target(&self, id: u32) -> Option<&'a QueriedTarget> {
        self.targets.get(&id).copied()
    }

    /// Reconstruct the workspace-relative path for a fragment by walking the
    /// parent chain. An unknown id resolves to the empty string, which keeps
    /// a gap in the trie local to the artifact that references it.
    pub fn resolve_path(&self, fragment_id: u32) -> String {
        let Some(fragment) = self.fragments.get(&fragment_id) else {
            return String::new();
        };
        match fragment.parent_id {
            Some(parent_id) => {
                let parent = self.resolve_path(parent_id);
                if parent.is_empty() {
                    fragment.label.clone()
                } else {
                    format!("{parent}/{}", fragment.label)
                }
            }
            None => fragment.label.clone(),
        }
    }

    /// Path of the artifact with the given id, or empty when unknown.
    pub fn artifact_path(&self, artifact_id: u32) -> String {
        self.artifacts
            .get(&artifact_id)
            .map(|artifact| self.resolve_path(artifact.path_fragment_id))
            .unwrap_or_default()
    }

    /// The transitive closure of artifact ids under a dep-set: directs first,
    /// then each transitive dep-set depth-first. Duplicates are permitted and
    /// not removed at this layer.
    pub fn dep_set_closure(&self, dep_set_id: u32) -> Vec<u32> {
        let mut out = Vec::new();
        self.collect_closure(dep_set_id, &mut out);
        out
    }

    fn collect_closure(&self, dep_set_id: u32, out: &mut Vec<u32>) {
        let Some(dep_set) = self.dep_sets.get(&dep_set_id) else {
            return;
        };
        out.extend_from_slice(&dep_set.direct_artifact_ids);
        for &transitive in &dep_set.transitive_dep_set_ids {
            self.collect_closure(transitive, out);
        }
    }
}
