//! Parallel conversion of compile actions into [`BazelTarget`] records.

use crate::{
    aquery::ActionGraph,
    arguments::rewrite_arguments,
    graph::ActionGraphIndex,
    sdk::select_sdk_root,
    target::BazelTarget,
};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    path::Path,
    sync::Mutex,
};

const SOURCE_EXTENSIONS: [&str; 3] = ["swift", "m", "h"];

#[derive(Debug, Default)]
struct Progress {
    targets: Vec<BazelTarget>,
    completed: usize,
}

/// Process every action in the graph into a deduplicated target list.
///
/// Iterations only share the output vector and the progress counter (both
/// behind one mutex); the graph index and the action list are read-only, so
/// the fan-out needs no further coordination. The order of the returned list
/// is interleaving-dependent; its *set* is not.
pub fn process_actions(
    graph: &ActionGraph,
    workspace_root: &Path,
    execution_root: &str,
) -> Vec<BazelTarget> {
    let index = ActionGraphIndex::new(graph);
    let total = graph.actions.len();
    let progress = Mutex::new(Progress::default());

    graph.actions.par_iter().for_each(|action| {
        let record = convert_action(action, &index, workspace_root, execution_root);

        let mut progress = progress.lock().expect("action processor lock poisoned");
        if let Some(record) = record {
            progress.targets.push(record);
        }
        progress.completed += 1;
        if progress.completed % 10 == 0 || progress.completed == total {
            tracing::info!(
                target = "sourcekit_bsp.processor",
                completed = progress.completed,
                total,
                "processed compile actions"
            );
        }
    });

    let collected = progress.into_inner().expect("action processor lock poisoned");
    dedup_by_value(collected.targets)
}

fn convert_action(
    action: &crate::aquery::Action,
    index: &ActionGraphIndex<'_>,
    workspace_root: &Path,
    execution_root: &str,
) -> Option<BazelTarget> {
    let Some(target) = index.target(action.target_id) else {
        tracing::warn!(
            target = "sourcekit_bsp.processor",
            target_id = action.target_id,
            "action references an unknown target; skipping"
        );
        return None;
    };

    let sdk_root = match select_sdk_root(action) {
        Ok(sdk_root) => sdk_root,
        Err(err) => {
            tracing::warn!(
                target = "sourcekit_bsp.processor",
                label = %target.label,
                "skipping action: {err}"
            );
            return None;
        }
    };

    let input_files = collect_input_files(action, index, workspace_root);
    let rewritten = rewrite_arguments(&action.arguments, execution_root, sdk_root);

    Some(BazelTarget {
        id: target.id,
        uri: BazelTarget::uri_for(&target.label, target.id),
        label: target.label.clone(),
        kind: "swift_library".to_string(),
        tags: Vec::new(),
        input_files,
        compiler_arguments: rewritten.arguments,
    })
}

/// Resolve the action's input dep-sets to `file://` URIs, keeping only
/// sources the indexer cares about that actually exist in the workspace.
fn collect_input_files(
    action: &crate::aquery::Action,
    index: &ActionGraphIndex<'_>,
    workspace_root: &Path,
) -> Vec<String> {
    let mut files = Vec::new();
    for &dep_set_id in &action.input_dep_set_ids {
        for artifact_id in index.dep_set_closure(dep_set_id) {
            let relative = index.artifact_path(artifact_id);
            if relative.is_empty() {
                continue;
            }
            let extension = relative.rsplit('.').next().unwrap_or_default();
            if !SOURCE_EXTENSIONS.contains(&extension) {
                continue;
            }
            let absolute = workspace_root.join(&relative);
            if !absolute.exists() {
                continue;
            }
            files.push(format!("file://{}", absolute.display()));
        }
    }
    files
}

/// Multiple actions for the same target routinely produce byte-identical
/// records; fold them through a value-equality set.
fn dedup_by_value(targets: Vec<BazelTarget>) -> Vec<BazelTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect()
}
