//! BSP method semantics over the extracted target list.

use crate::{config::BuildServerConfig, outgoing::Outgoing};
use serde_json::{json, Value};
use sourcekit_bsp_bazel::{BazelTarget, CommandRunner, ExecuteRequest, ExtractionEngine};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

pub const BSP_VERSION: &str = "2.0.0";

const CODE_INVALID_PARAMS: i64 = -32602;
const CODE_INTERNAL: i64 = -32603;
const CODE_METHOD_NOT_FOUND: i64 = -32601;
const CODE_NOT_INITIALIZED: i64 = -32002;

/// File-change kind `changed` in `buildTarget/didChange`.
const CHANGE_KIND_CHANGED: u32 = 2;

/// Everything `build/initialize` establishes.
#[derive(Debug, Clone)]
struct Workspace {
    root: PathBuf,
    execution_root: String,
    config: BuildServerConfig,
}

pub struct ServerState {
    runner: Arc<dyn CommandRunner>,
    engine: ExtractionEngine,
    outgoing: Arc<dyn Outgoing>,
    workspace: Option<Workspace>,
    /// Single-writer / many-reader cell holding the current target list.
    /// Readers clone the inner `Arc` for a consistent snapshot; the engine's
    /// completion callback installs replacements.
    targets: Arc<RwLock<Arc<Vec<BazelTarget>>>>,
    pub shutdown_requested: bool,
    /// Set when a failure must take the whole server down (initialize).
    pub fatal: bool,
}

impl ServerState {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        engine: ExtractionEngine,
        outgoing: Arc<dyn Outgoing>,
    ) -> Self {
        Self {
            runner,
            engine,
            outgoing,
            workspace: None,
            targets: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            shutdown_requested: false,
            fatal: false,
        }
    }

    fn snapshot(&self) -> Arc<Vec<BazelTarget>> {
        self.targets
            .read()
            .expect("target list lock poisoned")
            .clone()
    }
}

pub fn handle_request(state: &mut ServerState, method: &str, id: Value, params: Value) -> Value {
    match method {
        "build/initialize" => handle_initialize(state, id, params),
        "build/shutdown" => {
            state.shutdown_requested = true;
            response_ok(id, Value::Null)
        }
        "workspace/buildTargets" => handle_build_targets(state, id),
        "buildTarget/sources" => handle_sources(state, id, params),
        "textDocument/sourceKitOptions" => handle_sourcekit_options(state, id, params),
        "textDocument/registerForChanges" => handle_register_for_changes(state, id, params),
        "buildTarget/prepare" => handle_prepare(state, id),
        _ => response_error(id, CODE_METHOD_NOT_FOUND, format!("Method not found: {method}")),
    }
}

pub fn handle_notification(state: &mut ServerState, method: &str, params: Value) {
    match method {
        "build/initialized" => {}
        "build/exit" => {
            std::process::exit(if state.shutdown_requested { 0 } else { 1 });
        }
        "workspace/didChangeWatchedFiles" => handle_watched_files(state, params),
        _ => {
            tracing::debug!(target = "sourcekit_bsp.server", method, "ignoring notification");
        }
    }
}

fn handle_initialize(state: &mut ServerState, id: Value, params: Value) -> Value {
    let Some(root_uri) = params.get("rootUri").and_then(Value::as_str) else {
        return response_error(id, CODE_INVALID_PARAMS, "missing rootUri".to_string());
    };
    let Some(root) = file_uri_to_path(root_uri) else {
        return response_error(
            id,
            CODE_INVALID_PARAMS,
            format!("rootUri is not a file:// URI: {root_uri}"),
        );
    };

    let config = match BuildServerConfig::load_from_workspace(&root) {
        Ok(config) => config,
        Err(err) => return response_error(id, CODE_INVALID_PARAMS, err.to_string()),
    };

    // A workspace whose execution root cannot be determined cannot serve a
    // single request; give up rather than limp along.
    let info = state
        .runner
        .run(&root, "bazel", &["info".to_string(), "execution_root".to_string()]);
    let execution_root = match info.stdout {
        Some(stdout) if info.exit_code == 0 && !stdout.is_empty() => {
            String::from_utf8_lossy(&stdout).trim().to_string()
        }
        _ => {
            state.fatal = true;
            return response_error(
                id,
                CODE_INTERNAL,
                format!("bazel info execution_root failed: {}", info.stderr),
            );
        }
    };

    let index_store_path = format!("{execution_root}/bazel-out/_global_index_store");
    tracing::info!(
        target = "sourcekit_bsp.server",
        root = %root.display(),
        execution_root = %execution_root,
        "initialized workspace"
    );

    let result = json!({
        "displayName": config.display_name(),
        "version": env!("CARGO_PKG_VERSION"),
        "bspVersion": BSP_VERSION,
        "capabilities": {
            "compileProvider": { "languageIds": ["swift"] }
        },
        "data": {
            "indexDatabasePath": config.index_database_path,
            "indexStorePath": index_store_path,
            "outputPathsProvider": false,
            "prepareProvider": true,
            "sourceKitOptionsProvider": true,
            "defaultSettings": config.default_settings.clone().unwrap_or_default(),
        }
    });

    state.workspace = Some(Workspace {
        root,
        execution_root,
        config,
    });
    response_ok(id, result)
}

fn handle_build_targets(state: &mut ServerState, id: Value) -> Value {
    let Some(workspace) = state.workspace.clone() else {
        return not_initialized(id);
    };

    let request = ExecuteRequest {
        labels: workspace.config.targets.clone(),
        workspace_root: workspace.root.clone(),
        execution_root: workspace.execution_root.clone(),
        aquery_args: workspace.config.aquery_args.clone(),
    };

    let slot = state.targets.clone();
    let outgoing = state.outgoing.clone();
    let first = AtomicBool::new(true);
    let first_result: Arc<Mutex<Option<Vec<BazelTarget>>>> = Arc::new(Mutex::new(None));
    let first_result_in = first_result.clone();

    let executed = state.engine.execute(request, move |targets| {
        *slot.write().expect("target list lock poisoned") = Arc::new(targets.clone());
        if first.swap(false, Ordering::SeqCst) {
            *first_result_in.lock().expect("first result lock poisoned") = Some(targets);
        } else {
            // A background refresh changed the list; tell the client to
            // re-query.
            let params = did_change_params(&targets);
            if let Err(err) = outgoing.send_notification("buildTarget/didChange", params) {
                tracing::warn!(
                    target = "sourcekit_bsp.server",
                    "failed to send buildTarget/didChange: {err}"
                );
            }
        }
    });

    if let Err(err) = executed {
        return response_error(id, CODE_INTERNAL, err.to_string());
    }

    let targets = first_result
        .lock()
        .expect("first result lock poisoned")
        .take()
        .unwrap_or_default();
    let targets: Vec<Value> = targets.iter().map(bsp_build_target).collect();
    response_ok(id, json!({ "targets": targets }))
}

fn bsp_build_target(target: &BazelTarget) -> Value {
    json!({
        "id": { "uri": target.uri },
        "displayName": target.label,
        "tags": target.tags,
        "languageIds": ["swift"],
        "dependencies": [],
        "capabilities": {
            "canCompile": true,
            "canTest": target.kind.contains("test"),
            "canRun": target.kind.contains("binary"),
            "canDebug": false
        }
    })
}

fn handle_sources(state: &ServerState, id: Value, params: Value) -> Value {
    if state.workspace.is_none() {
        return not_initialized(id);
    }
    let Some(requested) = params.get("targets").and_then(Value::as_array) else {
        return response_error(id, CODE_INVALID_PARAMS, "missing targets".to_string());
    };

    let snapshot = state.snapshot();
    let mut items = Vec::new();
    for identifier in requested {
        let Some(uri) = identifier.get("uri").and_then(Value::as_str) else {
            continue;
        };
        let Some(target) = snapshot.iter().find(|t| t.uri == uri) else {
            tracing::debug!(target = "sourcekit_bsp.server", uri, "sources: unknown target");
            continue;
        };
        let sources: Vec<Value> = target
            .input_files
            .iter()
            .map(|file| {
                json!({
                    "uri": file,
                    "kind": 1,
                    "generated": false,
                    "dataKind": "sourceKit",
                    "data": {}
                })
            })
            .collect();
        items.push(json!({
            "target": { "uri": uri },
            "sources": sources
        }));
    }
    response_ok(id, json!({ "items": items }))
}

fn handle_sourcekit_options(state: &ServerState, id: Value, params: Value) -> Value {
    let Some(workspace) = state.workspace.as_ref() else {
        return not_initialized(id);
    };
    let Some(target_uri) = params
        .get("target")
        .and_then(|t| t.get("uri"))
        .and_then(Value::as_str)
    else {
        return response_error(id, CODE_INVALID_PARAMS, "missing target.uri".to_string());
    };

    let snapshot = state.snapshot();
    let options = snapshot
        .iter()
        .find(|t| t.uri == target_uri)
        .map(|t| t.compiler_arguments.clone())
        .unwrap_or_else(|| workspace.config.default_settings.clone().unwrap_or_default());

    response_ok(
        id,
        json!({
            "options": options,
            "workingDirectory": workspace.root.display().to_string(),
        }),
    )
}

fn handle_register_for_changes(state: &ServerState, id: Value, params: Value) -> Value {
    let Some(workspace) = state.workspace.as_ref() else {
        return not_initialized(id);
    };
    let Some(uri) = params.get("uri").and_then(Value::as_str) else {
        return response_error(id, CODE_INVALID_PARAMS, "missing uri".to_string());
    };

    let snapshot = state.snapshot();
    let options = snapshot
        .iter()
        .find(|t| t.input_files.iter().any(|f| f == uri))
        .map(|t| t.compiler_arguments.clone())
        .unwrap_or_else(|| workspace.config.default_settings.clone().unwrap_or_default());

    let notification = json!({
        "uri": uri,
        "updatedOptions": {
            "options": options,
            "workingDirectory": workspace.root.display().to_string(),
        }
    });
    if let Err(err) = state
        .outgoing
        .send_notification("build/sourceKitOptionsChanged", notification)
    {
        tracing::warn!(
            target = "sourcekit_bsp.server",
            "failed to send sourceKitOptionsChanged: {err}"
        );
    }
    response_ok(id, Value::Null)
}

fn handle_prepare(state: &ServerState, id: Value) -> Value {
    let Some(workspace) = state.workspace.clone() else {
        return not_initialized(id);
    };

    // Kick the build off and answer right away; build output never reaches
    // the response.
    let runner = state.runner.clone();
    let spawned = std::thread::Builder::new()
        .name("sourcekit-bsp-prepare".to_string())
        .spawn(move || {
            let mut args = vec!["build".to_string()];
            args.extend(workspace.config.targets.iter().cloned());
            args.extend(workspace.config.aquery_args.iter().cloned());
            let output = runner.run(&workspace.root, "bazel", &args);
            if output.success() {
                tracing::info!(target = "sourcekit_bsp.server", "bazel build finished");
            } else {
                tracing::warn!(
                    target = "sourcekit_bsp.server",
                    exit_code = output.exit_code,
                    "bazel build failed: {}",
                    output.stderr
                );
            }
        });
    if let Err(err) = spawned {
        return response_error(id, CODE_INTERNAL, format!("failed to spawn build: {err}"));
    }
    response_ok(id, Value::Null)
}

fn handle_watched_files(state: &ServerState, _params: Value) {
    let snapshot = state.snapshot();
    if snapshot.is_empty() {
        tracing::warn!(
            target = "sourcekit_bsp.server",
            "watched files changed before any target was extracted; nothing to notify"
        );
        return;
    }
    let params = did_change_params(&snapshot);
    if let Err(err) = state
        .outgoing
        .send_notification("buildTarget/didChange", params)
    {
        tracing::warn!(
            target = "sourcekit_bsp.server",
            "failed to send buildTarget/didChange: {err}"
        );
    }
}

fn did_change_params(targets: &[BazelTarget]) -> Value {
    let changes: Vec<Value> = targets
        .iter()
        .map(|target| {
            json!({
                "target": { "uri": target.uri },
                "kind": CHANGE_KIND_CHANGED
            })
        })
        .collect();
    json!({ "changes": changes })
}

fn not_initialized(id: Value) -> Value {
    response_error(id, CODE_NOT_INITIALIZED, "server not initialized".to_string())
}

fn response_ok(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn response_error(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// Minimal `file://` URI to path conversion with percent decoding.
fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let mut decoded = Vec::with_capacity(rest.len());
    let mut bytes = rest.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hex = [bytes.next()?, bytes.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            decoded.push(b);
        }
    }
    let path = String::from_utf8(decoded).ok()?;
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}
