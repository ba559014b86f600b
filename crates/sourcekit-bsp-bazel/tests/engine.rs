use sourcekit_bsp_bazel::{
    CommandRunner, Error, ExecuteRequest, ExtractionEngine, TargetCache, MACOS_SDK_ROOT,
};
use sourcekit_bsp_process::RunOutput;
use std::{
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tempfile::TempDir;

/// A canned Bazel: replays prepared stdout buffers in order, repeating the
/// last one, and records every invocation.
#[derive(Debug)]
struct FakeBazel {
    responses: Mutex<Vec<Vec<u8>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeBazel {
    fn new(responses: Vec<Vec<u8>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl CommandRunner for FakeBazel {
    fn run(&self, _cwd: &Path, _program: &str, args: &[String]) -> RunOutput {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(args.to_vec());
            calls.len() - 1
        };
        let responses = self.responses.lock().unwrap();
        let stdout = responses
            .get(call_index)
            .or_else(|| responses.last())
            .cloned()
            .unwrap_or_default();
        RunOutput {
            stdout: Some(stdout),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

fn graph_json(extra_argument: Option<&str>, platform: &str) -> Vec<u8> {
    let mut arguments = vec![
        "swiftc",
        "-Xwrapped-swift=worker",
        "-enable-batch-mode",
        "__BAZEL_XCODE_SDKROOT__/usr/include",
        "bazel-out/darwin/bin/x.o",
        "-index-store-path",
        "/tmp/indexstore",
        "Sources/Foo.swift",
    ];
    if let Some(extra) = extra_argument {
        arguments.push(extra);
    }
    serde_json::json!({
        "artifacts": [{ "id": 1, "pathFragmentId": 2 }],
        "depSetOfFiles": [{ "id": 1, "directArtifactIds": [1] }],
        "pathFragments": [
            { "id": 1, "label": "Sources" },
            { "id": 2, "label": "Foo.swift", "parentId": 1 }
        ],
        "actions": [{
            "targetId": 1,
            "arguments": arguments,
            "environmentVariables": [
                { "key": "APPLE_SDK_PLATFORM", "value": platform }
            ],
            "inputDepSetIds": [1]
        }],
        "targets": [{ "id": 1, "label": "//app:Lib" }]
    })
    .to_string()
    .into_bytes()
}

struct Fixture {
    workspace: TempDir,
    cache_dir: TempDir,
    runner: Arc<FakeBazel>,
    engine: ExtractionEngine,
}

fn fixture(responses: Vec<Vec<u8>>) -> Fixture {
    let workspace = TempDir::new().unwrap();
    std::fs::create_dir_all(workspace.path().join("Sources")).unwrap();
    std::fs::write(workspace.path().join("Sources/Foo.swift"), "").unwrap();

    let cache_dir = TempDir::new().unwrap();
    let cache = Arc::new(TargetCache::new(cache_dir.path().join("cache.json")));
    let runner = Arc::new(FakeBazel::new(responses));
    let engine = ExtractionEngine::new(runner.clone(), cache);
    Fixture {
        workspace,
        cache_dir,
        runner,
        engine,
    }
}

fn request(workspace_root: PathBuf) -> ExecuteRequest {
    ExecuteRequest {
        labels: vec!["//app:Lib".to_string()],
        workspace_root,
        execution_root: "/e".to_string(),
        aquery_args: vec!["--config=indexing".to_string()],
    }
}

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn cache_miss_runs_the_pipeline_and_completes_once() {
    let fx = fixture(vec![graph_json(None, "MacOSX")]);
    let (tx, rx) = mpsc::channel();

    fx.engine
        .execute(request(fx.workspace.path().to_path_buf()), move |targets| {
            tx.send(targets).unwrap()
        })
        .unwrap();

    let targets = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(targets.len(), 1);
    let target = &targets[0];
    assert_eq!(target.uri, "bazel:////app:Lib#1");
    assert_eq!(
        target.compiler_arguments,
        vec![
            format!("{MACOS_SDK_ROOT}/usr/include"),
            "/e/bazel-out/darwin/bin/x.o".to_string(),
            "Sources/Foo.swift".to_string(),
        ]
    );
    assert_eq!(
        target.input_files,
        vec![format!(
            "file://{}",
            fx.workspace.path().join("Sources/Foo.swift").display()
        )]
    );

    // The callback was dropped with the engine's reference; no second result.
    assert!(matches!(
        rx.recv_timeout(Duration::from_millis(100)),
        Err(RecvTimeoutError::Disconnected | RecvTimeoutError::Timeout)
    ));

    // The aquery carried the caller-supplied arguments.
    let calls = fx.runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "aquery");
    assert!(calls[0][1].contains(r#"mnemonic("SwiftCompile|ObjcCompile""#));
    assert!(calls[0].contains(&"--output=jsonproto".to_string()));
    assert!(calls[0].contains(&"--config=indexing".to_string()));
}

#[test]
fn simulator_platform_substitutes_the_simulator_sdk() {
    let fx = fixture(vec![graph_json(None, "iPhoneSimulator")]);
    let (tx, rx) = mpsc::channel();

    fx.engine
        .execute(request(fx.workspace.path().to_path_buf()), move |targets| {
            tx.send(targets).unwrap()
        })
        .unwrap();

    let targets = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(targets[0].compiler_arguments[0]
        .starts_with("/Applications/Xcode.app/Contents/Developer/Platforms/iPhoneSimulator"));
}

#[test]
fn cache_hit_with_identical_refresh_completes_once() {
    let fx = fixture(vec![graph_json(None, "MacOSX")]);
    let req = request(fx.workspace.path().to_path_buf());

    let (tx, rx) = mpsc::channel();
    fx.engine
        .execute(req.clone(), move |targets| tx.send(targets).unwrap())
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Second call: served from cache, refreshed in the background with an
    // identical result.
    let (tx2, rx2) = mpsc::channel();
    fx.engine
        .execute(req, move |targets| tx2.send(targets).unwrap())
        .unwrap();

    let cached = rx2.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(cached.len(), 1);

    let runner = fx.runner.clone();
    wait_for(Duration::from_secs(5), || runner.call_count() >= 2);
    // Give the refresh thread time to run its diff after the second aquery.
    std::thread::sleep(Duration::from_millis(300));
    assert!(rx2.try_recv().is_err(), "identical refresh must not re-notify");
}

#[test]
fn cache_hit_with_changed_refresh_completes_twice() {
    let fx = fixture(vec![
        graph_json(None, "MacOSX"),
        graph_json(Some("-DEXTRA"), "MacOSX"),
    ]);
    let req = request(fx.workspace.path().to_path_buf());

    let (tx, rx) = mpsc::channel();
    fx.engine
        .execute(req.clone(), move |targets| tx.send(targets).unwrap())
        .unwrap();
    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!first[0].compiler_arguments.contains(&"-DEXTRA".to_string()));

    let (tx2, rx2) = mpsc::channel();
    fx.engine
        .execute(req, move |targets| tx2.send(targets).unwrap())
        .unwrap();

    let stale = rx2.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(!stale[0].compiler_arguments.contains(&"-DEXTRA".to_string()));

    let refreshed = rx2.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(refreshed[0].compiler_arguments.contains(&"-DEXTRA".to_string()));
}

#[test]
fn empty_label_set_still_queries_and_yields_no_targets() {
    let fx = fixture(vec![b"{}".to_vec()]);
    let (tx, rx) = mpsc::channel();

    let mut req = request(fx.workspace.path().to_path_buf());
    req.labels.clear();
    fx.engine
        .execute(req, move |targets| tx.send(targets).unwrap())
        .unwrap();

    let targets = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(targets.is_empty());

    // The aquery is still issued, with an empty set() expression.
    let calls = fx.runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][1].contains("deps(set())"));
}

#[test]
fn empty_aquery_output_fails_without_touching_the_cache() {
    let fx = fixture(vec![Vec::new()]);
    let cache_path = fx.cache_dir.path().join("cache.json");

    let err = fx
        .engine
        .execute(request(fx.workspace.path().to_path_buf()), |_| {
            panic!("completion must not run for a failed pipeline")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Custom(_)));
    assert!(!cache_path.exists());
}

#[test]
fn refresh_failure_leaves_the_cached_result_authoritative() {
    let fx = fixture(vec![graph_json(None, "MacOSX"), Vec::new()]);
    let req = request(fx.workspace.path().to_path_buf());

    let (tx, rx) = mpsc::channel();
    fx.engine
        .execute(req.clone(), move |targets| tx.send(targets).unwrap())
        .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (tx2, rx2) = mpsc::channel();
    fx.engine
        .execute(req.clone(), move |targets| tx2.send(targets).unwrap())
        .unwrap();
    rx2.recv_timeout(Duration::from_secs(1)).unwrap();

    let runner = fx.runner.clone();
    wait_for(Duration::from_secs(5), || runner.call_count() >= 2);
    std::thread::sleep(Duration::from_millis(300));

    // The failed refresh must not clear the entry: a third call still hits.
    let (tx3, rx3) = mpsc::channel();
    fx.engine
        .execute(req, move |targets| tx3.send(targets).unwrap())
        .unwrap();
    let still_cached = rx3.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(still_cached.len(), 1);
}
