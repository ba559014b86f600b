use serde_json::Value;
use sourcekit_bsp_bazel::{
    default_cache_path, DefaultCommandRunner, ExtractionEngine, TargetCache,
};
use sourcekit_bsp_server::{
    codec::read_json_message,
    handlers::{handle_notification, handle_request, ServerState},
    outgoing::{Outgoing, WriterOutgoing},
};
use std::io::BufReader;
use std::sync::Arc;

fn main() -> std::io::Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "bazel-sourcekit-bsp {version}\n\nUsage:\n  bazel-sourcekit-bsp [--stdio]\n\n\
             A Build Server Protocol endpoint for Swift/Objective-C Bazel workspaces.\n\
             Speaks JSON-RPC over stdio; configure via buildServer.json at the workspace root.\n",
            version = env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }
    // `--stdio` is accepted for editor-template compatibility; stdio is the
    // only transport anyway.

    // Stdout belongs to the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Arc::new(DefaultCommandRunner);
    let cache = Arc::new(TargetCache::new(default_cache_path()));
    let engine = ExtractionEngine::new(runner.clone(), cache);
    let outgoing = Arc::new(WriterOutgoing::new(std::io::stdout()));
    let mut state = ServerState::new(runner, engine, outgoing.clone());

    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    while let Some(message) = read_json_message(&mut reader)? {
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            // A response from the client, or malformed input. Ignore.
            continue;
        };
        let id = message.get("id").cloned();
        let params = message
            .get("params")
            .cloned()
            .unwrap_or(Value::Null);

        match id {
            None => handle_notification(&mut state, method, params),
            Some(id) => {
                let response = handle_request(&mut state, method, id, params);
                outgoing.send(&response)?;
                if state.fatal {
                    tracing::error!(
                        target = "sourcekit_bsp.server",
                        method,
                        "fatal initialization failure; shutting down"
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
