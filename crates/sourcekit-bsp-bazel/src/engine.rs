//! The extraction engine: cache-aware orchestration of the aquery pipeline.

use crate::{
    aquery::parse_action_graph,
    cache::{cache_key, TargetCache},
    command::CommandRunner,
    error::{Error, Result},
    processor::process_actions,
    target::BazelTarget,
};
use std::{
    collections::HashSet,
    path::PathBuf,
    sync::Arc,
};

/// One extraction request: the top-level labels plus the workspace geometry
/// the pipeline needs to anchor paths.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub labels: Vec<String>,
    pub workspace_root: PathBuf,
    pub execution_root: String,
    pub aquery_args: Vec<String>,
}

/// Cache-backed facade over query → decode → process.
///
/// `execute` always delivers a first result through the completion callback
/// before it returns: either the cached list (followed by a background
/// refresh) or, on a cache miss, a synchronously computed fresh list. When a
/// background refresh produces a list that is not set-equal to what was
/// delivered, the callback fires a second time after the cache write has
/// landed on disk.
#[derive(Clone)]
pub struct ExtractionEngine {
    runner: Arc<dyn CommandRunner>,
    cache: Arc<TargetCache>,
}

impl ExtractionEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, cache: Arc<TargetCache>) -> Self {
        Self { runner, cache }
    }

    pub fn execute(
        &self,
        request: ExecuteRequest,
        completion: impl Fn(Vec<BazelTarget>) + Send + Sync + 'static,
    ) -> Result<()> {
        let completion = Arc::new(completion);
        let key = cache_key(&request.labels);

        if let Some(cached) = self.cache.load(&key) {
            tracing::debug!(
                target = "sourcekit_bsp.engine",
                key = %key,
                targets = cached.len(),
                "serving targets from cache; refreshing in the background"
            );
            completion(cached.clone());

            let engine = self.clone();
            let completion = completion.clone();
            let refresh = std::thread::Builder::new()
                .name("sourcekit-bsp-refresh".to_string())
                .spawn(move || {
                    match engine.fresh_pipeline(&request) {
                        Ok(fresh) => {
                            engine.cache.save(key, fresh.clone());
                            engine.cache.flush();
                            if !set_equal(&fresh, &cached) {
                                tracing::info!(
                                    target = "sourcekit_bsp.engine",
                                    targets = fresh.len(),
                                    "background refresh changed the target list"
                                );
                                completion(fresh);
                            }
                        }
                        Err(err) => {
                            // The stale list stays authoritative.
                            tracing::warn!(
                                target = "sourcekit_bsp.engine",
                                "background refresh failed: {err}"
                            );
                        }
                    }
                });
            if let Err(err) = refresh {
                return Err(Error::Custom(format!(
                    "failed to spawn refresh thread: {err}"
                )));
            }
            return Ok(());
        }

        let fresh = self.fresh_pipeline(&request)?;
        self.cache.save(key, fresh.clone());
        self.cache.flush();
        completion(fresh);
        Ok(())
    }

    fn fresh_pipeline(&self, request: &ExecuteRequest) -> Result<Vec<BazelTarget>> {
        let expression = aquery_expression(&request.labels);
        let mut args = vec![
            "aquery".to_string(),
            expression,
            "--output=jsonproto".to_string(),
        ];
        args.extend(request.aquery_args.iter().cloned());

        tracing::info!(
            target = "sourcekit_bsp.engine",
            labels = %request.labels.join(" "),
            "running bazel aquery"
        );
        let output = self.runner.run(&request.workspace_root, "bazel", &args);

        let Some(stdout) = output.stdout else {
            return Err(Error::Custom(format!(
                "bazel aquery did not start: {}",
                output.stderr
            )));
        };
        if stdout.is_empty() {
            return Err(Error::Custom(format!(
                "bazel aquery produced no output (exit code {}): {}",
                output.exit_code, output.stderr
            )));
        }
        if output.exit_code != 0 {
            tracing::warn!(
                target = "sourcekit_bsp.engine",
                exit_code = output.exit_code,
                "bazel aquery exited nonzero; attempting to decode its output anyway"
            );
        }

        let graph = parse_action_graph(&stdout)?;
        Ok(process_actions(
            &graph,
            &request.workspace_root,
            &request.execution_root,
        ))
    }
}

fn aquery_expression(labels: &[String]) -> String {
    format!(
        r#"mnemonic("SwiftCompile|ObjcCompile", deps(set({})))"#,
        labels.join(" ")
    )
}

fn set_equal(a: &[BazelTarget], b: &[BazelTarget]) -> bool {
    let a: HashSet<&BazelTarget> = a.iter().collect();
    let b: HashSet<&BazelTarget> = b.iter().collect();
    a == b
}
