//! Compiler-argument normalization.
//!
//! Bazel compile actions carry wrapper-specific tokens (persistent-worker
//! flags, placeholder paths) that the indexer cannot execute directly. The
//! rewriter walks the raw argument vector with an explicit cursor and emits a
//! normalized vector; a rule either drops the current token (sometimes
//! together with its successor) or emits a substituted form of it. The first
//! matching rule wins and the relative order of retained tokens is preserved.

use std::path::Path;

const EXECUTION_ROOT_PLACEHOLDER: &str = "__BAZEL_EXECUTION_ROOT__";
const SDKROOT_PLACEHOLDER: &str = "__BAZEL_XCODE_SDKROOT__";
const DEVELOPER_DIR_PLACEHOLDER: &str = "__BAZEL_XCODE_DEVELOPER_DIR__/";

/// The normalized argument vector plus the path-validation sidecars.
///
/// The sidecars record which path-shaped tokens exist on disk; they are not
/// part of any response yet, but keeping them makes stale-output diagnostics
/// a log statement away.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewrittenArguments {
    pub arguments: Vec<String>,
    pub valid_paths: Vec<String>,
    pub invalid_paths: Vec<String>,
}

/// Normalize one action's argument vector.
///
/// `execution_root` is the absolute path from `bazel info execution_root`;
/// `sdk_root` comes from [`crate::sdk::select_sdk_root`].
pub fn rewrite_arguments(
    raw: &[String],
    execution_root: &str,
    sdk_root: &str,
) -> RewrittenArguments {
    let mut out = RewrittenArguments::default();
    let rewritten_bazel_out = format!("{execution_root}/bazel-out/");
    let rewritten_external = format!("{execution_root}/external/");

    let mut cursor = 0;
    while cursor < raw.len() {
        let token = raw[cursor].as_str();
        let next = raw.get(cursor + 1).map(String::as_str);

        // 1. Wrapper tokens are compile-strategy plumbing, not compiler input.
        if token.contains("-Xwrapped-swift")
            || token.ends_with("worker")
            || token.starts_with("swiftc")
            || token.contains("wrapped_clang")
        {
            cursor += 1;
            continue;
        }

        // 2. Execution-root placeholder. This runs before the bazel-out/
        //    and external/ rules so the absolute path it produces is never
        //    rewritten a second time.
        if token.contains(EXECUTION_ROOT_PLACEHOLDER) {
            out.arguments
                .push(token.replace(EXECUTION_ROOT_PLACEHOLDER, execution_root));
            cursor += 1;
            continue;
        }

        // 3. Batch mode is incompatible with the -index-file mode the indexer
        //    injects.
        if token.contains("-enable-batch-mode") {
            cursor += 1;
            continue;
        }

        // 4. Drop the index-store pair only when the value really is an index
        //    store; a lone -index-store-path with an unrelated value passes
        //    through.
        if token.contains("-index-store-path") && next.is_some_and(|n| n.contains("indexstore")) {
            cursor += 2;
            continue;
        }

        // 5. The const-extraction frontend flags reference a protocol list
        //    file the indexer does not have.
        if token.contains("-Xfrontend")
            && next.is_some_and(|n| {
                n.contains("-const-gather-protocols-file")
                    || n.contains("const_protocols_to_gather.json")
            })
        {
            cursor += 2;
            continue;
        }

        // 6. SDK placeholder.
        if token.contains(SDKROOT_PLACEHOLDER) {
            let substituted = token.replace(SDKROOT_PLACEHOLDER, sdk_root);
            out.record_path(&substituted);
            out.arguments.push(substituted);
            cursor += 1;
            continue;
        }

        // 7. Developer-dir placeholder. The replacement keeps the trailing
        //    slash the placeholder carries.
        if token.contains(DEVELOPER_DIR_PLACEHOLDER) {
            out.arguments
                .push(token.replace(DEVELOPER_DIR_PLACEHOLDER, crate::sdk::XCODE_DEVELOPER_DIR));
            cursor += 1;
            continue;
        }

        // 8. / 9. Anchor output-tree and external-repo paths at the execution
        //    root. Tokens that already carry the rewritten prefix are left
        //    alone, which makes the rewrite idempotent.
        if token.contains("bazel-out/") && !token.contains(&rewritten_bazel_out) {
            let substituted = token.replace("bazel-out/", &rewritten_bazel_out);
            out.record_path(&substituted);
            out.arguments.push(substituted);
            cursor += 1;
            continue;
        }
        if token.contains("external/") && !token.contains(&rewritten_external) {
            let substituted = token.replace("external/", &rewritten_external);
            out.record_path(&substituted);
            out.arguments.push(substituted);
            cursor += 1;
            continue;
        }

        // 10. Everything else passes through unchanged.
        out.record_path(token);
        out.arguments.push(token.to_string());
        cursor += 1;
    }

    out
}

impl RewrittenArguments {
    fn record_path(&mut self, token: &str) {
        let Some(path) = path_portion(token) else {
            return;
        };
        if Path::new(path).exists() {
            self.valid_paths.push(path.to_string());
        } else {
            self.invalid_paths.push(path.to_string());
        }
    }
}

/// A token is path-shaped if it contains a separator and is not a flag;
/// `-I<p>` and `-F<p>` carry their path as a suffix.
fn path_portion(token: &str) -> Option<&str> {
    if let Some(rest) = token.strip_prefix("-I").or_else(|| token.strip_prefix("-F")) {
        if !rest.is_empty() {
            return Some(rest);
        }
        return None;
    }
    if token.contains('/') && !token.starts_with('-') {
        return Some(token);
    }
    None
}
