use sourcekit_bsp_process::RunOutput;
use std::path::Path;

/// Seam between the engine and the `bazel` binary so tests can substitute a
/// canned Bazel.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, program: &str, args: &[String]) -> RunOutput;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, cwd: &Path, program: &str, args: &[String]) -> RunOutput {
        sourcekit_bsp_process::run(cwd, program, args)
    }
}
