//! Helpers for spawning external commands.
//!
//! Bazel can write megabytes of aquery output to stdout. Calling `wait()`
//! before the pipe has been drained deadlocks as soon as the child fills the
//! pipe buffer, so [`run`] drains stdout to EOF first, then waits, then reads
//! stderr.

use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
};

/// Captured output of one external command.
///
/// `stdout` is `None` when the process could not be spawned at all; in that
/// case `stderr` holds the spawn error and `exit_code` is -1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: Option<Vec<u8>>,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    pub fn spawn_failure(message: String) -> Self {
        Self {
            stdout: None,
            stderr: message,
            exit_code: -1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.stdout.is_some()
    }
}

/// Run `program args...` in `cwd` and capture both output streams.
///
/// The program is launched through `/usr/bin/env` so that ordinary `PATH`
/// resolution applies even when the server itself was started with a minimal
/// environment (as editors tend to do).
pub fn run(cwd: &Path, program: &str, args: &[String]) -> RunOutput {
    let mut cmd = Command::new("/usr/bin/env");
    cmd.arg(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return RunOutput::spawn_failure(format!("failed to spawn `{program}`: {err}"));
        }
    };

    let Some(mut stdout) = child.stdout.take() else {
        return RunOutput::spawn_failure(format!("`{program}`: stdout was not captured"));
    };
    let Some(mut stderr) = child.stderr.take() else {
        return RunOutput::spawn_failure(format!("`{program}`: stderr was not captured"));
    };

    // Stdout must hit EOF before wait(); see the module docs.
    let mut stdout_bytes = Vec::new();
    if let Err(err) = stdout.read_to_end(&mut stdout_bytes) {
        return RunOutput::spawn_failure(format!("`{program}`: failed to read stdout: {err}"));
    }

    let status = match child.wait() {
        Ok(status) => status,
        Err(err) => {
            return RunOutput::spawn_failure(format!("`{program}`: failed to wait: {err}"));
        }
    };

    let mut stderr_bytes = Vec::new();
    // Stderr errors are not worth failing the whole invocation for.
    let _ = stderr.read_to_end(&mut stderr_bytes);

    RunOutput {
        stdout: Some(stdout_bytes),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code: status.code().unwrap_or(-1),
    }
}
