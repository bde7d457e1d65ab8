//! Policy-gated, time-bounded execution of candidate programs.
//!
//! The [`Sandbox`] trait decouples the loop from the actual interpreter. Tests use
//! scripted sandboxes that return predetermined results without spawning processes.
//!
//! [`PythonSandbox`] is a best-effort guard, not a security boundary: the denylist is
//! a source lint, and the child runs as the current user with the OS default
//! filesystem and network access.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::policy::check_policy;
use crate::core::types::ExecutionResult;
use crate::io::process::run_command_with_timeout;

/// Default wall-clock budget for one execution.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

const WORKDIR_PREFIX: &str = "agent_exec_";
const SCRIPT_NAME: &str = "main.py";
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Abstraction over candidate execution backends.
pub trait Sandbox {
    /// Execute `program` with a hard wall-clock bound of `timeout`.
    ///
    /// Policy violations, timeouts, and non-zero exits are all reported inside the
    /// returned [`ExecutionResult`]. `Err` is reserved for failures of the sandbox
    /// itself (workspace setup, spawn).
    fn execute(&self, program: &str, timeout: Duration) -> Result<ExecutionResult>;
}

/// Sandbox that runs programs with a Python interpreter in isolated mode (`-I`).
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: PathBuf,
    output_limit_bytes: usize,
    /// Parent for ephemeral working directories; the system temp dir when unset.
    workdir_root: Option<PathBuf>,
}

impl PythonSandbox {
    /// Build a sandbox around an already-resolved interpreter path.
    pub fn new(interpreter: PathBuf, output_limit_bytes: usize) -> Self {
        Self {
            interpreter,
            output_limit_bytes,
            workdir_root: None,
        }
    }

    /// Create ephemeral working directories under `root` instead of the system temp dir.
    pub fn with_workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = Some(root.into());
        self
    }

    /// Resolve `python` (a name on `PATH` or a path) to the real interpreter binary.
    ///
    /// Children run with a cleared environment, so launchers that depend on `PATH`
    /// (version-manager shims, `/usr/bin/env` wrappers) are resolved once up front.
    #[instrument(skip_all, fields(python = python))]
    pub fn resolve(python: &str, output_limit_bytes: usize) -> Result<Self> {
        let launcher =
            which::which(python).with_context(|| format!("find python interpreter {python}"))?;
        let mut query = Command::new(&launcher);
        query
            .arg("-I")
            .arg("-c")
            .arg("import sys; print(sys.executable)");
        let output = run_command_with_timeout(query, RESOLVE_TIMEOUT, 4096)
            .with_context(|| format!("query {}", launcher.display()))?;
        if output.timed_out || !output.status.success() {
            return Err(anyhow!(
                "python interpreter query failed ({}): {}",
                launcher.display(),
                output.stderr_text().trim()
            ));
        }
        let executable = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let interpreter = if executable.is_empty() {
            launcher
        } else {
            PathBuf::from(executable)
        };
        info!(interpreter = %interpreter.display(), "resolved python interpreter");
        Ok(Self::new(interpreter, output_limit_bytes))
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-I")
            .arg(SCRIPT_NAME)
            .current_dir(workdir)
            .env_clear()
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8");
        cmd
    }
}

impl Sandbox for PythonSandbox {
    #[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, program_bytes = program.len()))]
    fn execute(&self, program: &str, timeout: Duration) -> Result<ExecutionResult> {
        if let Err(violation) = check_policy(program) {
            warn!(pattern = violation.pattern, "program blocked by policy");
            return Ok(ExecutionResult::policy_violation(violation.reason()));
        }

        // Removed on drop, so every early return below still cleans up.
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        let workdir = match &self.workdir_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .context("create ephemeral working directory")?;
        let script_path = workdir.path().join(SCRIPT_NAME);
        fs::write(&script_path, program)
            .with_context(|| format!("write {}", script_path.display()))?;

        debug!(workdir = %workdir.path().display(), "executing program");
        let output = run_command_with_timeout(
            self.command(workdir.path()),
            timeout,
            self.output_limit_bytes,
        )
        .context("run python")?;

        let result = if output.timed_out {
            ExecutionResult::timed_out(output.stdout_text(), output.stderr_text(), timeout)
        } else {
            ExecutionResult::completed(
                output.stdout_text(),
                output.stderr_text(),
                output.exit_code(),
            )
        };

        let workdir_path = workdir.path().to_path_buf();
        if let Err(err) = workdir.close() {
            warn!(err = %err, workdir = %workdir_path.display(), "failed to remove working directory");
        }

        debug!(ok = result.ok, exit_code = result.exit_code, "execution finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{POLICY_VIOLATION_EXIT, TIMEOUT_EXIT};
    use crate::test_support::python_sandbox;
    use std::time::Instant;

    #[test]
    fn policy_violation_never_spawns() {
        // The interpreter does not exist, so any spawn attempt would surface as Err.
        let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python"), 1024);
        let result = sandbox
            .execute("import socket\nprint(1)", DEFAULT_EXEC_TIMEOUT)
            .expect("policy result");
        assert!(!result.ok);
        assert!(result.stdout.is_empty());
        assert_eq!(result.exit_code, POLICY_VIOLATION_EXIT);
        assert!(result.stderr.contains(r"\bimport\s+socket\b"));
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python"), 1024);
        let err = sandbox
            .execute("print(1)", DEFAULT_EXEC_TIMEOUT)
            .unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }

    #[test]
    fn working_directory_is_removed_when_spawn_fails() {
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python"), 1024)
            .with_workdir_root(root.path());

        sandbox
            .execute("print(1)", DEFAULT_EXEC_TIMEOUT)
            .unwrap_err();

        let leftovers: Vec<_> = fs::read_dir(root.path()).expect("read root").collect();
        assert!(leftovers.is_empty(), "leftover entries: {leftovers:?}");
    }

    #[test]
    fn missing_workdir_root_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python"), 1024)
            .with_workdir_root(root.path().join("missing"));
        let err = sandbox
            .execute("print(1)", DEFAULT_EXEC_TIMEOUT)
            .unwrap_err();
        assert!(format!("{err:#}").contains("create ephemeral working directory"));
    }

    #[test]
    fn prints_are_captured() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let result = sandbox
            .execute("print(2+2)", DEFAULT_EXEC_TIMEOUT)
            .expect("execute");
        assert!(result.ok, "stderr: {}", result.stderr);
        assert_eq!(result.stdout, "4\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn runtime_errors_report_exit_code_and_stderr() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let result = sandbox
            .execute("print('before')\nraise ValueError('bad')", DEFAULT_EXEC_TIMEOUT)
            .expect("execute");
        assert!(!result.ok);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.contains("ValueError: bad"));
    }

    #[test]
    fn environment_is_minimal() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let program = "import sys\nprint(sys.flags.isolated)\n";
        let result = sandbox.execute(program, DEFAULT_EXEC_TIMEOUT).expect("execute");
        assert_eq!(result.stdout, "1\n");

        // `os` is denylisted, but the environment is still observable through `sys`.
        let program = "import sys\nprint(sys.stdout.encoding)\n";
        let result = sandbox.execute(program, DEFAULT_EXEC_TIMEOUT).expect("execute");
        assert_eq!(result.stdout.trim().to_lowercase(), "utf-8");
    }

    #[test]
    fn infinite_loop_times_out() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let timeout = Duration::from_secs(1);
        let started = Instant::now();
        let result = sandbox
            .execute("print('tick', flush=True)\nwhile True:\n    pass", timeout)
            .expect("execute");
        let elapsed = started.elapsed();

        assert!(!result.ok);
        assert_eq!(result.exit_code, TIMEOUT_EXIT);
        assert!(result.stderr.contains("Timed out after 1s."));
        assert_eq!(result.stdout, "tick\n");
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(3));
    }

    #[test]
    fn timeout_covers_processes_started_by_the_program() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let program = "\
import multiprocessing
import time

def main():
    worker = multiprocessing.Process(target=time.sleep, args=(12,))
    worker.start()
    print('started', flush=True)
    worker.join()

if __name__ == '__main__':
    main()
";
        let timeout = Duration::from_secs(1);
        let started = Instant::now();
        let result = sandbox.execute(program, timeout).expect("execute");
        let elapsed = started.elapsed();

        assert_eq!(result.exit_code, TIMEOUT_EXIT, "stderr: {}", result.stderr);
        assert!(elapsed >= timeout);
        assert!(
            elapsed < timeout + Duration::from_secs(3),
            "elapsed {elapsed:?}"
        );
    }

    #[test]
    fn working_directory_root_is_honored() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let root = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox.with_workdir_root(root.path());
        let result = sandbox
            .execute("print(__file__)", DEFAULT_EXEC_TIMEOUT)
            .expect("execute");
        assert!(script_dir(&result.stdout).starts_with(root.path()));
        assert_eq!(fs::read_dir(root.path()).expect("read root").count(), 0);
    }

    #[test]
    fn empty_program_is_a_no_op_success() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let result = sandbox.execute("", DEFAULT_EXEC_TIMEOUT).expect("execute");
        assert!(result.ok);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn working_directory_is_removed() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let result = sandbox
            .execute("print(__file__)", DEFAULT_EXEC_TIMEOUT)
            .expect("execute");
        let workdir = script_dir(&result.stdout);
        assert!(
            workdir
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with(WORKDIR_PREFIX)),
            "unexpected script dir {}",
            workdir.display()
        );
        assert!(!workdir.exists());
    }

    #[test]
    fn working_directory_is_removed_after_timeout() {
        let Some(sandbox) = python_sandbox() else {
            return;
        };
        let program = "print(__file__)\nwhile True:\n    pass";
        let result = sandbox
            .execute(program, Duration::from_millis(300))
            .expect("execute");
        assert_eq!(result.exit_code, TIMEOUT_EXIT);
        assert!(!script_dir(&result.stdout).exists());
    }

    fn script_dir(stdout: &str) -> PathBuf {
        let script = PathBuf::from(stdout.trim());
        script.parent().map(Path::to_path_buf).unwrap_or(script)
    }
}
