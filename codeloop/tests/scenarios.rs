//! End-to-end loop scenarios driven by a scripted model.
//!
//! Scenarios that execute code use the real Python sandbox and return early when no
//! `python3` is installed. Policy scenarios use a sandbox whose interpreter does not
//! exist, so any spawn attempt would surface as an error.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use codeloop::core::types::{MAX_ATTEMPTS, Outcome, POLICY_VIOLATION_EXIT, TIMEOUT_EXIT};
use codeloop::io::config::LoopConfig;
use codeloop::io::sandbox::{DEFAULT_EXEC_TIMEOUT, PythonSandbox, Sandbox};
use codeloop::orchestrator::{RunContext, run_task, run_task_with};
use codeloop::test_support::{ScriptedModel, fenced, python_sandbox};

/// Scenario A: a fenced `print(2+2)` succeeds on the first attempt.
#[test]
fn fenced_print_succeeds_first_time() {
    let Some(sandbox) = python_sandbox() else {
        return;
    };
    let model = ScriptedModel::texts([fenced("print(2+2)")]);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default());

    let state = run_task("compute 2+2", &ctx).expect("run");

    assert!(state.done);
    assert_eq!(state.attempts, 1);
    let last_run = state.last_run.expect("last run");
    assert!(last_run.ok, "stderr: {}", last_run.stderr);
    assert_eq!(last_run.stdout, "4\n");
}

/// Scenario B: a bare expression is wrapped in `print` before it runs.
#[test]
fn bare_expression_is_auto_printed() {
    let Some(sandbox) = python_sandbox() else {
        return;
    };
    let model = ScriptedModel::texts(["Plan: add.\n```python\n2+2\n```"]);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default());

    let state = run_task("compute 2+2", &ctx).expect("run");

    assert_eq!(state.code.as_deref(), Some("print(2+2)"));
    assert_eq!(state.last_run.expect("last run").stdout, "4\n");
    assert_eq!(state.attempts, 1);
}

/// Scenario C: a denylisted import is rejected without spawning a process.
#[test]
fn denylisted_import_never_spawns() {
    let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python3"), 1024);
    let model = ScriptedModel::texts([
        fenced("import socket\nprint(socket.gethostname())"),
        fenced("import subprocess\nprint(subprocess.run(['ls']))"),
        fenced("print(open('/etc/passwd').read())"),
    ]);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default());

    let mut outcomes = Vec::new();
    let state = run_task_with("list files", &ctx, |_, _, result| {
        outcomes.push(result.outcome());
    })
    .expect("run");

    assert_eq!(outcomes, vec![Outcome::PolicyViolation; 3]);
    assert_eq!(state.attempts, MAX_ATTEMPTS);
    let last_run = state.last_run.expect("last run");
    assert!(!last_run.ok);
    assert!(last_run.stdout.is_empty());
    assert_eq!(last_run.exit_code, POLICY_VIOLATION_EXIT);
    assert_eq!(
        last_run.stderr,
        r"Blocked by policy (matched pattern: \bopen\s*\()."
    );
    assert!(model.requests()[1].user.contains(r"\bimport\s+socket\b"));
}

/// Scenario D: an infinite loop is killed at the timeout and the fixer recovers.
#[test]
fn infinite_loop_times_out_then_fix_succeeds() {
    let Some(sandbox) = python_sandbox() else {
        return;
    };
    let model = ScriptedModel::texts([
        fenced("while True:\n    pass"),
        "```python\nprint('done')\n```".to_string(),
    ]);
    let timeout = Duration::from_secs(1);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default()).with_exec_timeout(timeout);

    let mut first = None;
    let started = Instant::now();
    let state = run_task_with("loop forever", &ctx, |attempt, _, result| {
        if attempt == 1 {
            first = Some((result.clone(), started.elapsed()));
        }
    })
    .expect("run");

    let (timed_out, elapsed) = first.expect("first attempt");
    assert!(!timed_out.ok);
    assert_eq!(timed_out.exit_code, TIMEOUT_EXIT);
    assert!(timed_out.stderr.contains("1s"));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(3));

    assert!(model.requests()[1].user.contains("Timed out after 1s."));
    assert_eq!(state.attempts, 2);
    assert!(state.succeeded());
}

/// Scenario E: a syntax error is repaired on the second attempt.
#[test]
fn syntax_error_is_repaired() {
    let Some(sandbox) = python_sandbox() else {
        return;
    };
    let model = ScriptedModel::texts([fenced("print(2+)"), fenced("print(2+2)")]);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default());

    let mut outcomes = Vec::new();
    let state = run_task_with("compute 2+2", &ctx, |_, _, result| {
        outcomes.push(result.outcome());
    })
    .expect("run");

    assert_eq!(outcomes, vec![Outcome::RuntimeFailure, Outcome::Success]);
    assert_eq!(state.attempts, 2);
    assert!(state.done);
    assert!(state.last_run.as_ref().is_some_and(|run| run.ok));
    assert!(model.requests()[1].user.contains("SyntaxError"));
}

/// Scenario F: every attempt fails and the loop gives up after three.
#[test]
fn persistent_failure_exhausts_attempts() {
    let Some(sandbox) = python_sandbox() else {
        return;
    };
    let model = ScriptedModel::texts([
        fenced("print(1/0)"),
        fenced("print(undefined_name)"),
        fenced("raise RuntimeError('still broken')"),
    ]);
    let ctx = RunContext::new(&model, &sandbox, &LoopConfig::default());

    let state = run_task("divide", &ctx).expect("run");

    assert_eq!(state.attempts, 3);
    assert!(state.done);
    let last_run = state.last_run.expect("last run");
    assert!(!last_run.ok);
    assert_eq!(last_run.exit_code, 1);
    assert!(last_run.stderr.contains("RuntimeError: still broken"));
    assert_eq!(model.calls(), 3);
}

#[test]
fn sandbox_reports_policy_before_anything_else() {
    let sandbox = PythonSandbox::new(PathBuf::from("/nonexistent/python3"), 1024);
    let result = sandbox
        .execute("import os\nimport socket", DEFAULT_EXEC_TIMEOUT)
        .expect("policy result");
    assert_eq!(result.outcome(), Outcome::PolicyViolation);
    assert!(result.stderr.contains(r"\bimport\s+os\b"));
}
