//! Shared deterministic types for the repair loop.
//!
//! These types define stable contracts between the loop components. They do not
//! depend on external state or I/O.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of Planner + Fixer invocations in one run.
pub const MAX_ATTEMPTS: u32 = 3;

/// Exit status reported when the policy filter rejects a candidate.
pub const POLICY_VIOLATION_EXIT: i32 = -1;
/// Exit status reported when the child exceeded its wall-clock budget.
pub const TIMEOUT_EXIT: i32 = -2;
/// Exit status reported when the child exited without a code or signal.
pub const UNKNOWN_EXIT: i32 = -3;

/// Disclaimer attached to every execution result.
pub const SAFE_NOTE: &str = "Execution policy: temporary working directory, time-limited, and blocks some risky imports/calls. This is NOT a hardened sandbox.";

/// Captured outcome of one sandboxed execution.
///
/// Produced only by a sandbox; treated as immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub note: String,
}

impl ExecutionResult {
    /// Result for a candidate that never ran because the policy filter rejected it.
    pub fn policy_violation(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: POLICY_VIOLATION_EXIT,
            note: SAFE_NOTE.to_string(),
        }
    }

    /// Result for a child that was killed after exceeding `timeout`.
    pub fn timed_out(stdout: String, stderr: String, timeout: Duration) -> Self {
        Self {
            ok: false,
            stdout,
            stderr: format!("{stderr}\nTimed out after {}s.", format_secs(timeout)),
            exit_code: TIMEOUT_EXIT,
            note: SAFE_NOTE.to_string(),
        }
    }

    /// Result for a child that ran to completion.
    pub fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            ok: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            note: SAFE_NOTE.to_string(),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self.exit_code {
            0 => Outcome::Success,
            POLICY_VIOLATION_EXIT => Outcome::PolicyViolation,
            TIMEOUT_EXIT => Outcome::TimeoutExceeded,
            _ => Outcome::RuntimeFailure,
        }
    }
}

/// Render a timeout as seconds, without a fraction when it is whole.
pub fn format_secs(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 {
        timeout.as_secs().to_string()
    } else {
        format!("{:.1}", timeout.as_secs_f64())
    }
}

/// Classification of an [`ExecutionResult`].
///
/// All non-success variants are recovered inside the loop and handed to the fixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    PolicyViolation,
    TimeoutExceeded,
    RuntimeFailure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::PolicyViolation => "policy_violation",
            Outcome::TimeoutExceeded => "timeout_exceeded",
            Outcome::RuntimeFailure => "runtime_failure",
        }
    }
}

/// Next control transition chosen after an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Fix,
    Finish,
}

/// State carried through one run of the loop.
///
/// `attempts` only moves forward (once per planner or fixer call) and `done` is set
/// exactly once, by the terminal node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub task: String,
    pub plan: Option<String>,
    pub code: Option<String>,
    pub last_run: Option<ExecutionResult>,
    pub attempts: u32,
    pub done: bool,
}

impl AgentState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            plan: None,
            code: None,
            last_run: None,
            attempts: 0,
            done: false,
        }
    }

    /// Whether the run finished with a successful execution.
    pub fn succeeded(&self) -> bool {
        self.last_run.as_ref().is_some_and(|run| run.ok)
    }
}
