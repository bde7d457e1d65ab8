//! Test-only collaborators: scripted model replies, scripted sandbox results, and
//! access to a real Python sandbox when one is installed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::ExecutionResult;
use crate::io::model::{ChatRequest, ModelCallError, ModelClient};
use crate::io::sandbox::{DEFAULT_OUTPUT_LIMIT_BYTES, PythonSandbox, Sandbox};

/// One queued model reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(ModelCallError),
}

/// Model client that replays queued replies in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Model that answers each call with the next text in `texts`.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|text| ScriptedReply::Text(text.into()))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(err)) => Err(err.into()),
            None => Err(anyhow!("scripted model has no replies left")),
        }
    }
}

/// Sandbox that returns queued results without spawning anything.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    results: RefCell<VecDeque<ExecutionResult>>,
    programs: RefCell<Vec<(String, Duration)>>,
}

impl ScriptedSandbox {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            programs: RefCell::new(Vec::new()),
        }
    }

    /// Programs executed so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.programs
            .borrow()
            .iter()
            .map(|(program, _)| program.clone())
            .collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.programs
            .borrow()
            .iter()
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, program: &str, timeout: Duration) -> Result<ExecutionResult> {
        self.programs
            .borrow_mut()
            .push((program.to_string(), timeout));
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted sandbox has no results left"))
    }
}

/// Wrap `code` in a plan plus a `python` fence, the way models usually answer.
pub fn fenced(code: &str) -> String {
    format!("Plan: compute it directly.\n\n```python\n{code}\n```\n")
}

pub fn ok_run(stdout: &str) -> ExecutionResult {
    ExecutionResult::completed(stdout.to_string(), String::new(), 0)
}

pub fn failed_run(stderr: &str) -> ExecutionResult {
    ExecutionResult::completed(String::new(), stderr.to_string(), 1)
}

/// Whether a `python3` interpreter is on `PATH`.
pub fn python_available() -> bool {
    python_sandbox().is_some()
}

/// A real sandbox around the local `python3`, or `None` when none is installed.
///
/// Tests that need an interpreter return early on `None`.
pub fn python_sandbox() -> Option<PythonSandbox> {
    static SANDBOX: OnceLock<Option<PythonSandbox>> = OnceLock::new();
    SANDBOX
        .get_or_init(|| PythonSandbox::resolve("python3", DEFAULT_OUTPUT_LIMIT_BYTES).ok())
        .clone()
}
