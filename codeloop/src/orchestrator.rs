//! Plan → execute → decide → fix state machine for one task.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::agents::fixer::Fixer;
use crate::agents::planner::Planner;
use crate::core::decision::decide;
use crate::core::instrument::{instrument, needs_instrumentation};
use crate::core::types::{AgentState, ExecutionResult, Transition};
use crate::io::config::LoopConfig;
use crate::io::model::ModelClient;
use crate::io::sandbox::Sandbox;

/// Node of the loop currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Executing,
    Deciding,
    Fixing,
    Finished,
}

/// Collaborators and settings shared by every node of a run.
///
/// The model client and sandbox are borrowed, so one client built per process can
/// serve any number of runs.
pub struct RunContext<'a, M: ?Sized, S: ?Sized> {
    model: &'a M,
    sandbox: &'a S,
    planner: Planner,
    fixer: Fixer,
    exec_timeout: Duration,
}

impl<'a, M, S> RunContext<'a, M, S>
where
    M: ModelClient + ?Sized,
    S: Sandbox + ?Sized,
{
    pub fn new(model: &'a M, sandbox: &'a S, config: &LoopConfig) -> Self {
        Self {
            model,
            sandbox,
            planner: Planner::new(config.prompt_budget_bytes, config.model.clone()),
            fixer: Fixer::new(config.prompt_budget_bytes, config.model.clone()),
            exec_timeout: config.exec_timeout(),
        }
    }

    /// Override the per-execution wall-clock budget.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn exec_timeout(&self) -> Duration {
        self.exec_timeout
    }
}

/// Run `task` to completion and return the final state.
pub fn run_task<M, S>(task: &str, ctx: &RunContext<'_, M, S>) -> Result<AgentState>
where
    M: ModelClient + ?Sized,
    S: Sandbox + ?Sized,
{
    run_task_with(task, ctx, |_, _, _| {})
}

/// Run `task`, calling `on_attempt(attempt, program, result)` after every execution.
///
/// At most three candidates are executed. Policy violations, timeouts, and runtime
/// failures are fed back to the fixer; model or sandbox failures abort the run.
#[instrument(skip_all, fields(task_bytes = task.len()))]
pub fn run_task_with<M, S, F>(
    task: &str,
    ctx: &RunContext<'_, M, S>,
    mut on_attempt: F,
) -> Result<AgentState>
where
    M: ModelClient + ?Sized,
    S: Sandbox + ?Sized,
    F: FnMut(u32, &str, &ExecutionResult),
{
    let mut state = AgentState::new(task);
    let mut phase = Phase::Planning;

    loop {
        debug!(phase = ?phase, attempts = state.attempts, "entering phase");
        phase = match phase {
            Phase::Planning => {
                state = ctx.planner.run(ctx.model, state)?;
                Phase::Executing
            }
            Phase::Executing => {
                let candidate = state.code.as_deref().unwrap_or_default();
                if needs_instrumentation(candidate) {
                    debug!("wrapping single expression in print");
                }
                let program = instrument(candidate);
                let result = ctx
                    .sandbox
                    .execute(&program, ctx.exec_timeout)
                    .with_context(|| format!("execute attempt {}", state.attempts))?;
                debug!(
                    attempt = state.attempts,
                    outcome = result.outcome().as_str(),
                    exit_code = result.exit_code,
                    "attempt executed"
                );
                on_attempt(state.attempts, &program, &result);
                state.code = Some(program);
                state.last_run = Some(result);
                Phase::Deciding
            }
            Phase::Deciding => match decide(state.last_run.as_ref(), state.attempts) {
                Transition::Fix => Phase::Fixing,
                Transition::Finish => Phase::Finished,
            },
            Phase::Fixing => {
                state = ctx.fixer.run(ctx.model, state)?;
                Phase::Executing
            }
            Phase::Finished => {
                state.done = true;
                info!(
                    attempts = state.attempts,
                    ok = state.succeeded(),
                    "run finished"
                );
                return Ok(state);
            }
        };
    }
}
