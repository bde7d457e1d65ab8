//! Pure routing decision taken after every execution.

use crate::core::types::{ExecutionResult, MAX_ATTEMPTS, Transition};

/// Choose the next transition from the last execution and the attempt counter.
///
/// - success ⇒ `Finish`
/// - failure with the attempt budget spent ⇒ `Finish` (the failure is surfaced)
/// - otherwise ⇒ `Fix`
///
/// A missing execution counts as a failure.
pub fn decide(last_run: Option<&ExecutionResult>, attempts: u32) -> Transition {
    let ok = last_run.is_some_and(|run| run.ok);
    if ok || attempts >= MAX_ATTEMPTS {
        Transition::Finish
    } else {
        Transition::Fix
    }
}
