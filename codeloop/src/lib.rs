//! Bounded plan → execute → repair loop for model-generated Python programs.
//!
//! A task goes to the planner, its candidate program runs in a policy-gated,
//! time-bounded sandbox, and failures are sent back to the fixer until a run
//! succeeds or the attempt budget is spent. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (extraction, instrumentation, policy,
//!   routing decisions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (model transport, child processes,
//!   config, prompt rendering). Behind traits so tests can script them.
//!
//! [`agents`] wrap the model calls and [`orchestrator`] runs the state machine.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
