//! Stable exit codes for codeloop CLI commands.

/// The run finished with a successful execution.
pub const OK: i32 = 0;
/// Invalid config or arguments, missing credentials, or a model/sandbox failure.
pub const INVALID: i32 = 1;
/// The run finished, but the last execution failed (attempt budget spent).
pub const UNSOLVED: i32 = 2;
