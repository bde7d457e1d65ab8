//! I/O for the repair loop: model transport, sandboxed execution, config, prompts.

pub mod config;
pub mod credentials;
pub mod model;
pub mod process;
pub mod prompt;
pub mod sandbox;
