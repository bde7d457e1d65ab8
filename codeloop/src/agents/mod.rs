//! Model-calling nodes of the repair loop.
//!
//! Each agent renders its prompt, makes exactly one model call through the injected
//! [`ModelClient`], extracts a candidate program, and returns the next state.

use anyhow::Result;

use crate::io::config::ModelConfig;
use crate::io::model::{ChatRequest, ModelClient};

pub mod fixer;
pub mod planner;

/// Send one system + user exchange using the configured model settings.
pub(crate) fn ask<M: ModelClient + ?Sized>(
    model: &M,
    config: &ModelConfig,
    system: &str,
    user: String,
) -> Result<String> {
    let request = ChatRequest {
        system: system.to_string(),
        user,
        model: config.model.clone(),
        temperature: config.temperature,
    };
    model.complete(&request)
}
