//! Planner agent: first model request for a task.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::extract::extract_labeled;
use crate::core::types::AgentState;
use crate::io::config::ModelConfig;
use crate::io::model::ModelClient;
use crate::io::prompt::PromptBuilder;

use super::ask;

/// Planner wrapper that owns prompt and model settings.
#[derive(Debug, Clone)]
pub struct Planner {
    prompts: PromptBuilder,
    model: ModelConfig,
}

impl Planner {
    pub fn new(prompt_budget_bytes: usize, model: ModelConfig) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    /// Ask for a plan plus one `python` fence and record both on the state.
    ///
    /// `plan` keeps the full reply; `code` is the labeled-fence candidate, which may be
    /// empty when the reply has no fence.
    #[instrument(skip_all, fields(attempt = state.attempts + 1))]
    pub fn run<M: ModelClient + ?Sized>(&self, model: &M, state: AgentState) -> Result<AgentState> {
        let prompt = self.prompts.build_planner(&state.task)?.render();
        let reply = ask(model, &self.model, self.prompts.system(), prompt)
            .context("planner model call")?;
        let code = extract_labeled(&reply);
        debug!(
            reply_bytes = reply.len(),
            code_bytes = code.len(),
            "planner produced candidate"
        );

        Ok(AgentState {
            plan: Some(reply),
            code: Some(code),
            attempts: state.attempts + 1,
            ..state
        })
    }
}
