//! Fixer agent: repair request carrying the previous program and its output.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::extract::extract_first;
use crate::core::types::AgentState;
use crate::io::config::ModelConfig;
use crate::io::model::ModelClient;
use crate::io::prompt::{FixerInputs, PromptBuilder};

use super::ask;

#[derive(Debug, Clone)]
pub struct Fixer {
    prompts: PromptBuilder,
    model: ModelConfig,
}

impl Fixer {
    pub fn new(prompt_budget_bytes: usize, model: ModelConfig) -> Self {
        Self {
            prompts: PromptBuilder::new(prompt_budget_bytes),
            model,
        }
    }

    /// Ask for a corrected program and replace `code` with it.
    ///
    /// The reply's first fence is taken as-is, labeled or not.
    #[instrument(skip_all, fields(attempt = state.attempts + 1))]
    pub fn run<M: ModelClient + ?Sized>(&self, model: &M, state: AgentState) -> Result<AgentState> {
        let (stdout, stderr) = state
            .last_run
            .as_ref()
            .map_or(("", ""), |run| (run.stdout.as_str(), run.stderr.as_str()));
        let inputs = FixerInputs {
            task: &state.task,
            code: state.code.as_deref().unwrap_or_default(),
            stdout,
            stderr,
        };
        let prompt = self.prompts.build_fixer(&inputs)?.render();
        let reply = ask(model, &self.model, self.prompts.system(), prompt)
            .context("fixer model call")?;
        let code = extract_first(&reply);
        debug!(
            reply_bytes = reply.len(),
            code_bytes = code.len(),
            "fixer produced candidate"
        );

        Ok(AgentState {
            code: Some(code),
            attempts: state.attempts + 1,
            ..state
        })
    }
}
