//! Loop configuration stored in `codeloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::sandbox::{DEFAULT_EXEC_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES};

pub const DEFAULT_CONFIG_PATH: &str = "codeloop.toml";
/// Environment variable that overrides `model.model`.
pub const MODEL_ENV: &str = "OPENROUTER_MODEL";

/// Loop configuration (TOML).
///
/// Missing fields default to the values the loop was tuned with. The attempt budget
/// is fixed and intentionally not configurable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    /// Wall-clock budget for each candidate execution, in seconds.
    pub exec_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Python interpreter used by the sandbox (name on `PATH` or a path).
    pub python: String,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Parent directory for per-execution working directories (system temp dir if unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir_root: Option<PathBuf>,

    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    pub temperature: f32,

    /// HTTP timeout for one model call, in seconds.
    pub request_timeout_secs: u64,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "arcee-ai/trinity-large-preview:free".to_string(),
            temperature: 0.2,
            request_timeout_secs: 120,
            api_key_env: "OPENROUTER_API_KEY".to_string(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT.as_secs(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            python: "python3".to_string(),
            prompt_budget_bytes: 40_000,
            workdir_root: None,
            model: ModelConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exec_timeout_secs == 0 {
            return Err(anyhow!("exec_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be non-empty"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self
            .workdir_root
            .as_deref()
            .is_some_and(|root| root.as_os_str().is_empty())
        {
            return Err(anyhow!("workdir_root must be non-empty when set"));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must be non-empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(anyhow!("model.temperature must be within 0.0..=2.0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.model.api_key_env.trim().is_empty() {
            return Err(anyhow!("model.api_key_env must be non-empty"));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    /// Apply `OPENROUTER_MODEL` when it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_model_override(std::env::var(MODEL_ENV).ok());
    }

    fn apply_model_override(&mut self, model: Option<String>) {
        if let Some(model) = model.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()) {
            self.model.model = model;
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
