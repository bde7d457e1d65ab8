//! API key resolution for the model collaborator.
//!
//! The key is treated as an opaque string resolved once, before a run starts.

use std::env;
use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::debug;

/// Load `KEY=VALUE` pairs from a dotenv file without overriding existing variables.
///
/// Returns `false` when the file does not exist.
pub fn load_dotenv(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(path).map_err(|e| anyhow!("load {}: {e}", path.display()))?;
    debug!(path = %path.display(), "loaded dotenv file");
    Ok(true)
}

/// Read the API key from the environment variable `var`.
pub fn resolve_api_key(var: &str) -> Result<String> {
    resolve_api_key_with(var, |name| env::var(name).ok())
}

fn resolve_api_key_with<F>(var: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let key = lookup(var).map(|key| key.trim().to_string()).unwrap_or_default();
    if key.is_empty() {
        return Err(anyhow!("missing API key: set {var} (or add it to .env)"));
    }
    Ok(key)
}
