//! Static denylist applied to candidate programs before execution.
//!
//! This is a cheap lint over source text, not a containment boundary. Indirection or
//! encoding bypasses it trivially; real isolation belongs to a separate layer.

use std::sync::LazyLock;

use regex::Regex;

/// Denylisted patterns, checked in order. The first match is reported.
pub const DENYLIST: [&str; 11] = [
    r"\bimport\s+os\b",
    r"\bimport\s+subprocess\b",
    r"\bimport\s+socket\b",
    r"\bimport\s+requests\b",
    r"\bimport\s+http\b",
    r"\bimport\s+urllib\b",
    r"\bimport\s+pathlib\b",
    r"\bopen\s*\(",
    r"\beval\s*\(",
    r"\bexec\s*\(",
    r"\b__import__\s*\(",
];

static COMPILED: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DENYLIST
        .iter()
        .map(|pattern| (*pattern, Regex::new(pattern).unwrap()))
        .collect()
});

/// A denylisted construct found in a candidate program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// The pattern that matched, verbatim from [`DENYLIST`].
    pub pattern: &'static str,
}

impl PolicyViolation {
    /// Human-readable reason reported as the execution's stderr.
    pub fn reason(&self) -> String {
        format!("Blocked by policy (matched pattern: {}).", self.pattern)
    }
}

/// Check `code` against the denylist.
pub fn check_policy(code: &str) -> Result<(), PolicyViolation> {
    match COMPILED.iter().find(|(_, re)| re.is_match(code)) {
        Some((pattern, _)) => Err(PolicyViolation { pattern: *pattern }),
        None => Ok(()),
    }
}
