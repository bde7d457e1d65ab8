//! Candidate program extraction from free-form model output.
//!
//! Two variants exist. The planner prefers a fence labeled with the sandbox language,
//! the fixer takes the first fence unconditionally. Both apply the same tag stripping.

const FENCE: &str = "```";
const BARE_TAGS: [&str; 2] = ["python", "py"];

/// Extract the candidate program, preferring a fence labeled `python`.
///
/// Falls back to the first fenced region when no fence is labeled. Returns an empty
/// string when the text holds no complete fence.
pub fn extract_labeled(text: &str) -> String {
    if !text.contains(FENCE) {
        return String::new();
    }
    let parts: Vec<&str> = text.split(FENCE).collect();

    // Odd segments are fence bodies; the label sits on their first line.
    let labeled = parts
        .iter()
        .skip(1)
        .step_by(2)
        .find(|body| has_language_label(body))
        .copied();

    let code = match labeled {
        Some(code) => code,
        None if parts.len() >= 3 => parts[1],
        None => "",
    };
    strip_language_tag(code.trim())
}

/// Extract the first fenced region without checking its label.
pub fn extract_first(text: &str) -> String {
    let mut parts = text.split(FENCE);
    let _prose = parts.next();
    match parts.next() {
        Some(code) => strip_language_tag(code.trim()),
        None => String::new(),
    }
}

fn has_language_label(body: &str) -> bool {
    body.lines()
        .next()
        .map(|label| BARE_TAGS.contains(&label.trim().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Drop a leading line that is only a language tag (`python`/`py`).
///
/// Naive splitting on fences leaves the tag of "```python" as the first line.
fn strip_language_tag(code: &str) -> String {
    let mut lines = code.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let tag = first.trim().to_lowercase();
    if !BARE_TAGS.contains(&tag.as_str()) {
        return code.to_string();
    }
    let rest: Vec<&str> = lines.map(str::trim_end).collect();
    rest.join("\n").trim_start().to_string()
}
