//! Auto-instrumentation for silent single-expression candidates.
//!
//! Success is judged from captured stdout, so a bare expression such as `2+2` would
//! run cleanly and print nothing. Wrapping it in `print(..)` makes the answer visible.
//! Multi-line programs are left alone; a missing print there is treated as a defect
//! for the fixer.

const OUTPUT_CALL: &str = "print(";
const DECLARATION_PREFIXES: [&str; 4] = ["def ", "class ", "import ", "from "];

/// Return the program to execute for `code`, wrapping a lone expression in `print`.
pub fn instrument(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.contains(OUTPUT_CALL) {
        return code.to_string();
    }

    let mut lines = code.lines().filter(|line| !line.trim().is_empty());
    match (lines.next(), lines.next()) {
        (Some(line), None) if !is_declaration(line) => format!("{OUTPUT_CALL}{line})"),
        _ => code.to_string(),
    }
}

/// Whether `instrument` would rewrite `code`.
pub fn needs_instrumentation(code: &str) -> bool {
    instrument(code) != code.trim()
}

fn is_declaration(line: &str) -> bool {
    DECLARATION_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
}
