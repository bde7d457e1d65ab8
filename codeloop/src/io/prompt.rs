//! Prompt builder for planner and fixer requests.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, Value, context};
use regex::Regex;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const FIXER_TEMPLATE: &str = include_str!("prompts/fixer.md");

/// Drop order for droppable sections when over budget.
const DROP_ORDER: [&str; 1] = ["stdout"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable|truncatable)\s*-->").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    /// Always kept verbatim.
    Required,
    /// Replaced by an omission note first when over budget.
    Droppable,
    /// Kept, but its body is cut down to its tail when over budget.
    Truncatable,
}

/// One marked section of a template source, registered as its own template.
#[derive(Debug, Clone)]
struct SectionSpec {
    key: &'static str,
    kind: SectionKind,
    /// Name of the registered section template, `<template>.<key>`.
    template: String,
}

/// Template engine wrapper around minijinja.
///
/// Section markers are located in the template sources, before any value is
/// substituted, so marker-like text inside a task or program output stays plain text.
struct PromptEngine {
    env: Environment<'static>,
    planner: Vec<SectionSpec>,
    fixer: Vec<SectionSpec>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        let planner = register_sections(&mut env, "planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        let fixer = register_sections(&mut env, "fixer", FIXER_TEMPLATE)
            .expect("fixer template should be valid");
        Self {
            env,
            planner,
            fixer,
        }
    }

    fn render_planner(&self, task: &str) -> Result<Vec<ParsedSection>> {
        self.render_sections(&self.planner, context! { task => task.trim() })
    }

    fn render_fixer(&self, input: &FixerInputs) -> Result<Vec<ParsedSection>> {
        self.render_sections(
            &self.fixer,
            context! {
                task => input.task.trim(),
                code => input.code,
                stdout => input.stdout,
                stderr => input.stderr,
            },
        )
    }

    fn render_sections(&self, specs: &[SectionSpec], ctx: Value) -> Result<Vec<ParsedSection>> {
        let mut sections = Vec::with_capacity(specs.len());
        for spec in specs {
            let rendered = self.env.get_template(&spec.template)?.render(&ctx)?;
            let content = rendered.trim().to_string();
            if !content.is_empty() || spec.kind == SectionKind::Required {
                sections.push(ParsedSection {
                    key: spec.key,
                    kind: spec.kind,
                    content,
                });
            }
        }
        Ok(sections)
    }
}

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// Split `source` on its section markers and register each body as a template.
///
/// Markers follow format: `<!-- section:KEY required|droppable|truncatable -->`.
/// Text before the first marker is ignored.
fn register_sections(
    env: &mut Environment<'static>,
    name: &str,
    source: &'static str,
) -> Result<Vec<SectionSpec>> {
    let markers: Vec<_> = SECTION_RE.captures_iter(source).collect();
    let mut specs = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(marker), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let kind = match &caps[2] {
            "required" => SectionKind::Required,
            "droppable" => SectionKind::Droppable,
            _ => SectionKind::Truncatable,
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(source.len(), |m| m.start());

        let template = format!("{name}.{}", key.as_str());
        env.add_template_owned(template.clone(), &source[marker.end()..end])?;
        specs.push(SectionSpec {
            key: key.as_str(),
            kind,
            template,
        });
    }

    Ok(specs)
}

/// A rendered section of a prompt.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "task", "stderr").
    key: &'static str,
    kind: SectionKind,
    /// Full section content including its header line.
    content: String,
}

const SECTION_SEPARATOR: &str = "\n\n";

/// Rendered length of `sections`, separators included.
fn total_len(sections: &[ParsedSection]) -> usize {
    let content: usize = sections.iter().map(|s| s.content.len()).sum();
    content + SECTION_SEPARATOR.len() * sections.len().saturating_sub(1)
}

/// Fit sections into `budget` bytes.
///
/// Droppable sections go first (in [`DROP_ORDER`]), reduced to their header and an
/// omission note so the model knows output existed; then truncatable sections keep
/// their header line and the tail of their body, where tracebacks end.
fn apply_budget_to_sections(sections: &mut [ParsedSection], budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        let Some(idx) = sections
            .iter()
            .position(|s| s.key == key && s.kind == SectionKind::Droppable)
        else {
            continue;
        };
        let before_len = sections[idx].content.len();
        let omitted = omission_note(&sections[idx].content);
        if omitted.len() >= before_len {
            continue;
        }
        debug!(
            section = key,
            bytes_dropped = before_len - omitted.len(),
            "dropped section body for budget"
        );
        sections[idx].content = omitted;
    }

    for idx in 0..sections.len() {
        let total = total_len(sections);
        if total <= budget {
            return;
        }
        if sections[idx].kind != SectionKind::Truncatable {
            continue;
        }
        let excess = total - budget;
        let section = &mut sections[idx];
        let before_len = section.content.len();
        section.content = truncate_body_keeping_tail(&section.content, excess);
        debug!(
            section = %section.key,
            before_len,
            after_len = section.content.len(),
            "truncated section for budget"
        );
    }

    if total_len(sections) > budget {
        warn!(
            total = total_len(sections),
            budget, "prompt still over budget after truncation"
        );
    }
}

/// Keep the header line of `content` and state how many body bytes were left out.
fn omission_note(content: &str) -> String {
    let (header, body) = content.split_once('\n').unwrap_or((content, ""));
    format!("{header}\n[omitted {} bytes to fit the prompt budget]", body.len())
}

/// Remove at least `excess` bytes from the body (everything after the first line),
/// keeping the end of the body.
fn truncate_body_keeping_tail(content: &str, excess: usize) -> String {
    let (header, body) = content.split_once('\n').unwrap_or((content, ""));
    let marker = "[truncated]\n";
    let keep = body.len().saturating_sub(excess + marker.len());
    let mut cut = body.len() - keep;
    while cut < body.len() && !body.is_char_boundary(cut) {
        cut += 1;
    }
    format!("{header}\n{marker}{}", &body[cut..])
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// Inputs for a repair request.
#[derive(Debug, Clone)]
pub struct FixerInputs<'a> {
    pub task: &'a str,
    pub code: &'a str,
    pub stdout: &'a str,
    pub stderr: &'a str,
}

/// Builds prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// System instructions shared by every request.
    pub fn system(&self) -> &'static str {
        SYSTEM_PROMPT.trim()
    }

    /// Build the initial planning prompt for `task`.
    pub fn build_planner(&self, task: &str) -> Result<PromptPack> {
        Ok(self.fit(ENGINE.render_planner(task)?))
    }

    /// Build a repair prompt carrying the previous program and its output.
    pub fn build_fixer(&self, input: &FixerInputs<'_>) -> Result<PromptPack> {
        Ok(self.fit(ENGINE.render_fixer(input)?))
    }

    fn fit(&self, mut sections: Vec<ParsedSection>) -> PromptPack {
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to the model.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered prompt content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}
