//! Prompt templates for drafting and refinement.
//!
//! A [`PromptSet`] holds three templates: the reviewer persona sent as the
//! system message, the drafting prompt, and the refinement prompt. Templates
//! may use these placeholders:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{language}` | Output language |
//! | `{problem_statement}` | The task text |
//! | `{document_content}` | Current document as markdown (refinement only) |
//! | `{section_titles}` | Canonical titles, one `## Title` per line |
//!
//! Unknown `{...}` sequences are left alone, so templates can embed JSON
//! examples without escaping.

use crate::api::CompletionRequest;
use std::path::Path;
use tracing::{debug, info};

pub const SYSTEM_PROMPT_FILE: &str = "system_expert_prompt.txt";
pub const DRAFTING_PROMPT_FILE: &str = "initial_synthesis_prompt.txt";
pub const REFINEMENT_PROMPT_FILE: &str = "iterative_refinement_prompt.txt";

const DEFAULT_SYSTEM: &str = "\
You are a meticulous domain expert and peer reviewer. You write rigorous, \
well-structured technical documents and you critique drafts honestly: every \
claim must be justified, every step must follow, and nothing essential may \
be left out.";

const DEFAULT_DRAFTING: &str = "\
Write a complete first draft of a document that addresses the problem below.
Write in {language}.

Use exactly these sections, in this order, each introduced by a level-two \
markdown heading:
{section_titles}

Do not add other level-two headings.

Problem statement:
{problem_statement}";

const DEFAULT_REFINEMENT: &str = "\
Review the document below against the problem it is meant to solve.

Problem statement:
{problem_statement}

Current document:
{document_content}

Respond with a single JSON object and nothing else, with these fields:
- \"final_verdict\": one of SIGNIFICANT_IMPROVEMENTS_REQUIRED, \
MINOR_IMPROVEMENTS_SUGGESTED, NO_FURTHER_IMPROVEMENTS_NEEDED.
- \"summary_of_findings\": a list of objects with \"location\" (a section \
title), \"issue\", and \"classification\" (\"Critical Flaw\" or \
\"Justification Gap\").
- \"refined_sections\": a list of objects with \"section_title\" and the full \
rewritten \"content\" for every section you changed. Use only these titles:
{section_titles}

Write all prose in {language}. If the document needs no further work, \
return NO_FURTHER_IMPROVEMENTS_NEEDED with an empty refined_sections list.";

/// Values substituted into the templates.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub problem_statement: String,
    pub language: String,
}

impl PromptContext {
    pub fn new(problem_statement: impl Into<String>) -> Self {
        Self {
            problem_statement: problem_statement.into(),
            language: "English".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// The three templates used during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub system: String,
    pub drafting: String,
    pub refinement: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM.to_string(),
            drafting: DEFAULT_DRAFTING.to_string(),
            refinement: DEFAULT_REFINEMENT.to_string(),
        }
    }
}

impl PromptSet {
    /// Load templates from `dir`. Missing files fall back to the built-in
    /// templates; unreadable files are an error.
    pub fn load_dir(dir: &Path) -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            system: read_or(dir, SYSTEM_PROMPT_FILE, defaults.system)?,
            drafting: read_or(dir, DRAFTING_PROMPT_FILE, defaults.drafting)?,
            refinement: read_or(dir, REFINEMENT_PROMPT_FILE, defaults.refinement)?,
        })
    }

    /// Free-form request for the initial draft.
    pub fn drafting_request(&self, ctx: &PromptContext, titles: &[String]) -> CompletionRequest {
        let prompt = render(&self.drafting, ctx, titles, None);
        CompletionRequest::free_form(self.system.clone(), prompt)
    }

    /// Structured-only request for one refinement plan.
    pub fn refinement_request(
        &self,
        ctx: &PromptContext,
        titles: &[String],
        document_markdown: &str,
    ) -> CompletionRequest {
        let prompt = render(&self.refinement, ctx, titles, Some(document_markdown));
        CompletionRequest::structured(self.system.clone(), prompt)
    }
}

fn read_or(dir: &Path, name: &str, fallback: String) -> Result<String, String> {
    let path = dir.join(name);
    if !path.exists() {
        debug!("Prompt {} not found, using built-in", path.display());
        return Ok(fallback);
    }
    info!("Loaded prompt {}", path.display());
    std::fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {e}", path.display()))
}

/// Substitute the known placeholders into `template`.
pub fn render(
    template: &str,
    ctx: &PromptContext,
    titles: &[String],
    document_content: Option<&str>,
) -> String {
    let title_list = titles
        .iter()
        .map(|t| format!("## {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    let values: [(&str, Option<&str>); 4] = [
        ("language}", Some(ctx.language.as_str())),
        ("section_titles}", Some(title_list.as_str())),
        ("document_content}", document_content),
        ("problem_statement}", Some(ctx.problem_statement.as_str())),
    ];

    // Single pass: substituted text is never rescanned for placeholders.
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        let hit = values
            .iter()
            .find_map(|(key, value)| value.zip(after.strip_prefix(*key)));
        match hit {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResponseMode;

    fn titles() -> Vec<String> {
        vec!["Title".into(), "Conclusion".into()]
    }

    #[test]
    fn render_fills_known_placeholders() {
        let ctx = PromptContext::new("Prove P != NP.").with_language("Spanish");
        let out = render(
            "{language} | {problem_statement} | {section_titles} | {document_content} | {\"a\": 1}",
            &ctx,
            &titles(),
            Some("## Title\nX\n"),
        );
        assert_eq!(
            out,
            "Spanish | Prove P != NP. | ## Title\n## Conclusion | ## Title\nX\n | {\"a\": 1}"
        );
    }

    #[test]
    fn problem_text_is_not_expanded() {
        let ctx = PromptContext::new("literal {language} here");
        let out = render("{problem_statement}", &ctx, &titles(), None);
        assert_eq!(out, "literal {language} here");
    }

    #[test]
    fn document_text_is_not_expanded() {
        let ctx = PromptContext::new("Explain widgets.");
        let out = render(
            "{document_content}\n---\n{problem_statement}",
            &ctx,
            &titles(),
            Some("the literal {problem_statement} token"),
        );
        assert_eq!(out, "the literal {problem_statement} token\n---\nExplain widgets.");
    }

    #[test]
    fn unfilled_document_placeholder_is_left_alone() {
        let ctx = PromptContext::new("task");
        let out = render("{document_content} {unknown} {", &ctx, &titles(), None);
        assert_eq!(out, "{document_content} {unknown} {");
    }

    #[test]
    fn requests_use_expected_modes() {
        let prompts = PromptSet::default();
        let ctx = PromptContext::new("task");
        let draft = prompts.drafting_request(&ctx, &titles());
        assert_eq!(draft.mode, ResponseMode::FreeForm);
        assert!(draft.prompt.contains("## Conclusion"));
        assert!(draft.prompt.contains("task"));

        let refine = prompts.refinement_request(&ctx, &titles(), "## Title\nDoc body\n");
        assert_eq!(refine.mode, ResponseMode::StructuredOnly);
        assert!(refine.prompt.contains("Doc body"));
        assert!(!refine.prompt.contains("{document_content}"));
    }

    #[test]
    fn load_dir_falls_back_for_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SYSTEM_PROMPT_FILE), "Custom persona.").unwrap();
        let prompts = PromptSet::load_dir(dir.path()).unwrap();
        assert_eq!(prompts.system, "Custom persona.");
        assert_eq!(prompts.drafting, PromptSet::default().drafting);
        assert_eq!(prompts.refinement, PromptSet::default().refinement);
    }
}
