//! Prompt text sent to the model.

use nixpack_core::{BuildError, CorrectionContext, LogComparison, ReleaseMetadata, Template};

pub const SYSTEM_PROMPT: &str = "You are a software packaging expert who can build any project \
with the Nix programming language. Every reply must contain exactly one ```nix code block \
holding the complete package.nix.";

const RULES: &str = "\
Rules:
- Do not add a meta attribute; it has no effect on the build.
- Do not change fetcher arguments that already carry a real hash.
- Use lib.fakeHash for any hash you do not know; it is replaced automatically.
- Never replace an existing hash with lib.fakeHash.
- mkDerivation is rarely the right builder outside C/C++; prefer the nixpkgs \
builder for the project's ecosystem.";

fn fenced(lang: &str, body: &str) -> String {
    format!("```{lang}\n{}\n```", body.trim_end())
}

fn release_section(release: Option<&ReleaseMetadata>) -> String {
    match release {
        Some(r) => {
            let mut out = format!("Latest release: {}", r.tag);
            if let Some(name) = &r.name {
                out.push_str(&format!(" ({name})"));
            }
            if let Some(date) = &r.published_at {
                out.push_str(&format!(", published {date}"));
            }
            if let Some(url) = &r.tarball_url {
                out.push_str(&format!("\nTarball: {url}"));
            }
            out
        }
        None => "No release metadata was found.".to_string(),
    }
}

/// Project page, release data and template notes.
pub fn context_prompt(context: &CorrectionContext) -> String {
    let mut out = format!(
        "Project: {}\n\nProject page:\n{}\n\n{}",
        context.project_url,
        fenced("text", &context.page_text),
        release_section(context.release.as_ref()),
    );
    if let Some(notes) = &context.template_notes {
        out.push_str("\n\nNotes for this kind of project:\n");
        out.push_str(&fenced("text", notes));
    }
    out
}

pub fn draft_prompt(context: &CorrectionContext, template: &Template) -> String {
    format!(
        "{}\n\nFill in every section of this template marked with `...`. Do not make other \
changes and keep the lib.fakeHash placeholders.\n{}\n\n{RULES}",
        context_prompt(context),
        fenced("nix", &template.text),
    )
}

pub fn fix_prompt(candidate_text: &str, error: &BuildError) -> String {
    format!(
        "This package.nix fails ({kind}, {stage} stage):\n{code}\n\nError:\n{log}\n\n\
Fix the error and reply with the complete updated file.\n\n{RULES}",
        kind = error.kind,
        stage = error.stage,
        code = fenced("nix", candidate_text),
        log = fenced("text", &error.message),
    )
}

pub fn retry_prompt(error: &BuildError) -> String {
    format!(
        "Your update still fails ({}, {} stage):\n{}\n\nFix it and reply with the complete file.",
        error.kind,
        error.stage,
        fenced("text", &error.message),
    )
}

pub fn patch_prompt(patched_text: &str) -> String {
    format!(
        "A hash was replaced automatically. This is now the current package.nix; continue \
from it:\n{}",
        fenced("nix", patched_text),
    )
}

pub const FORMAT_REMINDER: &str =
    "Your reply must contain exactly one ```nix code block with the complete package.nix.";

pub const TOOLS_EXHAUSTED: &str = "You have read enough of the source. Reply now with the \
complete package.nix in exactly one ```nix code block.";

pub fn judge_prompt(comparison: &LogComparison) -> String {
    format!(
        "Two attempts to build the same package failed. Compare how far each got.\n\n\
Previous attempt ({best} lines):\n{best_log}\n\n\
New attempt ({cand} lines):\n{cand_log}\n\n\
The logs first differ at line {div}. Longer logs usually mean the build got further; \
use the line numbers. If the new attempt got further, answer PROGRESS. If the previous \
attempt got further or there is no clear winner, answer REGRESS. Answer with the single word.",
        best = comparison.best_lines,
        best_log = fenced("text", &comparison.best_excerpt),
        cand = comparison.candidate_lines,
        cand_log = fenced("text", &comparison.candidate_excerpt),
        div = comparison.divergence_line,
    )
}
