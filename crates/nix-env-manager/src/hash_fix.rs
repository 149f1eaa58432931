//! Mechanical hash repair from Nix's mismatch report.

use std::sync::LazyLock;

use async_trait::async_trait;
use nixpack_core::placeholder::{find_placeholders, is_placeholder_hash, validate_hash_patch};
use nixpack_core::HashFixStrategy;
use regex::Regex;
use tracing::info;

use crate::error::NixError;
use crate::Result;

static SPECIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"specified:\s*(\S+)").expect("valid specified regex"));
static GOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"got:\s*(\S+)").expect("valid got regex"));

/// Hashes named in a fixed-output mismatch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    pub specified: Option<String>,
    pub got: String,
}

pub fn parse_mismatch(error_text: &str) -> Result<HashMismatch> {
    let got = GOT_RE
        .captures(error_text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| NixError::HashFix("no `got:` hash in the error output".to_string()))?;
    let specified = SPECIFIED_RE
        .captures(error_text)
        .map(|c| c[1].to_string());
    Ok(HashMismatch { specified, got })
}

/// Replace one hash in `candidate` with the one Nix computed.
///
/// When the mismatch names a real hash, that occurrence is replaced and it
/// must be spelled the same way in the recipe; otherwise the first
/// placeholder is. Nothing else in the text changes.
pub fn replace_hash(candidate: &str, error_text: &str) -> Result<String> {
    let mismatch = parse_mismatch(error_text)?;

    let patched = match mismatch.specified.as_deref() {
        Some(spec) if !is_placeholder_hash(spec) => {
            if !candidate.contains(spec) {
                return Err(NixError::HashFix(format!(
                    "specified hash {spec} does not appear in the recipe"
                )));
            }
            candidate.replacen(spec, &mismatch.got, 1)
        }
        _ => replace_first_placeholder(candidate, &mismatch.got).ok_or_else(|| {
            NixError::HashFix("no placeholder hash left to replace".to_string())
        })?,
    };

    validate_hash_patch(candidate, &patched).map_err(NixError::HashFix)?;
    Ok(patched)
}

fn replace_first_placeholder(text: &str, got: &str) -> Option<String> {
    let first = find_placeholders(text).into_iter().next()?;
    let replacement = first.replacement(got);
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..first.start]);
    out.push_str(&replacement);
    out.push_str(&text[first.end..]);
    Some(out)
}

/// [`HashFixStrategy`] that swaps one placeholder for the reported hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderHashFixer;

#[async_trait]
impl HashFixStrategy for PlaceholderHashFixer {
    async fn fix(&self, candidate_text: &str, error_text: &str) -> nixpack_core::Result<String> {
        let patched = replace_hash(candidate_text, error_text)?;
        info!("replaced one hash from the mismatch report");
        Ok(patched)
    }
}
