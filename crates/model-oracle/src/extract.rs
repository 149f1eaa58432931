//! Code block extraction from model replies.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::OracleError;
use crate::Result;

static NIX_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```nix[ \t]*\r?\n(.*?)```").expect("valid nix block regex")
});

/// The contents of the single ```nix block in `reply`.
pub fn extract_nix_block(reply: &str) -> Result<String> {
    let blocks: Vec<&str> = NIX_BLOCK_RE
        .captures_iter(reply)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    match blocks.as_slice() {
        [only] => Ok(format!("{}\n", only.trim_end())),
        _ => Err(OracleError::CodeBlock { found: blocks.len() }),
    }
}
