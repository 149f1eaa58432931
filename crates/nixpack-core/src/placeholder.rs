//! Placeholder hashes and the single-substitution rule for hash fixes.
//!
//! A recipe can leave a hash unknown in several ways: `lib.fakeHash` (or
//! bare `fakeHash` under `with lib;`), the literal digests those evaluate
//! to, or an empty string. Nix reports all of them with the all-`A` SRI
//! digest as the `specified:` hash.

use std::sync::LazyLock;

use regex::Regex;

/// SRI form Nix prints for `lib.fakeHash` in mismatch errors.
pub const PLACEHOLDER_SRI: &str = "sha256-AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// nix32 form of `lib.fakeSha256`.
pub const PLACEHOLDER_NIX32: &str = "0000000000000000000000000000000000000000000000000000";

/// Expressions a recipe may use in place of a not-yet-known hash.
pub const PLACEHOLDER_EXPRESSIONS: &[&str] =
    &["lib.fakeHash", "lib.fakeSha256", "fakeHash", "fakeSha256"];

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:lib\.)?fake(?:Hash|Sha256)\b").expect("valid placeholder expression regex")
});
static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"sha256-A{43}=|\b0{52}\b").expect("valid placeholder literal regex")
});
static EMPTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b\w*(?:[Hh]ash|[Ss]ha256)\s*=\s*("")"#).expect("valid empty hash regex")
});

/// How a placeholder is spelled in the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderForm {
    /// `lib.fakeHash`, `fakeSha256`, ...
    Expression,
    /// A fake digest inside a string literal.
    Literal,
    /// `hash = ""`; the span covers the two quotes.
    Empty,
}

/// One placeholder occurrence, as a byte range of the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub start: usize,
    pub end: usize,
    pub form: PlaceholderForm,
}

impl Placeholder {
    /// Text that takes the place of this occurrence when `hash` is known.
    pub fn replacement(&self, hash: &str) -> String {
        match self.form {
            PlaceholderForm::Literal => hash.to_string(),
            PlaceholderForm::Expression | PlaceholderForm::Empty => format!("\"{hash}\""),
        }
    }
}

/// Every placeholder in `text`, in order of appearance.
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    let spans = |re: &Regex, form: PlaceholderForm| {
        re.find_iter(text)
            .map(move |m| Placeholder {
                start: m.start(),
                end: m.end(),
                form,
            })
            .collect::<Vec<_>>()
    };

    let mut found = spans(&*EXPRESSION_RE, PlaceholderForm::Expression);
    found.extend(spans(&*LITERAL_RE, PlaceholderForm::Literal));
    found.extend(EMPTY_RE.captures_iter(text).filter_map(|c| {
        c.get(1).map(|m| Placeholder {
            start: m.start(),
            end: m.end(),
            form: PlaceholderForm::Empty,
        })
    }));
    found.sort_by_key(|p| p.start);
    found
}

/// Whether `hash` is the sentinel value rather than a real digest.
pub fn is_placeholder_hash(hash: &str) -> bool {
    let trimmed = hash.trim().trim_matches('"');
    trimmed.is_empty()
        || trimmed == PLACEHOLDER_SRI
        || trimmed == PLACEHOLDER_NIX32
        || PLACEHOLDER_EXPRESSIONS.contains(&trimmed)
}

/// Number of placeholder occurrences in a recipe.
pub fn count_placeholders(text: &str) -> usize {
    find_placeholders(text).len()
}

/// Check that a hash patch touched at most one placeholder occurrence and
/// did not add new placeholders.
pub fn validate_hash_patch(before: &str, after: &str) -> Result<(), String> {
    let was = count_placeholders(before);
    let now = count_placeholders(after);
    if now > was {
        return Err(format!(
            "patch introduced placeholders ({was} before, {now} after)"
        ));
    }
    if was - now > 1 {
        return Err(format!(
            "patch replaced {} placeholders, at most one allowed",
            was - now
        ));
    }
    if !before.contains(PLACEHOLDER_SRI) && after.contains(PLACEHOLDER_SRI) {
        return Err("patch wrote the placeholder digest into the recipe".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_placeholder_hash() {
        assert!(is_placeholder_hash(PLACEHOLDER_SRI));
        assert!(is_placeholder_hash("lib.fakeHash"));
        assert!(is_placeholder_hash("fakeSha256"));
        assert!(is_placeholder_hash("\"\""));
        assert!(!is_placeholder_hash(
            "sha256-9bZ0Jd2Z7l5mYpQ6e1Gh3sX2m0c2F0a0dQp3Yc6k8yE="
        ));
    }

    #[test]
    fn test_count_placeholders() {
        let text = r#"
          src = fetchFromGitHub { hash = lib.fakeHash; };
          cargoHash = lib.fakeHash;
        "#;
        assert_eq!(count_placeholders(text), 2);
    }

    #[test]
    fn test_finds_every_spelling_in_order() {
        let text = format!(
            "hash = \"\";\nb = fakeHash;\nc = \"{PLACEHOLDER_SRI}\";\n\
             d = lib.fakeSha256;\ne = \"{PLACEHOLDER_NIX32}\";"
        );
        let forms: Vec<_> = find_placeholders(&text).iter().map(|p| p.form).collect();
        assert_eq!(
            forms,
            vec![
                PlaceholderForm::Empty,
                PlaceholderForm::Expression,
                PlaceholderForm::Literal,
                PlaceholderForm::Expression,
                PlaceholderForm::Literal,
            ]
        );
    }

    #[test]
    fn test_lib_prefix_counts_once() {
        let text = "hash = lib.fakeHash;";
        let found = find_placeholders(text);
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].start..found[0].end], "lib.fakeHash");
    }

    #[test]
    fn test_ignores_lookalikes() {
        assert_eq!(count_placeholders("myfakeHash = 1; fakeHashes = 2;"), 0);
        assert_eq!(count_placeholders("description = \"\";"), 0);
    }

    #[test]
    fn test_validate_single_substitution() {
        let before = "a = lib.fakeHash; b = lib.fakeHash;";
        let one = "a = \"sha256-x\"; b = lib.fakeHash;";
        let two = "a = \"sha256-x\"; b = \"sha256-y\";";
        assert!(validate_hash_patch(before, one).is_ok());
        assert!(validate_hash_patch(before, two).is_err());
    }

    #[test]
    fn test_validate_rejects_new_placeholder() {
        let before = "a = \"sha256-x\";";
        let after = "a = lib.fakeHash;";
        assert!(validate_hash_patch(before, after).is_err());
    }
}
