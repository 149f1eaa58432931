//! HTML to plain text for project pages.

use std::sync::LazyLock;

use regex::Regex;

static INVISIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|svg|template)\b.*?</(script|style|noscript|svg|template)\s*>|<!--.*?-->")
        .expect("valid invisible-element regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid space regex"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&#x27;", "'"),
    ("&amp;", "&"),
];

/// Visible text of `html`, whitespace-collapsed.
pub fn html_to_text(html: &str) -> String {
    let without_hidden = INVISIBLE_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_hidden, " ");
    let mut text = without_tags.into_owned();
    // &amp; last so "&amp;lt;" stays "&lt;".
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}
