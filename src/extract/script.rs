// src/extract/script.rs
// =============================================================================
// This module finds the direct-download link on an item's detail page.
//
// Unlike the other links, this one is not a normal <a> in the page. The site
// writes it into the page from an inline script:
//
//   document.getElementById("romss").innerHTML='&nbsp;<a href="URL">Direct&nbsp;Download</a>&nbsp;';
//
// A CSS selector cannot see inside that string, so we match the raw markup
// with a regular expression and capture URL.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// Literal prefix and suffix of the page template, with the URL captured
// between them. Quotes and angle brackets end the URL.
static FILE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"document\.getElementById\("romss"\)\.innerHTML='&nbsp;<a href=""#,
        r#"(?P<link>https?://[^"<>]+)"#,
        r#"">Direct&nbsp;Download</a>&nbsp;';"#,
    ))
    .expect("file link pattern is a valid regex")
});

/// Extracts the direct-download URL from a detail page
///
/// Returns the first match. When the page does not carry the script, emits a
/// debug event and returns None; the caller logs the page URL and skips the
/// item.
pub fn extract_file_link(html: &str) -> Option<String> {
    match FILE_LINK.captures(html) {
        Some(captures) => captures.name("link").map(|m| m.as_str().to_string()),
        None => {
            debug!("detail page does not carry the download script");
            None
        }
    }
}
