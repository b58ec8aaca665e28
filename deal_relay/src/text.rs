use std::sync::LazyLock;

use regex::Regex;

/// Matches a URL the way deal channels write them: up to whitespace or a closing parenthesis.
pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("Regex will always be valid"));

static URL_LIKE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http\S+").expect("Regex will always be valid"));

/// Produce the fingerprint of a message used for duplicate detection.
///
/// Lowercases, removes URLs and collapses whitespace. Two messages that only
/// differ in their links or spacing get the same fingerprint.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowercased = text.to_lowercase();
    let without_urls = URL_LIKE_RUN.replace_all(&lowercased, "");
    collapse_whitespace(&without_urls)
}

/// Collapse all whitespace runs into a single space and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !output.is_empty() {
            output.push(' ');
        }
        output.push_str(word);
    }
    output
}
