use std::{borrow::Cow, fmt::Display, sync::LazyLock};

use regex::Regex;

use crate::{error::Error, text::URL_REGEX};

/// Substring that marks a link or a message as Amazon-related.
pub const AMAZON_MARKER: &str = "amazon.";

/// A whole `tag` query parameter. `ascsubtag=` and friends don't match.
static TAG_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([?&])tag=[^&#]*").expect("Regex will always be valid"));

/// An Amazon affiliate tag like `mytag-21`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffiliateTag(String);

impl AffiliateTag {
    /// Validate a tag. It has to be non-empty and fit in a query parameter as is.
    pub fn new(tag: impl Into<String>) -> Result<Self, Error> {
        let tag = tag.into();
        let tag = tag.trim();

        if tag.is_empty() {
            return Err(Error::Config("affiliate tag is empty".to_string()));
        }
        if tag.contains(['&', '?', '=', '#', '/']) || tag.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "affiliate tag {tag:?} contains characters that don't belong in a query"
            )));
        }

        Ok(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AffiliateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// True if the text mentions Amazon in a way worth relaying.
#[must_use]
pub fn is_amazon_mention(text: &str) -> bool {
    text.to_lowercase().contains(AMAZON_MARKER)
}

/// Put our affiliate tag into an Amazon URL.
///
/// Non-Amazon URLs come back unchanged. An existing `tag=` value is replaced,
/// otherwise the parameter is appended.
#[must_use]
pub fn rewrite_url<'a>(url: &'a str, tag: &AffiliateTag) -> Cow<'a, str> {
    if !url.contains(AMAZON_MARKER) {
        return Cow::Borrowed(url);
    }

    if TAG_PARAM.is_match(url) {
        return TAG_PARAM.replace_all(url, |captures: &regex::Captures| {
            format!("{}tag={tag}", &captures[1])
        });
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    Cow::Owned(format!("{url}{separator}tag={tag}"))
}

/// Rewrite every Amazon link in a message, leaving the rest of it exactly as it was.
#[must_use]
pub fn rewrite_text(text: &str, tag: &AffiliateTag) -> String {
    URL_REGEX
        .replace_all(text, |captures: &regex::Captures| {
            rewrite_url(&captures[0], tag).into_owned()
        })
        .into_owned()
}
