use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    affiliate::{rewrite_url, AffiliateTag, AMAZON_MARKER},
    text::{collapse_whitespace, URL_REGEX},
};

/// Title used when a message has no text besides its links.
pub const DEFAULT_TITLE: &str = "Offerta Amazon";
/// Link used when a message mentions Amazon without linking a product.
pub const DEFAULT_URL: &str = "https://www.amazon.it/";
/// Picture shown for offers whose message had no photo.
pub const DEFAULT_IMAGE: &str = "https://upload.wikimedia.org/wikipedia/commons/a/a9/Amazon_logo.svg";
/// Titles are cut to this many characters.
pub const TITLE_MAX_CHARS: usize = 120;

static PRICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+[,.]?[0-9]*)\s?€").expect("Regex will always be valid")
});

/// A single deal, as shown on the site and posted to social feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub title: String,
    /// Amazon URL, already carrying our affiliate tag.
    pub url: String,
    /// Free-form price like `19.99 €`. Empty if the message didn't state one.
    #[serde(default)]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// `channel_messageid` of the message this offer came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Offer {
    /// Attach where this offer was seen. A photo from the message replaces the default image.
    #[must_use]
    pub fn with_source(
        mut self,
        channel: &str,
        message_id: u64,
        photo: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        self.id = Some(offer_id(channel, message_id));
        if let Some(photo) = photo {
            self.image = Some(photo.to_string());
        }
        self.created_at = Some(created_at);
        self
    }

    /// True if the image is an actual product photo and not the stock logo.
    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.image.as_deref().is_some_and(|i| i != DEFAULT_IMAGE)
    }
}

/// Composite ID of a message in a channel. Message IDs are only unique per channel.
#[must_use]
pub fn offer_id(channel: &str, message_id: u64) -> String {
    format!("{channel}_{message_id}")
}

/// Pull an offer out of a deal message.
#[must_use]
pub fn extract_offer(text: &str, tag: &AffiliateTag) -> Offer {
    let url = URL_REGEX
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|u| u.contains(AMAZON_MARKER))
        .map_or_else(|| DEFAULT_URL.to_string(), |u| rewrite_url(u, tag).into_owned());

    Offer {
        title: extract_title(text),
        url,
        price: extract_price(text).unwrap_or_default(),
        image: Some(DEFAULT_IMAGE.to_string()),
        id: None,
        created_at: None,
    }
}

/// First price in the text, like `19,99€` → `19.99 €`.
#[must_use]
pub fn extract_price(text: &str) -> Option<String> {
    let captures = PRICE_REGEX.captures(text)?;
    Some(format!("{} €", captures[1].replace(',', ".")))
}

/// First line of the text once links are gone, cut to [`TITLE_MAX_CHARS`].
#[must_use]
pub fn extract_title(text: &str) -> String {
    let without_urls = URL_REGEX.replace_all(text, "");
    let first_line = without_urls.trim().lines().next().unwrap_or_default();
    let title = collapse_whitespace(first_line);

    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    match title.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => title[..cut].trim_end().to_string(),
        None => title,
    }
}
