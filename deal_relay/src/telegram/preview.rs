use std::{sync::LazyLock, time::Duration};

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::{
    error::Error,
    scanner::{ChannelSource, SourceMessage},
};

static MESSAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.tgme_widget_message[data-post]").expect("Selector will always be valid")
});
static MESSAGE_TEXT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.tgme_widget_message_text").expect("Selector will always be valid")
});
static PHOTO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.tgme_widget_message_photo_wrap").expect("Selector will always be valid")
});
static DATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tgme_widget_message_date time[datetime]")
        .expect("Selector will always be valid")
});
static CHANNEL_HISTORY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".tgme_channel_history").expect("Selector will always be valid")
});
static BACKGROUND_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"background-image:\s*url\(['"]?([^'")]+)['"]?\)"#)
        .expect("Regex will always be valid")
});

/// Reads public channels through their web preview at `https://t.me/s/<channel>`.
///
/// This needs no account or session, but only works for public channels
/// that haven't disabled the preview.
#[derive(Debug, Clone)]
pub struct PreviewSource {
    client: reqwest::Client,
    base: String,
}

impl PreviewSource {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(7))
            .build()?;

        Ok(Self {
            client,
            base: "https://t.me/s".to_string(),
        })
    }
}

impl ChannelSource for PreviewSource {
    async fn recent_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, Error> {
        let channel = channel.trim_start_matches('@');
        let url = format!("{}/{}", self.base, channel);

        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_preview(channel, &html, limit)
    }
}

/// Parse a channel preview page into up to `limit` messages, newest first.
pub fn parse_preview(channel: &str, html: &str, limit: usize) -> Result<Vec<SourceMessage>, Error> {
    let document = Html::parse_document(html);

    let mut messages: Vec<SourceMessage> = document
        .select(&MESSAGE)
        .filter_map(|element| parse_message(channel, element))
        .collect();

    if messages.is_empty() && document.select(&CHANNEL_HISTORY).next().is_none() {
        // Private, nonexistent, or preview disabled: t.me serves a landing page instead.
        return Err(Error::Page {
            channel: channel.to_string(),
            reason: "no public preview available".to_string(),
        });
    }

    // The page lists messages oldest first.
    messages.reverse();
    messages.truncate(limit);
    Ok(messages)
}

fn parse_message(channel: &str, element: ElementRef<'_>) -> Option<SourceMessage> {
    let post = element.value().attr("data-post")?;
    let (_, id) = post.rsplit_once('/')?;
    let id = id.parse().ok()?;

    // A reply quotes its parent's text first; the message's own text comes last.
    let text = element.select(&MESSAGE_TEXT).last().map(|text| {
        let mut output = String::new();
        collect_text(text, &mut output);
        output.trim().to_string()
    });

    let photo = element
        .select(&PHOTO)
        .next()
        .and_then(|photo| photo.value().attr("style"))
        .and_then(|style| BACKGROUND_URL.captures(style))
        .map(|captures| captures[1].to_string());

    let date = element
        .select(&DATE)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .and_then(|datetime| DateTime::parse_from_rfc3339(datetime).ok())
        .map(|datetime| datetime.with_timezone(&Utc));

    Some(SourceMessage {
        channel: channel.to_string(),
        id,
        text: text.filter(|t| !t.is_empty()),
        photo,
        date,
    })
}

/// Flatten message HTML back into the text the author wrote.
///
/// `<br>` becomes a newline, and links whose label is a (possibly shortened) URL
/// are replaced by their full `href`, so the URL survives for rewriting.
fn collect_text(element: ElementRef<'_>, output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => output.push_str(text),
            Node::Element(child_element) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };

                match child_element.name() {
                    "br" => output.push('\n'),
                    "a" => {
                        let label: String = child_ref.text().collect();
                        match child_element.attr("href") {
                            Some(href) if href.starts_with("http") && looks_like_url(&label) => {
                                output.push_str(href);
                            }
                            _ => collect_text(child_ref, output),
                        }
                    }
                    _ => collect_text(child_ref, output),
                }
            }
            _ => {}
        }
    }
}

fn looks_like_url(label: &str) -> bool {
    let label = label.trim();
    !label.is_empty()
        && !label.contains(char::is_whitespace)
        && (label.starts_with("http") || label.contains('.'))
}
