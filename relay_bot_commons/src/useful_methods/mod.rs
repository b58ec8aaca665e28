use std::{future::Future, time::Duration};

use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    sugar::request::RequestLinkPreviewExt,
    types::{InlineKeyboardMarkup, Message, ParseMode, Recipient},
    Bot, RequestError,
};

/// Maximum length of a text message, in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// How a message sent with [`BotRelaySendMsg::relaysendmsg`] should look.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Parse the text as HTML. Otherwise it is sent as plain text.
    pub html: bool,
    pub disable_link_preview: bool,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

pub trait BotRelaySendMsg {
    /// Opinionated method to send a message, with retries due to flood waiting
    /// or any other issues. Text over [`MAX_MESSAGE_LEN`] is sent as several
    /// messages, split with [`split_message`]. The keyboard goes on the last one.
    fn relaysendmsg(
        &self,
        to_where: impl Into<Recipient> + Send,
        text: &str,
        options: &SendOptions,
    ) -> impl Future<Output = Result<Vec<Message>, RequestError>> + Send;
}

impl BotRelaySendMsg for Bot {
    async fn relaysendmsg(
        &self,
        to_where: impl Into<Recipient> + Send,
        text: &str,
        options: &SendOptions,
    ) -> Result<Vec<Message>, RequestError> {
        let to_where: Recipient = to_where.into();
        let parts = split_message(text, MAX_MESSAGE_LEN);
        if parts.len() > 1 {
            log::warn!(
                "Message of {} characters is too long, sending it as {} parts",
                text.chars().count(),
                parts.len()
            );
        }

        let mut sent = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            sent.push(send_with_retries(self, &to_where, part, options, last).await?);
        }
        Ok(sent)
    }
}

async fn send_with_retries(
    bot: &Bot,
    to_where: &Recipient,
    text: &str,
    options: &SendOptions,
    with_keyboard: bool,
) -> Result<Message, RequestError> {
    // Try up to 3 times
    let mut looped: u8 = 0;
    loop {
        looped += 1;
        let mut request = bot.send_message(to_where.clone(), text);
        if options.html {
            request = request.parse_mode(ParseMode::Html);
        }
        if options.disable_link_preview {
            request = request.disable_link_preview(true);
        }
        if let Some(keyboard) = options.keyboard.as_ref().filter(|_| with_keyboard) {
            request = request.reply_markup(keyboard.clone());
        }

        let result = request.await;

        let delay = match &result {
            // Nothing to gain from retrying API errors.
            Ok(_) | Err(RequestError::Api(_) | RequestError::InvalidJson { .. }) => None,
            Err(RequestError::RetryAfter(secs)) => {
                log::debug!("Flood wait for {:?} while sending", secs.duration());
                Some(secs.duration())
            }
            Err(e) => {
                log::debug!("Send failed, may retry: {e}");
                Some(Duration::from_secs(1))
            }
        };

        match delay {
            Some(delay) if looped < 3 => tokio::time::sleep(delay).await,
            _ => break result,
        }
    }
}

/// Split `text` into parts of at most `max_chars` characters.
///
/// Cuts go after the last full line that fits, then after the last word, and only
/// inside a word when a single word is too long. Text made of short lines, like
/// HTML with one element per line, never has a tag or entity cut in half.
#[must_use]
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut rest = text;

    while let Some((limit, _)) = rest.char_indices().nth(max_chars) {
        let (part, tail) = rest.split_at(cut_point(rest, limit));
        let part = part.trim_end();
        if !part.is_empty() {
            parts.push(part);
        }
        rest = tail.trim_start();
    }

    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Byte offset to cut `text` at, no further than `limit`.
fn cut_point(text: &str, limit: usize) -> usize {
    let (window, after) = text.split_at(limit);

    if after.starts_with('\n') {
        return limit;
    }
    if let Some(cut) = window.rfind('\n').filter(|&cut| cut > 0) {
        return cut;
    }
    if after.starts_with(char::is_whitespace) {
        return limit;
    }
    window
        .rfind(char::is_whitespace)
        .filter(|&cut| cut > 0)
        .unwrap_or(limit)
}

#[cfg(test)]
mod tests {
    use super::split_message;

    #[test]
    fn short_text_is_one_part() {
        let text = "Sconto su cuffie 19,99€";
        assert_eq!(split_message(text, 4096), [text]);
        assert_eq!(split_message(text, text.chars().count()), [text]);
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn splits_between_lines() {
        let text = "1. <a href=\"https://a.example/?x=1&amp;y=2\">Uno</a>\n\
                    2. <a href=\"https://b.example/?x=1&amp;y=2\">Due</a>\n\
                    3. <a href=\"https://c.example/?x=1&amp;y=2\">Tre</a>";
        let first_line = text.lines().next().unwrap();

        let parts = split_message(text, first_line.chars().count() + 10);
        assert_eq!(parts.len(), 3);
        for (part, line) in parts.iter().zip(text.lines()) {
            assert_eq!(*part, line);
        }
    }

    #[test]
    fn long_lines_split_between_words_then_chars() {
        assert_eq!(split_message("uno due tre", 7), ["uno due", "tre"]);
        assert_eq!(split_message("€€€€€€", 4), ["€€€€", "€€"]);
    }

    #[test]
    fn nothing_is_lost() {
        let text = "Offerta lampo!\n".repeat(500);
        let parts = split_message(&text, 4096);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.chars().count() <= 4096));
        assert_eq!(parts.join("\n").trim_end(), text.trim_end());
    }
}
