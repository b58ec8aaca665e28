use html_escape::{encode_double_quoted_attribute, encode_text};
use relay_bot_commons::useful_methods::{BotRelaySendMsg, SendOptions};
use teloxide::{
    types::{InlineKeyboardButton, InlineKeyboardMarkup, Recipient},
    Bot,
};
use url::Url;

use crate::{error::Error, offer::Offer, scanner::Forwarder};

/// How many offers make it into a digest message.
pub const DIGEST_OFFERS: usize = 3;

/// Posts rewritten deal messages to our own channel.
#[derive(Debug, Clone)]
pub struct ChannelForwarder {
    bot: Bot,
    target: Recipient,
}

impl ChannelForwarder {
    pub fn new(bot: Bot, target: Recipient) -> Self {
        Self { bot, target }
    }
}

impl Forwarder for ChannelForwarder {
    async fn forward(&self, text: &str) -> Result<(), Error> {
        self.bot
            .relaysendmsg(self.target.clone(), text, &SendOptions::default())
            .await
            .map_err(Error::from_target_send)?;
        Ok(())
    }
}

/// Public link to a channel, if it has a username.
#[must_use]
pub fn channel_link(channel: &Recipient) -> Option<Url> {
    match channel {
        Recipient::ChannelUsername(username) => {
            Url::parse(&format!("https://t.me/{}", username.trim_start_matches('@'))).ok()
        }
        Recipient::Id(_) => None,
    }
}

/// Render the HTML digest of the newest offers.
#[must_use]
pub fn render_digest(offers: &[Offer], site_url: Option<&Url>) -> String {
    let mut text = String::from("<b>🔥 Nuove offerte Amazon!</b>\n\n");

    for offer in offers.iter().take(DIGEST_OFFERS) {
        text.push_str(&format!(
            "🛒 <a href=\"{}\">{}</a>\n",
            encode_double_quoted_attribute(&offer.url),
            encode_text(&offer.title)
        ));
        if !offer.price.is_empty() {
            text.push_str(&format!("💰 {}\n", encode_text(&offer.price)));
        }
        text.push('\n');
    }

    if let Some(site) = site_url.and_then(Url::host_str) {
        text.push_str(&format!(
            "🌐 <b>Scopri tutte le offerte su {}</b>",
            encode_text(site.trim_start_matches("www."))
        ));
    }

    text.trim_end().to_string()
}

fn digest_keyboard(site_url: Option<&Url>, channel: Option<Url>) -> Option<InlineKeyboardMarkup> {
    let mut rows = Vec::new();
    if let Some(site) = site_url {
        rows.push(vec![InlineKeyboardButton::url("🌐 Vai al sito", site.clone())]);
    }
    if let Some(channel) = channel {
        rows.push(vec![InlineKeyboardButton::url("🔔 Telegram", channel)]);
    }

    (!rows.is_empty()).then(|| InlineKeyboardMarkup::new(rows))
}

/// Send a digest of the newest offers, with buttons to the site and the channel.
pub async fn announce_digest(
    bot: &Bot,
    chat: Recipient,
    offers: &[Offer],
    site_url: Option<&Url>,
    channel: &Recipient,
) -> Result<(), Error> {
    if offers.is_empty() {
        log::debug!("No offers, no digest.");
        return Ok(());
    }

    let options = SendOptions {
        html: true,
        disable_link_preview: true,
        keyboard: digest_keyboard(site_url, channel_link(channel)),
    };

    bot.relaysendmsg(chat, &render_digest(offers, site_url), &options)
        .await
        .map_err(Error::from_target_send)?;

    log::info!("Sent digest of {} offers", offers.len().min(DIGEST_OFFERS));
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use teloxide::types::ChatId;

    use super::*;

    fn offer(title: &str, price: &str) -> Offer {
        Offer {
            title: title.to_string(),
            url: "https://www.amazon.it/dp/A?psc=1&tag=mytag-21".to_string(),
            price: price.to_string(),
            image: None,
            id: None,
            created_at: None,
        }
    }

    #[test]
    fn digest_is_escaped_and_capped() {
        let offers = [
            offer("Cuffie <wireless>", "19.99 €"),
            offer("Mouse & tastiera", ""),
            offer("Terzo", "1 €"),
            offer("Quarto", "2 €"),
        ];
        let site = Url::parse("https://www.techandmore.eu").unwrap();
        let digest = render_digest(&offers, Some(&site));

        assert!(digest.starts_with("<b>🔥 Nuove offerte Amazon!</b>"));
        assert!(digest.contains("Cuffie &lt;wireless&gt;"));
        assert!(digest.contains("Mouse &amp; tastiera"));
        assert!(digest.contains("href=\"https://www.amazon.it/dp/A?psc=1&amp;tag=mytag-21\""));
        assert!(!digest.contains("Quarto"));
        assert_eq!(digest.matches("💰").count(), 2);
        assert!(digest.ends_with("Scopri tutte le offerte su techandmore.eu</b>"));
    }

    #[test]
    fn channel_links() {
        assert_eq!(
            channel_link(&Recipient::ChannelUsername("@amazontechandmore".to_string()))
                .unwrap()
                .as_str(),
            "https://t.me/amazontechandmore"
        );
        assert_eq!(channel_link(&Recipient::Id(ChatId(-100))), None);
    }

    #[test]
    fn keyboard_only_when_there_is_somewhere_to_go() {
        assert!(digest_keyboard(None, None).is_none());
        let site = Url::parse("https://www.techandmore.eu").unwrap();
        let keyboard = digest_keyboard(Some(&site), None).unwrap();
        assert_eq!(keyboard.inline_keyboard.len(), 1);
    }
}
