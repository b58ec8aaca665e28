use std::{path::PathBuf, process::ExitCode, sync::Arc};

use html_escape::{encode_double_quoted_attribute, encode_text};
use relay_bot_commons::useful_methods::{BotRelaySendMsg, SendOptions, MAX_MESSAGE_LEN};
use teloxide::{
    dptree::deps,
    prelude::*,
    types::{BotCommand, Me},
    RequestError,
};

use crate::{config::BotConfig, offer::Offer, site::history::load_offers};

/// Offers listed in a reply to `/offers`.
pub const OFFERS_IN_REPLY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
}

pub const START: Command = Command {
    callname: "/start",
    description: "Benvenuto",
};

pub const OFFERS: Command = Command {
    callname: "/offers",
    description: "Le ultime offerte Amazon",
};

pub const COMMANDS: &[Command] = &[START, OFFERS];

pub fn generate_bot_commands() -> Vec<BotCommand> {
    COMMANDS
        .iter()
        .map(|command| BotCommand {
            command: command.callname[1..].to_string(),
            description: command.description.to_string(),
        })
        .collect()
}

/// Which command `text` invokes, if any. `/offers@ThisBot` counts, `/offers@OtherBot` doesn't.
#[must_use]
pub fn parse_command(text: &str, bot_username: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let (callname, target) = match first.split_once('@') {
        Some((callname, target)) => (callname, Some(target)),
        None => (first, None),
    };

    if target.is_some_and(|target| !target.eq_ignore_ascii_case(bot_username)) {
        return None;
    }

    COMMANDS
        .iter()
        .find(|command| command.callname.eq_ignore_ascii_case(callname))
        .copied()
}

#[must_use]
pub fn render_start_reply() -> String {
    "👋 Benvenuto! Usa /offers per ricevere le ultime offerte Amazon.".to_string()
}

/// HTML list of the newest offers.
///
/// Offers are added whole until the next one would go over [`MAX_MESSAGE_LEN`],
/// so the markup is never cut.
#[must_use]
pub fn render_offers_reply(offers: &[Offer]) -> String {
    if offers.is_empty() {
        return "Nessuna offerta disponibile al momento, riprova più tardi.".to_string();
    }

    let mut text = String::from("<b>🔥 Ultime offerte Amazon</b>\n");
    let mut len = text.chars().count();

    for (i, offer) in offers.iter().take(OFFERS_IN_REPLY).enumerate() {
        let mut item = format!(
            "\n{}. <a href=\"{}\">{}</a>",
            i + 1,
            encode_double_quoted_attribute(&offer.url),
            encode_text(&offer.title)
        );
        if !offer.price.is_empty() {
            item.push_str(&format!(" — {}", encode_text(&offer.price)));
        }

        let item_len = item.chars().count();
        if len + item_len > MAX_MESSAGE_LEN {
            log::debug!("Only {i} offers fit in the reply");
            break;
        }
        text.push_str(&item);
        len += item_len;
    }
    text
}

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    latest_json: Arc<PathBuf>,
) -> Result<(), RequestError> {
    let Some(text) = message.text() else {
        return Ok(());
    };
    let Some(command) = parse_command(text, me.username()) else {
        return Ok(());
    };

    log::debug!("{} from chat {}", command.callname, message.chat.id);

    let (reply, options) = if command == OFFERS {
        let offers = load_offers(&latest_json);
        let options = SendOptions {
            html: true,
            disable_link_preview: true,
            keyboard: None,
        };
        (render_offers_reply(&offers), options)
    } else {
        (render_start_reply(), SendOptions::default())
    };

    bot.relaysendmsg(message.chat.id, &reply, &options).await?;
    Ok(())
}

/// Run the command bot until Ctrl+C.
pub async fn entry() -> ExitCode {
    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(2);
        }
    };
    log::debug!("{config:?}");

    let bot = Bot::new(config.telegram_token);

    if let Err(e) = bot.set_my_commands(generate_bot_commands()).await {
        log::error!("Failed to set bot commands: {e}");
        return ExitCode::from(2);
    }

    let latest_json = Arc::new(config.latest_json);

    log::info!("Creating the handler...");

    let handler = Update::filter_message().endpoint(handle_message);

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![latest_json])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
    ExitCode::SUCCESS
}
