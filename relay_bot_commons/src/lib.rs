//! This crate houses functions common to the relay binaries, because some things
//! are just boilerplate.

use std::future::Future;

use teloxide::types::{ChatId, Recipient};

pub mod useful_methods;

/// Initialize logging and run the `closure` to completion in an async runtime,
/// returning whatever it returns.
///
/// Logging is enabled by default on level `info` unless overridden
/// by environment variable `RUST_LOG`. This uses the crate
/// [pretty_env_logger][] internally, see its documentation for more details.
///
/// # Panics
///
/// Panics if the tokio runtime can't be built.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
pub fn start_everything<T>(closure: impl Future<Output = T>) -> T {
    let log_level = std::env::var_os("RUST_LOG")
        .unwrap_or_else(|| std::ffi::OsString::from("info"))
        .into_string()
        .unwrap_or_else(|_| String::from("info"));

    // journald timestamps lines by itself.
    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_level);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build the tokio runtime")
        .block_on(closure)
}

/// Turn a chat reference from configuration into a [`Recipient`].
///
/// Accepts `@username`, a bare `username`, or a numeric chat ID like `-1001234567890`.
#[must_use]
pub fn parse_recipient(chat: &str) -> Recipient {
    let chat = chat.trim();

    if let Ok(id) = chat.parse::<i64>() {
        return Recipient::Id(ChatId(id));
    }

    match chat.strip_prefix('@') {
        Some(_) => Recipient::ChannelUsername(chat.to_string()),
        None => Recipient::ChannelUsername(format!("@{chat}")),
    }
}
