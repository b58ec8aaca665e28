//! Relays Amazon deals from public Telegram channels to our own channel,
//! with our affiliate tag, and republishes them to Facebook and a static site.

/// Errors, and which of them end a run.
mod error;
pub use error::Error;

/// Configuration from the environment.
pub mod config;

/// Text normalization for duplicate detection.
pub mod text;

/// Amazon link detection and affiliate tag rewriting.
pub mod affiliate;

/// Offers pulled out of deal messages.
pub mod offer;

/// The seen-message cache that keeps deals from being posted twice.
pub mod cache;

/// Going over the source channels.
pub mod scanner;

/// Everything that talks to Telegram.
pub mod telegram;

/// Posting to a Facebook page.
pub mod facebook;

/// The static site.
pub mod site;

/// The `/start` and `/offers` command bot.
pub mod commands;

/// Entry function that runs the relay once.
mod entry;
pub use entry::*;
