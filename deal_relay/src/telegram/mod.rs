//! Everything that talks to Telegram.

/// Reading public channels through their web preview.
pub mod preview;

/// Posting to our own channel.
pub mod relay;

pub use preview::PreviewSource;
pub use relay::{announce_digest, ChannelForwarder};
