use teloxide::{ApiError, RequestError};

/// Everything that can go wrong during a relay run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required configuration is missing or malformed.
    #[error("configuration: {0}")]
    Config(String),

    /// Credentials were rejected. `hint` says what to do about it.
    #[error("authentication failed for {service}: {message} ({hint})")]
    Auth {
        service: &'static str,
        message: String,
        hint: &'static str,
    },

    #[error("telegram: {0}")]
    Telegram(#[from] RequestError),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// The Graph API answered with an error object.
    #[error("facebook: {message} (code {code})")]
    Facebook { code: i64, message: String },

    #[error("ftp: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("tls: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A channel page didn't look like what we expect.
    #[error("unexpected page from {channel}: {reason}")]
    Page { channel: String, reason: String },

    #[error("worker thread: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("run did not finish within {0} seconds")]
    Timeout(u64),
}

impl Error {
    /// Fatal errors stop the whole run instead of just the channel or stage at hand.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Auth { .. })
    }

    /// Sort a Telegram error sent while posting to the target channel into the taxonomy.
    #[must_use]
    pub fn from_target_send(error: RequestError) -> Self {
        match error {
            RequestError::Api(ApiError::InvalidToken) => Error::Auth {
                service: "telegram",
                message: ApiError::InvalidToken.to_string(),
                hint: "check TELEGRAM_TOKEN, or regenerate it with @BotFather",
            },
            RequestError::Api(ApiError::ChatNotFound) => Error::Config(
                "target channel not found; check TARGET_CHANNEL and that the bot is an admin there"
                    .to_string(),
            ),
            other => Error::Telegram(other),
        }
    }
}
