use std::{fmt::Debug, path::PathBuf, str::FromStr, time::Duration};

use relay_bot_commons::parse_recipient;
use teloxide::types::Recipient;
use url::Url;

use crate::{affiliate::AffiliateTag, error::Error, facebook::FacebookMode};

/// Channels scanned when `SOURCE_CHANNELS` isn't set.
pub const DEFAULT_SOURCE_CHANNELS: &[&str] = &[
    "SoloOfferteECodiciSconto",
    "offertebenesseretop",
    "offerte24hgruppo",
    "DottSconto",
    "offertepaz",
    "ilmondodelrisparmio",
    "LeoffertedelGiorno",
    "mondodiofferte",
    "giga_offertee",
    "codici_sconto_sconti",
    "modascontata",
    "super_promo_it",
    "prezzitech",
    "ScontiClubOfficial",
    "prezzoTagliatoModa",
    "offertesmartworld",
    "affarefattoamz",
    "offerteabbigliamento",
    "prezzaccitech",
    "Homezoneit",
    "offerteinformatiche",
    "ScontologyErrori",
];

pub const DEFAULT_SITE_URL: &str = "https://www.techandmore.eu/";

/// Credentials for posting to a Facebook page.
#[derive(Clone)]
pub struct FacebookConfig {
    pub page_id: String,
    pub token: String,
    pub mode: FacebookMode,
}

impl Debug for FacebookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookConfig")
            .field("page_id", &self.page_id)
            .field("token", &"[REDACTED]")
            .field("mode", &self.mode)
            .finish()
    }
}

/// Where the site gets uploaded.
#[derive(Clone)]
pub struct FtpConfig {
    /// `host` or `host:port`.
    pub host: String,
    pub user: String,
    pub password: String,
    /// Remote directory to upload into. Empty means the login directory.
    pub path: String,
}

impl Debug for FtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("path", &self.path)
            .finish()
    }
}

/// Everything a run needs to know, read from the environment.
#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub target_channel: Recipient,
    pub affiliate_tag: AffiliateTag,
    /// Usernames without the leading `@`.
    pub source_channels: Vec<String>,
    /// Messages read per channel per run.
    pub message_limit: usize,
    pub cache_file: PathBuf,
    pub cache_window: usize,
    pub latest_json: PathBuf,
    pub latest_limit: usize,
    pub history_file: PathBuf,
    pub history_limit: usize,
    pub site_dir: PathBuf,
    pub site_url: Url,
    pub site_template: Option<PathBuf>,
    pub facebook: Option<FacebookConfig>,
    pub ftp: Option<FtpConfig>,
    /// Chat that gets the digest with links to the site. No digest if unset.
    pub digest_chat: Option<Recipient>,
    pub run_timeout: Duration,
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"[REDACTED]")
            .field("target_channel", &self.target_channel)
            .field("affiliate_tag", &self.affiliate_tag)
            .field("source_channels", &self.source_channels)
            .field("message_limit", &self.message_limit)
            .field("cache_file", &self.cache_file)
            .field("cache_window", &self.cache_window)
            .field("latest_json", &self.latest_json)
            .field("latest_limit", &self.latest_limit)
            .field("history_file", &self.history_file)
            .field("history_limit", &self.history_limit)
            .field("site_dir", &self.site_dir)
            .field("site_url", &self.site_url.as_str())
            .field("site_template", &self.site_template)
            .field("facebook", &self.facebook)
            .field("ftp", &self.ftp)
            .field("digest_chat", &self.digest_chat)
            .field("run_timeout", &self.run_timeout)
            .finish()
    }
}

/// Reads variables through `lookup`, treating blank values as unset.
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, Error> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("{key} is not set")))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|e| Error::Config(format!("{key}={value:?} is invalid: {e}"))),
        }
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        PathBuf::from(self.get(key).unwrap_or_else(|| default.to_string()))
    }
}

/// Split a comma separated channel list, dropping `@` and empty entries.
#[must_use]
pub fn parse_channel_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|channel| channel.trim().trim_start_matches('@'))
        .filter(|channel| !channel.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let vars = Vars { lookup };

        let source_channels = match vars.get("SOURCE_CHANNELS") {
            Some(list) => parse_channel_list(&list),
            None => DEFAULT_SOURCE_CHANNELS
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        if source_channels.is_empty() {
            return Err(Error::Config("SOURCE_CHANNELS has no channels".to_string()));
        }

        let site_url = vars.get("SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        let site_url = Url::parse(&site_url)
            .map_err(|e| Error::Config(format!("SITE_URL={site_url:?} is invalid: {e}")))?;

        let facebook = match (vars.get("FB_PAGE_ID"), vars.get("FB_PAGE_TOKEN")) {
            (Some(page_id), Some(token)) => Some(FacebookConfig {
                page_id,
                token,
                mode: vars.parsed("FB_POST_MODE", FacebookMode::default())?,
            }),
            (None, None) => None,
            _ => {
                log::warn!("Only one of FB_PAGE_ID and FB_PAGE_TOKEN is set, not posting to Facebook");
                None
            }
        };

        let ftp = match (vars.get("FTP_HOST"), vars.get("FTP_USER"), vars.get("FTP_PASS")) {
            (Some(host), Some(user), Some(password)) => Some(FtpConfig {
                host,
                user,
                password,
                path: vars.get("FTP_PATH").unwrap_or_default(),
            }),
            (None, None, None) => None,
            _ => {
                log::warn!("FTP_HOST, FTP_USER and FTP_PASS must all be set to upload the site");
                None
            }
        };

        Ok(Config {
            telegram_token: vars.required("TELEGRAM_TOKEN")?,
            target_channel: parse_recipient(&vars.required("TARGET_CHANNEL")?),
            affiliate_tag: AffiliateTag::new(vars.required("AFFILIATE_TAG")?)?,
            source_channels,
            message_limit: vars.parsed("MESSAGE_LIMIT", 10)?,
            cache_file: vars.path("CACHE_FILE", "bot/posted_cache.json"),
            cache_window: vars.parsed("CACHE_WINDOW", crate::cache::DEFAULT_WINDOW)?,
            latest_json: vars.path("LATEST_JSON", "bot/latest_offers.json"),
            latest_limit: vars.parsed("LATEST_LIMIT", 20)?,
            history_file: vars.path("HISTORY_FILE", "bot/history.json"),
            history_limit: vars.parsed("HISTORY_LIMIT", crate::site::history::DEFAULT_LIMIT)?,
            site_dir: vars.path("SITE_DIR", "site"),
            site_url,
            site_template: vars.get("SITE_TEMPLATE").map(PathBuf::from),
            facebook,
            ftp,
            digest_chat: vars.get("DIGEST_CHAT").as_deref().map(parse_recipient),
            run_timeout: Duration::from_secs(vars.parsed("RUN_TIMEOUT_SECS", 120)?),
        })
    }
}

/// What the command bot needs: its token and where the relay leaves the latest offers.
#[derive(Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub latest_json: PathBuf,
}

impl Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("telegram_token", &"[REDACTED]")
            .field("latest_json", &self.latest_json)
            .finish()
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let vars = Vars { lookup };
        Ok(BotConfig {
            telegram_token: vars.required("TELEGRAM_TOKEN")?,
            latest_json: vars.path("LATEST_JSON", "bot/latest_offers.json"),
        })
    }
}
