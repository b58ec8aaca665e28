use std::{fs, path::Path, process::ExitCode};

use chrono::Utc;
use teloxide::Bot;

use crate::{
    cache::{CacheStore, JsonFileCache},
    config::Config,
    error::Error,
    facebook::{publish_digest, publish_each, FacebookMode, FacebookPage, FeedPublisher},
    offer::Offer,
    scanner::{scan_channels, ChannelSource, Forwarder, ScanParams},
    site::{
        build_artifacts,
        history::{load_offers, save_offers},
        upload_site, write_artifacts, History, SiteInput,
    },
    telegram::{announce_digest, ChannelForwarder, PreviewSource},
};

/// How a run went.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Messages forwarded to the target channel.
    pub published: usize,
    /// Channels that couldn't be scanned.
    pub failed_channels: Vec<String>,
    /// Stages after the scan that failed.
    pub failed_stages: Vec<&'static str>,
    /// Site files uploaded.
    pub uploaded: usize,
}

impl RunSummary {
    fn stage_failed(&mut self, stage: &'static str, error: &Error) {
        if error.is_fatal() {
            log::error!("{stage} failed: {error}");
        } else {
            log::warn!("{stage} failed: {error}");
        }
        self.failed_stages.push(stage);
    }
}

/// Everything a run reads from and posts to.
pub struct Outlets<S, F, P> {
    pub source: S,
    pub forwarder: F,
    /// The Facebook page, if there is one, and how to post there.
    pub facebook: Option<(P, FacebookMode)>,
    /// Sends the digest when a digest chat is configured.
    pub bot: Bot,
}

impl Outlets<PreviewSource, ChannelForwarder, FacebookPage> {
    /// The real thing: public channel previews, our channel and the configured page.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let bot = Bot::new(&config.telegram_token);
        let facebook = match &config.facebook {
            Some(facebook) => Some((
                FacebookPage::new(facebook.page_id.clone(), facebook.token.clone())?,
                facebook.mode,
            )),
            None => None,
        };

        Ok(Self {
            source: PreviewSource::new()?,
            forwarder: ChannelForwarder::new(bot.clone(), config.target_channel.clone()),
            facebook,
            bot,
        })
    }
}

async fn post_to_facebook(
    page: &impl FeedPublisher,
    mode: FacebookMode,
    offers: &[Offer],
) -> Result<(), Error> {
    match mode {
        FacebookMode::Digest => {
            publish_digest(page, offers).await?;
        }
        FacebookMode::Each => {
            let posted = publish_each(page, offers).await?;
            log::info!("Made {posted} Facebook posts");
        }
    }
    Ok(())
}

async fn publish_site(
    config: &Config,
    latest: &[Offer],
    history: &History,
) -> Result<usize, Error> {
    let template = match &config.site_template {
        Some(path) => Some(read_template(path)?),
        None => None,
    };

    let artifacts = build_artifacts(SiteInput {
        latest,
        history,
        template: template.as_deref(),
        site_url: &config.site_url,
        now: Utc::now(),
    })?;
    write_artifacts(&config.site_dir, &artifacts)?;

    match &config.ftp {
        Some(ftp) => {
            log::info!("Uploading {} files to {}", artifacts.len(), ftp.host);
            upload_site(ftp, artifacts).await
        }
        None => {
            log::info!("No FTP configuration, site only written locally");
            Ok(0)
        }
    }
}

fn read_template(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("can't read site template {}: {e}", path.display()))
    })
}

/// Scan the source channels, forward new deals and publish them everywhere configured.
///
/// # Errors
///
/// See [`run_with`].
pub async fn run(config: &Config, store: &impl CacheStore) -> Result<RunSummary, Error> {
    run_with(config, store, &Outlets::from_config(config)?).await
}

/// [`run`] against the given outlets.
///
/// Stages after the scan don't stop each other: a failed Facebook post still leaves
/// the site to be built and uploaded.
///
/// # Errors
///
/// Fails if the scan hits a fatal error such as the bot token being rejected.
/// The seen-message cache is saved to `store` either way.
pub async fn run_with<S, F, P>(
    config: &Config,
    store: &impl CacheStore,
    outlets: &Outlets<S, F, P>,
) -> Result<RunSummary, Error>
where
    S: ChannelSource,
    F: Forwarder,
    P: FeedPublisher,
{
    let mut cache = store.load();

    log::info!("Scanning {} channels", config.source_channels.len());
    let scan = scan_channels(
        &outlets.source,
        &outlets.forwarder,
        &mut cache,
        ScanParams {
            channels: &config.source_channels,
            limit: config.message_limit,
            tag: &config.affiliate_tag,
        },
    )
    .await;

    if let Err(e) = store.save(&cache) {
        log::error!("Failed to save cache: {e}");
    }

    let scan = scan?;
    let mut summary = RunSummary {
        published: scan.published(),
        failed_channels: scan.failed_channels().map(ToString::to_string).collect(),
        ..Default::default()
    };

    let mut offers = scan.into_offers();
    offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let latest = if offers.is_empty() {
        log::info!("No new offers this run");
        load_offers(&config.latest_json)
    } else {
        let latest: Vec<Offer> = offers.iter().take(config.latest_limit).cloned().collect();
        if let Err(e) = save_offers(&config.latest_json, &latest) {
            summary.stage_failed("saving latest offers", &Error::from(e));
        }
        latest
    };

    if !offers.is_empty() {
        match &outlets.facebook {
            Some((page, mode)) => {
                if let Err(e) = post_to_facebook(page, *mode, &offers).await {
                    summary.stage_failed("Facebook", &e);
                }
            }
            None => log::info!("No Facebook page configured, not posting there"),
        }

        if let Some(chat) = &config.digest_chat {
            if let Err(e) = announce_digest(
                &outlets.bot,
                chat.clone(),
                &offers,
                Some(&config.site_url),
                &config.target_channel,
            )
            .await
            {
                summary.stage_failed("digest", &e);
            }
        }
    }

    let mut history = History::load(&config.history_file);
    history.merge(&offers, config.history_limit);
    if let Err(e) = history.save(&config.history_file) {
        summary.stage_failed("saving history", &Error::from(e));
    }

    match publish_site(config, &latest, &history).await {
        Ok(uploaded) => summary.uploaded = uploaded,
        Err(e) => summary.stage_failed("site", &e),
    }

    Ok(summary)
}

/// Read the configuration from the environment, run once and turn the result into an exit code.
///
/// Exits with 2 on bad configuration or rejected credentials, 1 on timeout or other failure.
pub async fn entry() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(2);
        }
    };
    log::debug!("{config:?}");

    let store = JsonFileCache::new(&config.cache_file, config.cache_window);

    match tokio::time::timeout(config.run_timeout, run(&config, &store)).await {
        Err(_) => {
            log::warn!("{}", Error::Timeout(config.run_timeout.as_secs()));
            ExitCode::from(1)
        }
        Ok(Err(e)) if e.is_fatal() => {
            log::error!("{e}");
            ExitCode::from(2)
        }
        Ok(Err(e)) => {
            log::error!("Run failed: {e}");
            ExitCode::from(1)
        }
        Ok(Ok(summary)) => {
            if !summary.failed_channels.is_empty() {
                log::warn!("Couldn't scan: {}", summary.failed_channels.join(", "));
            }
            log::info!(
                "Done: {} new offers published, {} site files uploaded, {} stages failed",
                summary.published,
                summary.uploaded,
                summary.failed_stages.len()
            );
            ExitCode::SUCCESS
        }
    }
}
