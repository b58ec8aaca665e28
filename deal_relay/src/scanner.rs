use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
    affiliate::{is_amazon_mention, rewrite_text, AffiliateTag},
    cache::SeenCache,
    error::Error,
    offer::{extract_offer, offer_id, Offer},
    text::normalize,
};

/// A message as read from a source channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub channel: String,
    /// Message ID, unique within its channel.
    pub id: u64,
    /// Text or caption. Photo-only posts have none.
    pub text: Option<String>,
    pub photo: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Where deal messages are read from.
pub trait ChannelSource {
    /// Up to `limit` of the most recent messages of `channel`, newest first.
    fn recent_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<SourceMessage>, Error>> + Send;
}

/// Where rewritten deal messages are posted to.
pub trait Forwarder {
    fn forward(&self, text: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// What happened to a single source channel during a scan.
#[derive(Debug)]
pub enum ChannelOutcome {
    Done(Vec<Offer>),
    /// The channel broke partway. Offers forwarded before that are still listed.
    Failed {
        reason: String,
        published: Vec<Offer>,
    },
}

impl ChannelOutcome {
    #[must_use]
    pub fn offers(&self) -> &[Offer] {
        match self {
            ChannelOutcome::Done(offers) => offers,
            ChannelOutcome::Failed { published, .. } => published,
        }
    }

    fn into_offers(self) -> Vec<Offer> {
        match self {
            ChannelOutcome::Done(offers) => offers,
            ChannelOutcome::Failed { published, .. } => published,
        }
    }
}

#[derive(Debug)]
pub struct ChannelReport {
    pub channel: String,
    pub outcome: ChannelOutcome,
}

/// Per-channel results of a whole scan.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub reports: Vec<ChannelReport>,
}

impl ScanSummary {
    /// Number of messages forwarded across all channels.
    #[must_use]
    pub fn published(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.offers().len()).sum()
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &str> + '_ {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, ChannelOutcome::Failed { .. }))
            .map(|r| r.channel.as_str())
    }

    /// All offers, in the order they were forwarded.
    #[must_use]
    pub fn into_offers(self) -> Vec<Offer> {
        self.reports
            .into_iter()
            .flat_map(|r| r.outcome.into_offers())
            .collect()
    }
}

/// What to scan and how.
#[derive(Debug, Clone, Copy)]
pub struct ScanParams<'a> {
    pub channels: &'a [String],
    /// Messages fetched per channel.
    pub limit: usize,
    pub tag: &'a AffiliateTag,
}

/// Go over every channel, forward new Amazon deals and collect their offers.
///
/// Every forwarded message is remembered in `cache` right away, so the same deal
/// reposted by another channel later in the scan is skipped too.
///
/// # Errors
///
/// Only fatal errors (see [`Error::is_fatal`]) are returned. Anything else is
/// recorded as a [`ChannelOutcome::Failed`] and the scan moves on to the next channel.
pub async fn scan_channels(
    source: &impl ChannelSource,
    forwarder: &impl Forwarder,
    cache: &mut SeenCache,
    params: ScanParams<'_>,
) -> Result<ScanSummary, Error> {
    let mut summary = ScanSummary::default();

    for channel in params.channels {
        let mut published = Vec::new();

        let outcome = match scan_channel(source, forwarder, cache, channel, params, &mut published)
            .await
        {
            Ok(()) => {
                log::debug!("{}: {} new offers", channel, published.len());
                ChannelOutcome::Done(published)
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Error with channel {}: {}", channel, e);
                ChannelOutcome::Failed {
                    reason: e.to_string(),
                    published,
                }
            }
        };

        summary.reports.push(ChannelReport {
            channel: channel.clone(),
            outcome,
        });
    }

    Ok(summary)
}

async fn scan_channel(
    source: &impl ChannelSource,
    forwarder: &impl Forwarder,
    cache: &mut SeenCache,
    channel: &str,
    params: ScanParams<'_>,
    published: &mut Vec<Offer>,
) -> Result<(), Error> {
    let messages = source.recent_messages(channel, params.limit).await?;

    for message in messages {
        let Some(text) = message.text.as_deref().map(str::trim) else {
            continue;
        };
        if text.is_empty() || !is_amazon_mention(text) {
            continue;
        }

        let id = offer_id(channel, message.id);
        let fingerprint = normalize(text);
        if cache.contains(&id, &fingerprint) {
            log::trace!("Already relayed {id}");
            continue;
        }

        forwarder.forward(&rewrite_text(text, params.tag)).await?;

        let offer = extract_offer(text, params.tag).with_source(
            channel,
            message.id,
            message.photo.as_deref(),
            message.date.unwrap_or_else(Utc::now),
        );
        log::info!("Relayed {}: {}", id, offer.title);

        published.push(offer);
        cache.remember(id, fingerprint);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::{collections::HashMap, sync::Mutex};

    use super::*;

    #[derive(Default)]
    struct FakeSource {
        channels: HashMap<String, Vec<SourceMessage>>,
    }

    impl FakeSource {
        fn with(mut self, channel: &str, texts: &[(u64, &str)]) -> Self {
            let messages = texts
                .iter()
                .map(|(id, text)| SourceMessage {
                    channel: channel.to_string(),
                    id: *id,
                    text: Some(text.to_string()),
                    photo: None,
                    date: None,
                })
                .collect();
            self.channels.insert(channel.to_string(), messages);
            self
        }
    }

    impl ChannelSource for FakeSource {
        async fn recent_messages(
            &self,
            channel: &str,
            limit: usize,
        ) -> Result<Vec<SourceMessage>, Error> {
            match self.channels.get(channel) {
                Some(messages) => Ok(messages.iter().take(limit).cloned().collect()),
                None => Err(Error::Page {
                    channel: channel.to_string(),
                    reason: "no such channel".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct FakeForwarder {
        sent: Mutex<Vec<String>>,
        /// Fail any message containing this.
        fail_on: Option<&'static str>,
        fail_fatally: bool,
    }

    impl Forwarder for FakeForwarder {
        async fn forward(&self, text: &str) -> Result<(), Error> {
            if self.fail_on.is_some_and(|f| text.contains(f)) {
                return Err(if self.fail_fatally {
                    Error::Auth {
                        service: "telegram",
                        message: "Unauthorized".to_string(),
                        hint: "check TELEGRAM_TOKEN",
                    }
                } else {
                    Error::Page {
                        channel: "target".to_string(),
                        reason: "flaky".to_string(),
                    }
                });
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn relays_only_new_amazon_messages() {
        let source = FakeSource::default().with(
            "prezzitech",
            &[
                (3, "Cuffie https://www.amazon.it/dp/A?tag=other-21 a 19,99€"),
                (2, "Buongiorno a tutti!"),
                (1, "Mouse https://www.amazon.it/dp/B 5€"),
            ],
        );
        let forwarder = FakeForwarder::default();
        let tag = AffiliateTag::new("mytag-21").unwrap();
        let names = channels(&["prezzitech"]);
        let params = ScanParams {
            channels: &names,
            limit: 10,
            tag: &tag,
        };

        let mut cache = SeenCache::default();
        let summary = scan_channels(&source, &forwarder, &mut cache, params)
            .await
            .unwrap();

        assert_eq!(summary.published(), 2);
        let sent = forwarder.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            [
                "Cuffie https://www.amazon.it/dp/A?tag=mytag-21 a 19,99€",
                "Mouse https://www.amazon.it/dp/B?tag=mytag-21 5€",
            ]
        );

        let offers = summary.into_offers();
        assert_eq!(offers[0].id.as_deref(), Some("prezzitech_3"));
        assert_eq!(offers[0].price, "19.99 €");
        assert_eq!(cache.ids, ["prezzitech_3", "prezzitech_1"]);

        // A second run with the same cache relays nothing.
        let summary = scan_channels(&source, &forwarder, &mut cache, params)
            .await
            .unwrap();
        assert_eq!(summary.published(), 0);
        assert_eq!(forwarder.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn same_deal_in_two_channels_is_relayed_once() {
        let source = FakeSource::default()
            .with("a", &[(10, "Cuffie https://www.amazon.it/dp/A?tag=x 19€")])
            .with("b", &[(77, "cuffie   https://www.amazon.it/dp/A?tag=y  19€")]);
        let forwarder = FakeForwarder::default();
        let tag = AffiliateTag::new("mytag-21").unwrap();
        let names = channels(&["a", "b"]);

        let mut cache = SeenCache::default();
        let summary = scan_channels(
            &source,
            &forwarder,
            &mut cache,
            ScanParams {
                channels: &names,
                limit: 10,
                tag: &tag,
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.published(), 1);
        assert!(summary.reports[1].outcome.offers().is_empty());
    }

    #[tokio::test]
    async fn broken_channel_does_not_stop_the_scan() {
        let source = FakeSource::default()
            .with(
                "flaky",
                &[
                    (1, "Primo https://www.amazon.it/dp/1"),
                    (2, "ROTTO https://www.amazon.it/dp/2"),
                    (3, "Terzo https://www.amazon.it/dp/3"),
                ],
            )
            .with("ok", &[(5, "Quinto https://www.amazon.it/dp/5")]);
        let forwarder = FakeForwarder {
            fail_on: Some("ROTTO"),
            ..Default::default()
        };
        let tag = AffiliateTag::new("mytag-21").unwrap();
        let names = channels(&["missing", "flaky", "ok"]);

        let mut cache = SeenCache::default();
        let summary = scan_channels(
            &source,
            &forwarder,
            &mut cache,
            ScanParams {
                channels: &names,
                limit: 10,
                tag: &tag,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            summary.failed_channels().collect::<Vec<_>>(),
            ["missing", "flaky"]
        );
        match &summary.reports[1].outcome {
            ChannelOutcome::Failed { published, .. } => {
                assert_eq!(published.len(), 1);
                assert_eq!(published[0].id.as_deref(), Some("flaky_1"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(summary.published(), 2);
        // The failed message is not remembered, so the next run tries it again.
        assert_eq!(cache.ids, ["flaky_1", "ok_5"]);
    }

    #[tokio::test]
    async fn fatal_errors_abort() {
        let source = FakeSource::default()
            .with("a", &[(1, "X https://www.amazon.it/dp/1")])
            .with("b", &[(2, "Y https://www.amazon.it/dp/2")]);
        let forwarder = FakeForwarder {
            fail_on: Some("amazon"),
            fail_fatally: true,
            ..Default::default()
        };
        let tag = AffiliateTag::new("mytag-21").unwrap();
        let names = channels(&["a", "b"]);

        let mut cache = SeenCache::default();
        let result = scan_channels(
            &source,
            &forwarder,
            &mut cache,
            ScanParams {
                channels: &names,
                limit: 10,
                tag: &tag,
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Auth { .. })));
        assert!(cache.ids.is_empty());
    }

    #[tokio::test]
    async fn limit_is_respected() {
        let source = FakeSource::default().with(
            "a",
            &[
                (3, "C https://www.amazon.it/dp/3"),
                (2, "B https://www.amazon.it/dp/2"),
                (1, "A https://www.amazon.it/dp/1"),
            ],
        );
        let forwarder = FakeForwarder::default();
        let tag = AffiliateTag::new("mytag-21").unwrap();
        let names = channels(&["a"]);

        let mut cache = SeenCache::default();
        let summary = scan_channels(
            &source,
            &forwarder,
            &mut cache,
            ScanParams {
                channels: &names,
                limit: 2,
                tag: &tag,
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.published(), 2);
        assert_eq!(cache.ids, ["a_3", "a_2"]);
    }
}
