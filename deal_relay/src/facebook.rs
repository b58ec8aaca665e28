use std::{fmt::Debug, future::Future, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::{error::Error, offer::Offer};

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";
/// Offers listed in a single digest post.
pub const DIGEST_OFFERS: usize = 10;
/// Posts made per run in [`FacebookMode::Each`].
pub const EACH_OFFERS: usize = 5;

/// Graph API error code for an expired or revoked access token.
const OAUTH_EXCEPTION_CODE: i64 = 190;

/// How new offers are posted to the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FacebookMode {
    /// A single post listing all new offers, with a photo if there is one.
    #[default]
    Digest,
    /// A text post per offer.
    Each,
}

impl FromStr for FacebookMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digest" => Ok(FacebookMode::Digest),
            "each" => Ok(FacebookMode::Each),
            other => Err(Error::Config(format!(
                "unknown Facebook post mode {other:?}, expected \"digest\" or \"each\""
            ))),
        }
    }
}

/// Something that can publish posts to a social feed. Returns the new post's ID.
pub trait FeedPublisher {
    fn post_text(&self, message: &str) -> impl Future<Output = Result<String, Error>> + Send;

    fn post_photo(
        &self,
        caption: &str,
        image_url: &str,
    ) -> impl Future<Output = Result<String, Error>> + Send;
}

/// A Facebook page, posted to through the Graph API.
#[derive(Clone)]
pub struct FacebookPage {
    client: reqwest::Client,
    api_base: String,
    page_id: String,
    token: String,
}

impl Debug for FacebookPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookPage")
            .field("api_base", &self.api_base)
            .field("page_id", &self.page_id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    id: Option<String>,
    /// `/photos` answers with the ID of the photo and of the post it made.
    post_id: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

impl FacebookPage {
    pub fn new(page_id: String, token: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: GRAPH_API_BASE.to_string(),
            page_id,
            token,
        })
    }

    async fn post_form(&self, edge: &str, fields: &[(&str, &str)]) -> Result<String, Error> {
        let url = format!("{}/{}/{}", self.api_base, self.page_id, edge);

        let mut form = fields.to_vec();
        form.push(("access_token", self.token.as_str()));

        let body: GraphResponse = self.client.post(url).form(&form).send().await?.json().await?;
        graph_result(body)
    }
}

impl FeedPublisher for FacebookPage {
    async fn post_text(&self, message: &str) -> Result<String, Error> {
        self.post_form("feed", &[("message", message)]).await
    }

    async fn post_photo(&self, caption: &str, image_url: &str) -> Result<String, Error> {
        self.post_form("photos", &[("caption", caption), ("url", image_url)])
            .await
    }
}

fn graph_result(body: GraphResponse) -> Result<String, Error> {
    if let Some(error) = body.error {
        if error.code == OAUTH_EXCEPTION_CODE {
            return Err(Error::Auth {
                service: "facebook",
                message: error.message,
                hint: "the page token expired or was revoked; generate a new FB_PAGE_TOKEN",
            });
        }
        return Err(Error::Facebook {
            code: error.code,
            message: error.message,
        });
    }

    body.post_id.or(body.id).ok_or_else(|| Error::Facebook {
        code: 0,
        message: "response had neither an ID nor an error".to_string(),
    })
}

/// Text of a digest post listing up to [`DIGEST_OFFERS`] offers.
#[must_use]
pub fn render_digest_post(offers: &[Offer]) -> String {
    let mut text = String::from("🔥 Ultime offerte Amazon\n\n");
    for offer in offers.iter().take(DIGEST_OFFERS) {
        if offer.price.is_empty() {
            text.push_str(&format!("• {}\n{}\n\n", offer.title, offer.url));
        } else {
            text.push_str(&format!("• {} – {}\n{}\n\n", offer.title, offer.price, offer.url));
        }
    }
    text.trim_end().to_string()
}

/// Text of a post about a single offer.
#[must_use]
pub fn render_offer_post(offer: &Offer) -> String {
    [offer.title.as_str(), offer.price.as_str(), offer.url.as_str()]
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Make one post about all the offers. Uses the first real product photo if there is one,
/// and falls back to a text-only post if posting the photo fails.
///
/// Returns the post ID, or [`None`] if there was nothing to post.
pub async fn publish_digest(
    publisher: &impl FeedPublisher,
    offers: &[Offer],
) -> Result<Option<String>, Error> {
    if offers.is_empty() {
        log::info!("No offers to publish on Facebook");
        return Ok(None);
    }

    let text = render_digest_post(offers);

    if let Some(image) = offers
        .iter()
        .take(DIGEST_OFFERS)
        .find(|o| o.has_photo())
        .and_then(|o| o.image.as_deref())
    {
        match publisher.post_photo(&text, image).await {
            Ok(id) => {
                log::info!("Published Facebook digest with photo: {id}");
                return Ok(Some(id));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::warn!("Facebook photo post failed, posting text only: {e}"),
        }
    }

    let id = publisher.post_text(&text).await?;
    log::info!("Published Facebook digest: {id}");
    Ok(Some(id))
}

/// Post each offer on its own, up to [`EACH_OFFERS`]. A failed post doesn't stop the rest.
///
/// Returns how many posts were made.
pub async fn publish_each(
    publisher: &impl FeedPublisher,
    offers: &[Offer],
) -> Result<usize, Error> {
    let mut published = 0;

    for offer in offers.iter().take(EACH_OFFERS) {
        match publisher.post_text(&render_offer_post(offer)).await {
            Ok(id) => {
                log::info!("Published on Facebook: {} ({id})", offer.title);
                published += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::warn!("Facebook post for {} failed: {e}", offer.title),
        }
    }

    Ok(published)
}
