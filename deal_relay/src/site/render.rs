use std::{fs, io, path::Path};

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use url::Url;

use crate::{
    error::Error,
    offer::{Offer, DEFAULT_IMAGE},
    site::history::History,
};

pub const OFFERS_START: &str = "<!-- OFFERTE_START -->";
pub const OFFERS_END: &str = "<!-- OFFERTE_END -->";

pub const INDEX_PAGE: &str = "index.html";
pub const ARCHIVE_PAGE: &str = "archivio.html";
pub const LATEST_JSON: &str = "latest_offers.json";
pub const FEED: &str = "feed.xml";
pub const SITEMAP: &str = "sitemap.xml";

/// Items in the RSS feed.
pub const FEED_ITEMS: usize = 50;

/// Page used when no template is configured, or the configured one lacks the markers.
const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="it">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offerte Amazon</title>
<link rel="alternate" type="application/rss+xml" title="Offerte Amazon" href="feed.xml">
<style>
body { font-family: sans-serif; max-width: 900px; margin: 0 auto; padding: 1em; }
.offer { border-bottom: 1px solid #ddd; padding: 1em 0; overflow: hidden; }
.offer img { max-width: 150px; float: left; margin-right: 15px; border-radius: 8px; }
.offer .price { color: #00bfff; font-weight: bold; }
</style>
</head>
<body>
<!-- OFFERTE_START -->
<!-- OFFERTE_END -->
<p><a href="archivio.html">Archivio offerte</a></p>
</body>
</html>
"#;

/// A generated site file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    fn new(name: &'static str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            bytes: bytes.into(),
        }
    }
}

fn offer_card(offer: &Offer) -> String {
    let image = offer.image.as_deref().unwrap_or(DEFAULT_IMAGE);
    let price = if offer.price.is_empty() {
        String::new()
    } else {
        format!(
            "<br>\n    <span class=\"price\">{}</span>",
            encode_text(&offer.price)
        )
    };

    format!(
        "<div class=\"offer\">\n  <a href=\"{url}\" target=\"_blank\" rel=\"nofollow sponsored noopener\">\n    <img src=\"{image}\" alt=\"{alt}\" loading=\"lazy\">\n    <strong>{title}</strong>{price}\n  </a>\n</div>\n",
        url = encode_double_quoted_attribute(&offer.url),
        image = encode_double_quoted_attribute(image),
        alt = encode_double_quoted_attribute(&offer.title),
        title = encode_text(&offer.title),
    )
}

/// HTML block with a heading and a card per offer.
#[must_use]
pub fn render_offers_html(offers: &[Offer], updated_at: DateTime<Utc>) -> String {
    let mut html = format!(
        "\n<h2>🔥 Offerte Amazon (aggiornate {})</h2>\n",
        updated_at.format("%H:%M %d/%m/%Y")
    );
    for offer in offers {
        html.push_str(&offer_card(offer));
    }
    html
}

fn splice(template: &str, fragment: &str) -> Option<String> {
    let start = template.find(OFFERS_START)? + OFFERS_START.len();
    let end = start + template[start..].find(OFFERS_END)?;
    Some(format!("{}{}{}", &template[..start], fragment, &template[end..]))
}

/// Replace whatever is between the offer markers in `template` with `fragment`.
///
/// If the markers are missing the built-in page is used instead.
#[must_use]
pub fn inject_offers(template: &str, fragment: &str) -> String {
    splice(template, fragment).unwrap_or_else(|| {
        log::warn!("Template has no {OFFERS_START}/{OFFERS_END} markers, using the built-in page");
        splice(DEFAULT_TEMPLATE, fragment).unwrap_or_default()
    })
}

/// Page listing every offer in the history.
#[must_use]
pub fn render_archive_html(history: &History, updated_at: DateTime<Utc>) -> String {
    let mut fragment = format!(
        "\n<h1>Archivio offerte</h1>\n<p>{} offerte, aggiornato {}</p>\n",
        history.offers().len(),
        updated_at.format("%H:%M %d/%m/%Y")
    );
    for offer in history.offers() {
        fragment.push_str(&offer_card(offer));
    }
    fragment.push_str("<p><a href=\"index.html\">Offerte di oggi</a></p>\n");

    inject_offers(DEFAULT_TEMPLATE, &fragment)
}

fn page_url(site: &Url, page: &str) -> String {
    format!("{}/{}", site.as_str().trim_end_matches('/'), page)
}

fn write_text_element<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// RSS 2.0 feed of the newest offers in the history.
pub fn render_rss(history: &History, site: &Url) -> Result<Vec<u8>, Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    write_text_element(&mut writer, "title", "Offerte Amazon")?;
    write_text_element(&mut writer, "link", site.as_str())?;
    write_text_element(
        &mut writer,
        "description",
        "Le migliori offerte Amazon dai canali Telegram",
    )?;
    write_text_element(&mut writer, "language", "it")?;
    if let Some(date) = history.newest().and_then(|o| o.created_at) {
        write_text_element(&mut writer, "lastBuildDate", &date.to_rfc2822())?;
    }

    for offer in history.offers().iter().take(FEED_ITEMS) {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        write_text_element(&mut writer, "title", &offer.title)?;
        write_text_element(&mut writer, "link", &offer.url)?;
        if !offer.price.is_empty() {
            write_text_element(&mut writer, "description", &offer.price)?;
        }

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(
            offer.id.as_deref().unwrap_or(&offer.url),
        )))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        if let Some(date) = offer.created_at {
            write_text_element(&mut writer, "pubDate", &date.to_rfc2822())?;
        }
        if let Some(image) = offer.image.as_deref().filter(|_| offer.has_photo()) {
            let mut enclosure = BytesStart::new("enclosure");
            enclosure.push_attribute(("url", image));
            enclosure.push_attribute(("type", "image/jpeg"));
            enclosure.push_attribute(("length", "0"));
            writer.write_event(Event::Empty(enclosure))?;
        }
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

/// Sitemap of the site's pages, dated by the newest offer.
pub fn render_sitemap(site: &Url, history: &History) -> Result<Vec<u8>, Error> {
    let lastmod = history
        .newest()
        .and_then(|o| o.created_at)
        .map(|date| date.format("%Y-%m-%d").to_string());

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut urlset = BytesStart::new("urlset");
    urlset.push_attribute(("xmlns", "http://www.sitemaps.org/schemas/sitemap/0.9"));
    writer.write_event(Event::Start(urlset))?;

    for (page, frequency) in [(INDEX_PAGE, "hourly"), (ARCHIVE_PAGE, "daily")] {
        writer.write_event(Event::Start(BytesStart::new("url")))?;
        let loc = if page == INDEX_PAGE {
            site.to_string()
        } else {
            page_url(site, page)
        };
        write_text_element(&mut writer, "loc", &loc)?;
        if let Some(lastmod) = &lastmod {
            write_text_element(&mut writer, "lastmod", lastmod)?;
        }
        write_text_element(&mut writer, "changefreq", frequency)?;
        writer.write_event(Event::End(BytesEnd::new("url")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("urlset")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

/// What goes into a site build.
#[derive(Debug, Clone, Copy)]
pub struct SiteInput<'a> {
    /// Offers for the front page, newest first.
    pub latest: &'a [Offer],
    pub history: &'a History,
    /// Front page with offer markers. [`None`] uses the built-in page.
    pub template: Option<&'a str>,
    pub site_url: &'a Url,
    pub now: DateTime<Utc>,
}

/// Render every file of the site.
pub fn build_artifacts(input: SiteInput<'_>) -> Result<Vec<Artifact>, Error> {
    let fragment = render_offers_html(input.latest, input.now);
    let index = inject_offers(input.template.unwrap_or(DEFAULT_TEMPLATE), &fragment);

    Ok(vec![
        Artifact::new(INDEX_PAGE, index),
        Artifact::new(ARCHIVE_PAGE, render_archive_html(input.history, input.now)),
        Artifact::new(LATEST_JSON, serde_json::to_vec_pretty(input.latest)?),
        Artifact::new(FEED, render_rss(input.history, input.site_url)?),
        Artifact::new(SITEMAP, render_sitemap(input.site_url, input.history)?),
    ])
}

/// Write the artifacts into `dir`, creating it if needed.
pub fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for artifact in artifacts {
        fs::write(dir.join(artifact.name), &artifact.bytes)?;
    }
    log::info!("Wrote {} site files to {}", artifacts.len(), dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn offer(id: &str, title: &str) -> Offer {
        Offer {
            title: title.to_string(),
            url: format!("https://www.amazon.it/dp/{id}?psc=1&tag=mytag-21"),
            price: "19,99 €".to_string(),
            image: Some("https://cdn4.telesco.pe/file/x.jpg".to_string()),
            id: Some(format!("prezzitech_{id}")),
            created_at: Some(now()),
        }
    }

    #[test]
    fn offers_are_escaped() {
        let html = render_offers_html(&[offer("1", "Cuffie <Pro> & \"Max\"")], now());
        assert!(html.contains("aggiornate 09:30 01/05/2024"));
        assert!(html.contains("<strong>Cuffie &lt;Pro&gt; &amp; \"Max\"</strong>"));
        assert!(html.contains("alt=\"Cuffie &lt;Pro&gt; &amp; &quot;Max&quot;\""));
        assert!(html.contains("href=\"https://www.amazon.it/dp/1?psc=1&amp;tag=mytag-21\""));
    }

    #[test]
    fn injection_replaces_only_between_markers() {
        let template = "<header>top</header>\n<!-- OFFERTE_START -->\nold offers\n<!-- OFFERTE_END -->\n<footer>end</footer>";
        let page = inject_offers(template, "NEW");
        assert_eq!(
            page,
            "<header>top</header>\n<!-- OFFERTE_START -->NEW<!-- OFFERTE_END -->\n<footer>end</footer>"
        );
        // Injecting again keeps the markers, so pages can be updated run after run.
        assert_eq!(inject_offers(&page, "NEWER").matches("NEWER").count(), 1);
    }

    #[test]
    fn missing_markers_use_the_builtin_page() {
        let page = inject_offers("<html>no markers</html>", "NEW");
        assert!(!page.contains("no markers"));
        assert!(page.contains("<!-- OFFERTE_START -->NEW<!-- OFFERTE_END -->"));

        // End marker before the start one.
        let page = inject_offers("<!-- OFFERTE_END --><!-- OFFERTE_START -->", "NEW");
        assert!(page.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn feed_is_capped_and_escaped() {
        let history = History::new(
            (0..60)
                .map(|i| offer(&i.to_string(), "Mouse & tastiera"))
                .collect(),
        );
        let site = Url::parse("https://www.techandmore.eu/").unwrap();
        let feed = String::from_utf8(render_rss(&history, &site).unwrap()).unwrap();

        assert!(feed.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert_eq!(feed.matches("<item>").count(), FEED_ITEMS);
        assert!(feed.contains("<title>Mouse &amp; tastiera</title>"));
        assert!(feed.contains("May 2024 09:30:00 +0000</pubDate>"));
        assert!(feed.contains("<guid isPermaLink=\"false\">prezzitech_0</guid>"));
        assert!(feed.contains("psc=1&amp;tag=mytag-21"));
    }

    #[test]
    fn sitemap_lists_pages() {
        let history = History::new(vec![offer("1", "A")]);
        let site = Url::parse("https://www.techandmore.eu").unwrap();
        let sitemap = String::from_utf8(render_sitemap(&site, &history).unwrap()).unwrap();

        assert!(sitemap.contains("<loc>https://www.techandmore.eu/</loc>"));
        assert!(sitemap.contains("<loc>https://www.techandmore.eu/archivio.html</loc>"));
        assert_eq!(sitemap.matches("<lastmod>2024-05-01</lastmod>").count(), 2);

        let empty = String::from_utf8(render_sitemap(&site, &History::default()).unwrap()).unwrap();
        assert!(!empty.contains("lastmod"));
    }

    #[test]
    fn builds_and_writes_every_file() {
        let latest = [offer("1", "A"), offer("2", "B")];
        let history = History::new(latest.to_vec());
        let site = Url::parse("https://www.techandmore.eu").unwrap();
        let artifacts = build_artifacts(SiteInput {
            latest: &latest,
            history: &history,
            template: None,
            site_url: &site,
            now: now(),
        })
        .unwrap();

        let names: Vec<_> = artifacts.iter().map(|a| a.name).collect();
        assert_eq!(names, [INDEX_PAGE, ARCHIVE_PAGE, LATEST_JSON, FEED, SITEMAP]);

        let json: Vec<Offer> = serde_json::from_slice(&artifacts[2].bytes).unwrap();
        assert_eq!(json, latest);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("site");
        write_artifacts(&out, &artifacts).unwrap();
        let index = fs::read_to_string(out.join(INDEX_PAGE)).unwrap();
        assert!(index.contains("<strong>B</strong>"));
    }
}
