use anyhow::{Context, Result};
use common::FeedSourceConfig;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{is_usable, strip_markup};
use crate::models::RawArticle;

/// Syndication feed client (RSS 2.0 / RDF, with Atom handled through feed-rs).
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    max_retries: u32,
}

impl FeedClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_retries: 3,
        }
    }

    /// Fetches and normalizes one feed. Errors are logged and yield an empty batch.
    pub async fn fetch(&self, source: &FeedSourceConfig) -> Vec<RawArticle> {
        let result = async {
            let bytes = self.download(&source.url).await?;
            parse_feed(&bytes, source.source_name.as_deref(), &source.url)
        }
        .await;

        match result {
            Ok(items) => {
                info!(url = %source.url, items = items.len(), "fetched feed");
                items
            }
            Err(e) => {
                error!(url = %source.url, "Failed to fetch RSS feed: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
                info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, self.max_retries, backoff);
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.context("failed to read response body")?;
                        return Ok(bytes.to_vec());
                    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(anyhow::anyhow!("feed fetch failed with retryable status: {}", status));
                    } else {
                        // Client error (4xx) - likely permanent, don't retry
                        anyhow::bail!("feed fetch failed with status: {}", status);
                    }
                }
                Err(e) => {
                    last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
    }
}

/// Parses a feed document into usable raw articles.
///
/// RSS documents are scanned item by item so the image can be taken from
/// `<media:content>` before `<enclosure>`; anything else goes through feed-rs.
pub fn parse_feed(bytes: &[u8], source_name: Option<&str>, feed_url: &str) -> Result<Vec<RawArticle>> {
    let text = String::from_utf8_lossy(bytes);
    let channel = match scan_rss(&text)? {
        Some(channel) => channel,
        None => parse_with_feed_rs(bytes)?,
    };

    let source_name = source_name
        .map(str::to_string)
        .or(channel.title.clone())
        .or_else(|| url::Url::parse(feed_url).ok().and_then(|u| u.host_str().map(str::to_string)));

    let articles: Vec<RawArticle> = channel
        .items
        .into_iter()
        .filter_map(|item| {
            let raw = RawArticle {
                title: strip_markup(item.title.as_deref().unwrap_or_default()),
                description: item.description.as_deref().map(strip_markup).filter(|d| !d.is_empty()),
                content: item.content.as_deref().map(strip_markup).filter(|c| !c.is_empty()),
                image_url: item.media_url.or(item.enclosure_url),
                source_url: item.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                source_name: source_name.clone(),
            };
            if is_usable(&raw) {
                Some(raw)
            } else {
                debug!(title = %raw.title, "skipping unusable feed item");
                None
            }
        })
        .collect();

    Ok(articles)
}

#[derive(Debug, Default)]
struct Channel {
    title: Option<String>,
    items: Vec<ItemFields>,
}

#[derive(Debug, Default)]
struct ItemFields {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    link: Option<String>,
    media_url: Option<String>,
    enclosure_url: Option<String>,
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
        .filter(|v| !v.trim().is_empty())
}

/// Returns `Ok(None)` when the document is not RSS.
///
/// Each direct child of an `<item>` collects the text of everything nested in it, so
/// unescaped inline markup is flattened rather than cutting the field short.
fn scan_rss(xml: &str) -> Result<Option<Channel>> {
    let mut reader = Reader::from_str(xml);

    let mut channel = Channel::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<ItemFields> = None;
    let mut text = String::new();
    // Depth of the item field being collected, if any.
    let mut field_depth: Option<usize> = None;

    loop {
        match reader.read_event().context("malformed feed XML")? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if path.is_empty() && name.as_slice() != b"rss" && !name.ends_with(b"RDF") {
                    return Ok(None);
                }
                if let Some(item) = current.as_mut() {
                    capture_media(item, &e);
                }
                if field_depth.is_some() {
                    path.push(name);
                    text.push(' ');
                    continue;
                }
                if name.as_slice() == b"item" {
                    current = Some(ItemFields::default());
                } else if current.is_some() && path.last().map(Vec::as_slice) == Some(&b"item"[..]) {
                    field_depth = Some(path.len() + 1);
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                if let Some(item) = current.as_mut() {
                    capture_media(item, &e);
                }
                if field_depth.is_some() {
                    text.push(' ');
                }
            }
            Event::Text(e) => {
                let chunk = e
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                text.push_str(&chunk);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(_) => {
                let depth = path.len();
                let Some(name) = path.pop() else { continue };
                match field_depth {
                    Some(d) if depth > d => {
                        text.push(' ');
                        continue;
                    }
                    Some(_) => field_depth = None,
                    None => {}
                }
                let parent = path.last().map(Vec::as_slice);
                let value = std::mem::take(&mut text);

                match (parent, name.as_slice()) {
                    (_, b"item") => {
                        if let Some(item) = current.take() {
                            channel.items.push(item);
                        }
                    }
                    (Some(b"item"), field) => {
                        if let Some(item) = current.as_mut() {
                            let slot = match field {
                                b"title" => &mut item.title,
                                b"description" => &mut item.description,
                                b"link" => &mut item.link,
                                b"content:encoded" => &mut item.content,
                                _ => continue,
                            };
                            if slot.is_none() {
                                *slot = Some(value);
                            }
                        }
                    }
                    (Some(b"channel"), b"title") if channel.title.is_none() => {
                        channel.title = Some(strip_markup(&value)).filter(|t| !t.is_empty());
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if path.is_empty() && channel.items.is_empty() && channel.title.is_none() {
        // Nothing recognizable was read (e.g. an empty document).
        return Ok(None);
    }
    Ok(Some(channel))
}

fn capture_media(item: &mut ItemFields, e: &BytesStart) {
    match e.name().as_ref() {
        b"media:content" if item.media_url.is_none() => item.media_url = attr_value(e, b"url"),
        b"enclosure" if item.enclosure_url.is_none() => item.enclosure_url = attr_value(e, b"url"),
        _ => {}
    }
}

fn parse_with_feed_rs(bytes: &[u8]) -> Result<Channel> {
    let feed = feed_rs::parser::parse(bytes).context("failed to parse feed")?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| ItemFields {
            title: entry.title.map(|t| t.content),
            description: entry.summary.map(|s| s.content),
            content: entry.content.and_then(|c| c.body),
            link: entry.links.first().map(|l| l.href.clone()),
            media_url: entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| c.url.as_ref().map(|u| u.to_string())),
            enclosure_url: None,
        })
        .collect();

    Ok(Channel {
        title: feed.title.map(|t| t.content),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Daily Wire Service</title>
    <item>
      <title><![CDATA[<b>Markets</b> rally on rate hopes]]></title>
      <description>&lt;p&gt;Stocks rose &lt;i&gt;sharply&lt;/i&gt; on Monday.&lt;/p&gt;</description>
      <link>https://news.example.com/markets</link>
      <enclosure url="https://img.example.com/enclosure.jpg" type="image/jpeg" length="1"/>
      <media:content url="https://img.example.com/media.jpg" medium="image"/>
    </item>
    <item>
      <title>Election results due</title>
      <description>Counting continues overnight.</description>
      <link>https://news.example.com/election</link>
      <enclosure url="https://img.example.com/election.jpg" type="image/jpeg" length="1"/>
    </item>
    <item>
      <title>Headline only</title>
      <link>https://news.example.com/empty</link>
    </item>
    <item>
      <title>   </title>
      <description>No title here</description>
      <link>https://news.example.com/untitled</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items_with_image_precedence() {
        let items = parse_feed(RSS.as_bytes(), None, "https://news.example.com/rss").expect("parse");
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "Markets rally on rate hopes");
        assert_eq!(items[0].description.as_deref(), Some("Stocks rose sharply on Monday."));
        assert_eq!(items[0].image_url.as_deref(), Some("https://img.example.com/media.jpg"));
        assert_eq!(items[0].source_url, "https://news.example.com/markets");
        assert_eq!(items[0].source_name.as_deref(), Some("Daily Wire Service"));

        assert_eq!(items[1].image_url.as_deref(), Some("https://img.example.com/election.jpg"));
    }

    #[test]
    fn unescaped_inline_markup_keeps_surrounding_text() {
        let rss = r#"<rss version="2.0"><channel><title>Wire</title>
<item><title>Markets <b>rally</b> today</title><description>Stocks <i>rose</i> sharply on Monday.<br/>More later.</description><link>https://news.example.com/rally</link></item>
</channel></rss>"#;
        let items = parse_feed(rss.as_bytes(), None, "https://news.example.com/rss").expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Markets rally today");
        assert_eq!(items[0].description.as_deref(), Some("Stocks rose sharply on Monday. More later."));
        assert_eq!(items[0].source_url, "https://news.example.com/rally");
    }

    #[test]
    fn configured_source_name_wins() {
        let items = parse_feed(RSS.as_bytes(), Some("Wire"), "https://news.example.com/rss").expect("parse");
        assert!(items.iter().all(|i| i.source_name.as_deref() == Some("Wire")));
    }

    #[test]
    fn atom_documents_use_feed_rs() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Source</title>
  <id>urn:example:feed</id>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <title>Atom story</title>
    <id>urn:example:1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <link href="https://atom.example.com/story"/>
    <summary>An atom summary.</summary>
  </entry>
</feed>"#;
        let items = parse_feed(atom.as_bytes(), None, "https://atom.example.com/feed").expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom story");
        assert_eq!(items[0].source_url, "https://atom.example.com/story");
        assert_eq!(items[0].description.as_deref(), Some("An atom summary."));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed(b"<rss><channel><item></channel>", None, "https://x.example").is_err());
    }
}
