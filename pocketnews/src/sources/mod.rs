//! Source clients: fetch and normalize raw items from one external source kind each.
//!
//! Clients never fail to the caller. Transport, parse and format problems are logged and
//! produce an empty batch.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use crate::models::RawArticle;

pub mod headlines;
pub mod rss;

/// Title used by the headline API for withdrawn articles.
pub const REMOVED_SENTINEL: &str = "[Removed]";

/// Builds the shared HTTP client; every request it makes is bounded by `timeout_secs`.
pub fn http_client(timeout_secs: u64, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .context("failed to build reqwest client")
}

/// Drops inline HTML markup, keeping only the text nodes.
pub fn strip_markup(text: &str) -> String {
    let fragment = scraper::Html::parse_fragment(text);
    let plain: String = fragment.root_element().text().collect();
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a normalized item may proceed to enrichment.
pub fn is_usable(raw: &RawArticle) -> bool {
    let title = raw.title.trim();
    if title.is_empty() || title == REMOVED_SENTINEL {
        return false;
    }
    if raw.source_url.trim().is_empty() {
        return false;
    }
    let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    present(&raw.description) || present(&raw.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, description: Option<&str>, content: Option<&str>) -> RawArticle {
        RawArticle {
            title: title.to_string(),
            description: description.map(str::to_string),
            content: content.map(str::to_string),
            image_url: None,
            source_url: "https://example.com/story".to_string(),
            source_name: None,
        }
    }

    #[test]
    fn strips_inline_markup() {
        assert_eq!(strip_markup("<b>Breaking</b>: <a href=\"x\">markets</a> rally"), "Breaking: markets rally");
        assert_eq!(strip_markup("plain &amp; simple"), "plain & simple");
        assert_eq!(strip_markup("  spaced\n out  "), "spaced out");
    }

    #[test]
    fn rejects_blank_removed_and_empty_items() {
        assert!(is_usable(&raw("Title", Some("desc"), None)));
        assert!(is_usable(&raw("Title", None, Some("body"))));
        assert!(!is_usable(&raw("   ", Some("desc"), None)));
        assert!(!is_usable(&raw("[Removed]", Some("desc"), None)));
        assert!(!is_usable(&raw("Title", None, None)));
        assert!(!is_usable(&raw("Title", Some("  "), None)));
    }
}
