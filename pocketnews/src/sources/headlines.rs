use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use super::is_usable;
use crate::models::RawArticle;

/// Client for the third-party top-headlines API.
#[derive(Clone)]
pub struct HeadlinesClient {
    client: Client,
    base_url: String,
    api_key: String,
    country: String,
    page_size: u32,
}

impl HeadlinesClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            country: "in".to_string(),
            page_size: 20,
        }
    }

    pub fn with_query_defaults(mut self, country: impl Into<String>, page_size: u32) -> Self {
        self.country = country.into();
        self.page_size = page_size;
        self
    }

    /// Fetches top headlines for one external category. Errors yield an empty batch.
    pub async fn fetch_top_headlines(&self, category: &str) -> Vec<RawArticle> {
        match self.try_fetch(category).await {
            Ok(items) => {
                info!(category, items = items.len(), "fetched top headlines");
                items
            }
            Err(e) => {
                error!(category, "Failed to fetch news for category: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, category: &str) -> Result<Vec<RawArticle>> {
        let url = format!("{}/top-headlines", self.base_url.trim_end_matches('/'));
        let page_size = self.page_size.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("country", self.country.as_str()),
                ("category", category),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("headline request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("headline API returned status: {}", status);
        }

        let body: HeadlinesResponse = response
            .json()
            .await
            .context("failed to decode headline API response")?;

        let articles = body
            .articles
            .into_iter()
            .filter_map(|a| {
                let raw = RawArticle {
                    title: a.title.unwrap_or_default(),
                    description: a.description,
                    content: a.content,
                    image_url: a.url_to_image,
                    source_url: a.url.unwrap_or_default(),
                    source_name: a.source.and_then(|s| s.name),
                };
                if is_usable(&raw) {
                    Some(raw)
                } else {
                    debug!(title = %raw.title, "skipping unusable headline");
                    None
                }
            })
            .collect();

        Ok(articles)
    }
}

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
struct ApiArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
    url: Option<String>,
    source: Option<ApiSource>,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    name: Option<String>,
}
