// Translation of catalog rows, cached per (news, language)
use anyhow::{Context, Result};
use common::TranslationConfig;
use reqwest::Client;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::models::NewsItem;
use crate::storage::translations::{self, CachedTranslation};

pub const DEFAULT_BASE_LANGUAGE: &str = "en";

/// Client for a GET-style translation backend (`?q=..&langpair=base|target`).
#[derive(Clone)]
pub struct Translator {
    client: Client,
    api_url: String,
    base_language: String,
}

impl Translator {
    pub fn new(client: Client, api_url: impl Into<String>, base_language: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            base_language: base_language.into(),
        }
    }

    pub fn from_config(client: Client, config: &TranslationConfig) -> Self {
        Self::new(
            client,
            &config.api_url,
            config.base_language.as_deref().unwrap_or(DEFAULT_BASE_LANGUAGE),
        )
    }

    pub fn base_language(&self) -> &str {
        &self.base_language
    }

    pub async fn translate(&self, text: &str, target: &str) -> Result<String> {
        if target.eq_ignore_ascii_case(&self.base_language) {
            return Ok(text.to_string());
        }

        let langpair = format!("{}|{}", self.base_language, target);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("q", text), ("langpair", langpair.as_str())])
            .send()
            .await
            .context("translation request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("translation API returned status: {}", status);
        }

        let body: TranslationResponse = response
            .json()
            .await
            .context("failed to decode translation response")?;
        body.response_data
            .and_then(|d| d.translated_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("translation response has no translatedText"))
    }
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    #[serde(rename = "responseData")]
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

/// Serves items in a requested language, falling back to the stored text on any failure.
#[derive(Clone)]
pub struct Localizer {
    pool: SqlitePool,
    translator: Option<Translator>,
}

impl Localizer {
    pub fn new(pool: SqlitePool, translator: Option<Translator>) -> Self {
        Self { pool, translator }
    }

    fn base_language(&self) -> &str {
        self.translator
            .as_ref()
            .map(Translator::base_language)
            .unwrap_or(DEFAULT_BASE_LANGUAGE)
    }

    pub async fn localize(&self, mut item: NewsItem, language: Option<&str>) -> NewsItem {
        let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty()) else {
            return item;
        };
        let lang = lang.to_ascii_lowercase();
        if lang == self.base_language().to_ascii_lowercase() {
            return item;
        }
        let Some(translator) = self.translator.as_ref() else {
            return item;
        };

        match self.cached_or_translate(translator, &item, &lang).await {
            Ok(t) => {
                item.short_headline = t.short_headline;
                item.short_content = t.short_content;
            }
            Err(e) => warn!(id = item.id, lang = %lang, "translation failed, serving original text: {:#}", e),
        }
        item
    }

    pub async fn localize_all(&self, items: Vec<NewsItem>, language: Option<&str>) -> Vec<NewsItem> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.localize(item, language).await);
        }
        out
    }

    async fn cached_or_translate(&self, translator: &Translator, item: &NewsItem, lang: &str) -> Result<CachedTranslation> {
        if let Some(hit) = translations::find(&self.pool, item.id, lang).await? {
            debug!(id = item.id, lang, "translation cache hit");
            return Ok(hit);
        }

        let fresh = CachedTranslation {
            short_headline: translator.translate(&item.short_headline, lang).await?,
            short_content: translator.translate(&item.short_content, lang).await?,
        };
        Ok(translations::insert_or_get(&self.pool, item.id, lang, &fresh).await?)
    }
}
