// Enrichment: short headline + summary (and optionally category / near-duplicate flag)
use std::sync::Arc;
use tracing::{debug, warn};

use super::{LlmProvider, LlmRequest};

pub const HEADLINE_MAX_WORDS: usize = 10;
pub const SUMMARY_MAX_WORDS: usize = 60;
pub const ELLIPSIS: &str = "...";

const HEADLINE_LABEL: &str = "SHORT_HEADLINE:";
const CONTENT_LABEL: &str = "SHORT_CONTENT:";
const CATEGORY_LABEL: &str = "CATEGORY:";
const DUPLICATE_LABEL: &str = "DUPLICATE:";

/// Generated headline and summary for one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub short_headline: String,
    pub short_content: String,
    /// True when the backend failed and the deterministic truncation was used.
    pub fell_back: bool,
}

/// Enrichment plus the category/duplicate verdict used by the syndication path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub enrichment: Enrichment,
    pub category_slug: String,
    pub is_duplicate: bool,
}

/// Wraps an optional generative backend. Every method is infallible: backend trouble
/// degrades to [`fallback`].
#[derive(Clone)]
pub struct Enricher {
    provider: Option<Arc<dyn LlmProvider>>,
    max_tokens: usize,
}

impl Enricher {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, max_tokens: usize) -> Self {
        Self {
            provider,
            max_tokens,
        }
    }

    /// Enricher with no backend; always truncates.
    pub fn offline() -> Self {
        Self::new(None, 300)
    }

    pub async fn enrich(&self, title: &str, content: Option<&str>) -> Enrichment {
        let prompt = build_prompt(title, content.unwrap_or(title), None);
        match self.ask(prompt).await {
            Some(text) => match parse_summary(&text) {
                Some((short_headline, short_content)) => Enrichment {
                    short_headline,
                    short_content,
                    fell_back: false,
                },
                None => {
                    warn!(title, "LLM response did not match expected format, falling back to truncation");
                    fallback(title, content)
                }
            },
            None => fallback(title, content),
        }
    }

    /// Enrich, classify into one of `category_slugs` and flag near-duplicates of
    /// `recent_headlines`. Fails open: category `fallback_slug`, not a duplicate.
    pub async fn enrich_and_classify(
        &self,
        title: &str,
        content: Option<&str>,
        category_slugs: &[String],
        recent_headlines: &[String],
        fallback_slug: &str,
    ) -> Classified {
        let failed = || Classified {
            enrichment: fallback(title, content),
            category_slug: fallback_slug.to_string(),
            is_duplicate: false,
        };

        let prompt = build_prompt(
            title,
            content.unwrap_or(title),
            Some((category_slugs, recent_headlines)),
        );
        let Some(text) = self.ask(prompt).await else {
            return failed();
        };
        let Some((short_headline, short_content)) = parse_summary(&text) else {
            warn!(title, "LLM classification response did not match expected format, falling back");
            return failed();
        };

        let category_slug = labeled_value(&text, CATEGORY_LABEL)
            .and_then(|slug| {
                category_slugs
                    .iter()
                    .find(|known| known.eq_ignore_ascii_case(slug.trim()))
                    .cloned()
            })
            .unwrap_or_else(|| fallback_slug.to_string());

        let is_duplicate = labeled_value(&text, DUPLICATE_LABEL)
            .map(|v| v.trim().to_ascii_uppercase().starts_with("YES"))
            .unwrap_or(false);

        Classified {
            enrichment: Enrichment {
                short_headline,
                short_content,
                fell_back: false,
            },
            category_slug,
            is_duplicate,
        }
    }

    async fn ask(&self, prompt: String) -> Option<String> {
        let provider = self.provider.as_ref()?;
        let request = LlmRequest {
            prompt,
            max_tokens: Some(self.max_tokens),
            timeout_seconds: None,
        };
        match provider.generate(request).await {
            Ok(response) => {
                debug!(
                    model = %response.model,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM enrichment call succeeded"
                );
                Some(response.content)
            }
            Err(e) => {
                warn!("LLM enrichment failed: {:#}, falling back to truncation", e);
                None
            }
        }
    }
}

/// Deterministic substitute for a failed backend call: the first 10 words of the title,
/// and the first 60 words of the content (or title) followed by an ellipsis.
pub fn fallback(title: &str, content: Option<&str>) -> Enrichment {
    let body = content.filter(|c| !c.trim().is_empty()).unwrap_or(title);
    Enrichment {
        short_headline: truncate_to_words(title, HEADLINE_MAX_WORDS),
        short_content: format!("{}{}", truncate_to_words(body, SUMMARY_MAX_WORDS), ELLIPSIS),
        fell_back: true,
    }
}

/// First `max_words` whitespace-separated words, joined by single spaces.
pub fn truncate_to_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_prompt(title: &str, content: &str, classify: Option<(&[String], &[String])>) -> String {
    let mut prompt = format!(
        r#"You are a news editor for a mobile news app. Given the title and content of a news article, produce:

1. SHORT_HEADLINE: a clear headline of {HEADLINE_MAX_WORDS} words or fewer. It must be self-contained and informative; do NOT simply truncate the original title.
2. SHORT_CONTENT: a neutral summary of about {SUMMARY_MAX_WORDS} words covering who, what, when and where. No opinion, no filler phrases.
"#
    );

    if let Some((categories, recent)) = classify {
        let recent_list = if recent.is_empty() {
            "(none)".to_string()
        } else {
            recent
                .iter()
                .map(|h| format!("- {}", h))
                .collect::<Vec<_>>()
                .join("\n")
        };
        prompt.push_str(&format!(
            r#"3. CATEGORY: exactly one of these slugs: {}
4. DUPLICATE: YES if the article reports the same story as any headline below, otherwise NO.

RECENT HEADLINES:
{}
"#,
            categories.join(", "),
            recent_list
        ));
    }

    prompt.push_str("\nRespond in EXACTLY this format with no other text:\n");
    prompt.push_str("SHORT_HEADLINE: <headline>\nSHORT_CONTENT: <summary>\n");
    if classify.is_some() {
        prompt.push_str("CATEGORY: <slug>\nDUPLICATE: <YES or NO>\n");
    }
    prompt.push_str(&format!("\nTITLE: {}\n\nCONTENT: {}\n", title, content));
    prompt
}

fn labeled_value<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(label))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Extracts the two required labeled lines; `None` when either is missing or blank.
fn parse_summary(text: &str) -> Option<(String, String)> {
    let headline = labeled_value(text, HEADLINE_LABEL)?;
    let content = labeled_value(text, CONTENT_LABEL)?;
    Some((headline.to_string(), content.to_string()))
}
