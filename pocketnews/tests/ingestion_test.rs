mod support;

use common::{CategoryMapping, FeedSourceConfig, IngestionConfig};
use mockito::Matcher;
use pocketnews::ingestion::Ingestor;
use pocketnews::llm::enrichment::Enricher;
use pocketnews::llm::remote::RemoteLlmProvider;
use pocketnews::llm::LlmProvider;
use pocketnews::sources::headlines::HeadlinesClient;
use pocketnews::sources::rss::FeedClient;
use pocketnews::storage::news;
use std::sync::Arc;
use support::{add_category, memory_pool, news_count};

fn rss_with_items(count: usize) -> String {
    let items: String = (1..=count)
        .map(|i| {
            format!(
                r#"<item>
      <title>Story number {i} about the city council budget vote</title>
      <description>The council met on Monday to debate item {i} of the annual budget.</description>
      <link>https://wire.example.com/story-{i}</link>
    </item>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Wire</title>{}</channel></rss>"#,
        items
    )
}

fn feed_source(server: &mockito::Server, category: &str) -> FeedSourceConfig {
    FeedSourceConfig {
        url: format!("{}/rss", server.url()),
        category: category.to_string(),
        source_name: Some("Wire".to_string()),
    }
}

fn llm_enricher(server: &mockito::Server) -> Enricher {
    let provider = RemoteLlmProvider::new(format!("{}/llm", server.url()), "key", "test-model").with_defaults(5, 300);
    Enricher::new(Some(Arc::new(provider) as Arc<dyn LlmProvider>), 300)
}

fn llm_reply(text: &str) -> String {
    serde_json::json!({ "content": [{ "type": "text", "text": text }] }).to_string()
}

#[tokio::test]
async fn same_feed_twice_adds_rows_once() {
    let pool = memory_pool().await;
    add_category(&pool, "World", "world", 1).await;

    let mut server = mockito::Server::new_async().await;
    let feed = server
        .mock("GET", "/rss")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(rss_with_items(5))
        .expect(2)
        .create_async()
        .await;

    let ingestor = Ingestor::new(
        pool.clone(),
        Enricher::offline(),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    let first = ingestor.run_all().await.expect("first run");
    assert_eq!(first.saved(), 5);
    assert_eq!(news_count(&pool).await, 5);

    let second = ingestor.run_all().await.expect("second run");
    assert_eq!(second.saved(), 0);
    assert_eq!(second.sources[0].skipped_existing, 5);
    assert_eq!(news_count(&pool).await, 5);

    feed.assert_async().await;

    let row = news::find_by_source_url(&pool, "https://wire.example.com/story-1")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.expires_at - row.published_at, chrono::Duration::hours(48));
    assert_eq!(row.category_name, "World");
    assert_eq!(row.source_name.as_deref(), Some("Wire"));
}

#[tokio::test]
async fn malformed_enrichment_still_persists_with_fallback() {
    let pool = memory_pool().await;
    add_category(&pool, "World", "world", 1).await;

    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/rss")
        .with_status(200)
        .with_body(rss_with_items(1))
        .create_async()
        .await;
    let _llm = server
        .mock("POST", "/llm")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(llm_reply("SHORT_HEADLINE: Council passes budget"))
        .create_async()
        .await;

    let ingestor = Ingestor::new(
        pool.clone(),
        llm_enricher(&server),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    let report = ingestor.run_all().await.expect("run");
    assert_eq!(report.saved(), 1);

    let row = news::find_by_source_url(&pool, "https://wire.example.com/story-1")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.short_headline, "Story number 1 about the city council budget vote");
    assert_eq!(
        row.short_content,
        "The council met on Monday to debate item 1 of the annual budget...."
    );
}

#[tokio::test]
async fn near_duplicates_are_skipped_only_when_detection_is_on() {
    let pool = memory_pool().await;
    add_category(&pool, "World", "world", 1).await;
    add_category(&pool, "Business", "business", 2).await;

    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/rss")
        .with_status(200)
        .with_body(rss_with_items(3))
        .create_async()
        .await;
    let _llm = server
        .mock("POST", "/llm")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(llm_reply(
            "SHORT_HEADLINE: Council debates budget\nSHORT_CONTENT: The council met.\nCATEGORY: business\nDUPLICATE: YES",
        ))
        .create_async()
        .await;

    let detecting = Ingestor::new(
        pool.clone(),
        llm_enricher(&server),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    let report = detecting.run_all().await.expect("run");
    assert_eq!(report.saved(), 0);
    assert_eq!(report.sources[0].skipped_duplicate, 3);
    assert_eq!(news_count(&pool).await, 0);

    let plain = Ingestor::new(
        pool.clone(),
        llm_enricher(&server),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig {
            near_duplicate_detection: Some(false),
            ..Default::default()
        },
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    let report = plain.run_all().await.expect("run");
    assert_eq!(report.saved(), 3);
    let row = news::find_by_source_url(&pool, "https://wire.example.com/story-2")
        .await
        .expect("query")
        .expect("row");
    // Without classification the feed's own category is kept.
    assert_eq!(row.category_name, "World");
    assert_eq!(row.short_headline, "Council debates budget");
}

#[tokio::test]
async fn classification_can_move_items_between_categories() {
    let pool = memory_pool().await;
    add_category(&pool, "World", "world", 1).await;
    add_category(&pool, "Business", "business", 2).await;

    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/rss")
        .with_status(200)
        .with_body(rss_with_items(1))
        .create_async()
        .await;
    let _llm = server
        .mock("POST", "/llm")
        .with_status(200)
        .with_body(llm_reply(
            "SHORT_HEADLINE: Budget vote\nSHORT_CONTENT: Summary.\nCATEGORY: business\nDUPLICATE: NO",
        ))
        .create_async()
        .await;

    let ingestor = Ingestor::new(
        pool.clone(),
        llm_enricher(&server),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    assert_eq!(ingestor.run_all().await.expect("run").saved(), 1);
    let row = news::find_by_source_url(&pool, "https://wire.example.com/story-1")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.category_name, "Business");
}

#[tokio::test]
async fn unknown_category_falls_back_to_default_or_fails_item() {
    let pool = memory_pool().await;

    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/rss")
        .with_status(200)
        .with_body(rss_with_items(2))
        .create_async()
        .await;

    let ingestor = Ingestor::new(
        pool.clone(),
        Enricher::offline(),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "no-such-slug")]);

    // Neither the slug nor the default category exists: items fail, run completes.
    let report = ingestor.run_all().await.expect("run");
    assert_eq!(report.failed(), 2);
    assert_eq!(news_count(&pool).await, 0);

    add_category(&pool, "Top Stories", "top-stories", 1).await;
    let report = ingestor.run_all().await.expect("run");
    assert_eq!(report.saved(), 2);
    let row = news::find_by_source_url(&pool, "https://wire.example.com/story-2")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.category_name, "Top Stories");
}

#[tokio::test]
async fn unreachable_feed_yields_empty_report() {
    let pool = memory_pool().await;
    add_category(&pool, "World", "world", 1).await;

    let mut server = mockito::Server::new_async().await;
    let _feed = server.mock("GET", "/rss").with_status(404).create_async().await;

    let ingestor = Ingestor::new(
        pool.clone(),
        Enricher::offline(),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_feeds(vec![feed_source(&server, "world")]);

    let report = ingestor.run_all().await.expect("run");
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].fetched, 0);
    assert_eq!(report.failed(), 0);
}

const HEADLINES_BODY: &str = r#"{
  "status": "ok",
  "articles": [
    {
      "source": {"id": null, "name": "Daily Ledger"},
      "title": "Markets close higher after rate decision",
      "description": "Stocks gained on Wednesday.",
      "content": null,
      "url": "https://ledger.example.com/markets",
      "urlToImage": "https://ledger.example.com/markets.jpg"
    },
    {
      "source": {"id": null, "name": "Gone"},
      "title": "[Removed]",
      "description": "[Removed]",
      "content": "[Removed]",
      "url": "https://removed.com"
    },
    {
      "source": {"id": null, "name": "Empty"},
      "title": "No text at all",
      "description": null,
      "content": null,
      "url": "https://empty.example.com/a"
    }
  ]
}"#;

#[tokio::test]
async fn headline_api_items_are_filtered_and_mapped() {
    let pool = memory_pool().await;
    add_category(&pool, "Top Stories", "top-stories", 1).await;

    let mut server = mockito::Server::new_async().await;
    let api = server
        .mock("GET", "/top-headlines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("country".into(), "in".into()),
            Matcher::UrlEncoded("category".into(), "general".into()),
            Matcher::UrlEncoded("pageSize".into(), "20".into()),
            Matcher::UrlEncoded("apiKey".into(), "secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(HEADLINES_BODY)
        .expect(2)
        .create_async()
        .await;

    let client = HeadlinesClient::new(reqwest::Client::new(), server.url(), "secret");
    let items = client.fetch_top_headlines("general").await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_name.as_deref(), Some("Daily Ledger"));
    assert_eq!(items[0].image_url.as_deref(), Some("https://ledger.example.com/markets.jpg"));

    let ingestor = Ingestor::new(
        pool.clone(),
        Enricher::offline(),
        FeedClient::new(reqwest::Client::new()),
        IngestionConfig::default(),
    )
    .with_headlines(
        client,
        vec![CategoryMapping {
            external: "general".into(),
            slug: "top-stories".into(),
        }],
    );

    let report = ingestor.run_all().await.expect("run");
    assert_eq!(report.saved(), 1);
    assert_eq!(report.sources[0].source, "headlines:general");

    let row = news::find_by_source_url(&pool, "https://ledger.example.com/markets")
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.category_name, "Top Stories");
    assert_eq!(row.short_content, "Stocks gained on Wednesday....");
    api.assert_async().await;
}

#[tokio::test]
async fn headline_api_failure_is_an_empty_batch() {
    let mut server = mockito::Server::new_async().await;
    let _api = server
        .mock("GET", "/top-headlines")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = HeadlinesClient::new(reqwest::Client::new(), server.url(), "secret");
    assert!(client.fetch_top_headlines("business").await.is_empty());
}
