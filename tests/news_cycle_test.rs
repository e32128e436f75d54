use anyhow::{anyhow, Result};
use brawlnews::commands::{self, Invoker};
use brawlnews::fetcher::{self, NewsFetcher};
use brawlnews::parser::parse_timestamp;
use brawlnews::scheduler::{self, Announcer};
use brawlnews::{Aggregator, BotError, BotState, FeedSource, NewsItem, SourceKind, StateStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct FixedFetcher {
    name: &'static str,
    items: Option<Vec<NewsItem>>,
}

impl NewsFetcher for FixedFetcher {
    fn name(&self) -> &str {
        self.name
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NewsItem>>> {
        let result = self.items.clone().ok_or_else(|| anyhow!("{} is down", self.name));
        async move { result }.boxed()
    }
}

#[derive(Default)]
struct CountingAnnouncer {
    sent: Mutex<Vec<String>>,
}

impl Announcer for CountingAnnouncer {
    fn announce<'a>(&'a self, _channel_id: u64, item: &'a NewsItem) -> BoxFuture<'a, Result<()>> {
        self.sent.lock().unwrap().push(item.url.clone());
        async { Ok(()) }.boxed()
    }
}

fn news(url: &str, date: &str) -> NewsItem {
    NewsItem {
        source: "fixture".to_string(),
        title: url.to_string(),
        url: url.to_string(),
        guid: None,
        published_at: parse_timestamp(date),
        raw_body: None,
    }
}

fn ok(name: &'static str, items: Vec<NewsItem>) -> Box<dyn NewsFetcher> {
    Box::new(FixedFetcher { name, items: Some(items) })
}

fn down(name: &'static str) -> Box<dyn NewsFetcher> {
    Box::new(FixedFetcher { name, items: None })
}

fn bot(fetchers: Vec<Box<dyn NewsFetcher>>, dir: &TempDir) -> BotState {
    let aggregator = Aggregator::new(fetchers, Duration::from_secs(5));
    let store = StateStore::open(dir.path(), chrono::Duration::days(30)).unwrap();
    BotState::new(aggregator, store, 5)
}

const ADMIN: Invoker = Invoker { guild_id: Some(10), is_admin: true };
const MEMBER: Invoker = Invoker { guild_id: Some(10), is_admin: false };

#[tokio::test]
async fn test_cross_source_duplicates_are_merged() {
    let dir = TempDir::new().unwrap();
    let state = bot(
        vec![
            ok("A", vec![news("u1", "2024-01-02"), news("u2", "2024-01-01")]),
            ok("B", vec![news("u1", "2024-01-02"), news("u3", "2024-01-03")]),
        ],
        &dir,
    );

    let items = commands::latest_news(&state).await.unwrap();
    let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["u3", "u1", "u2"]);
}

#[tokio::test]
async fn test_latest_news_reports_no_news_when_all_sources_fail() {
    let dir = TempDir::new().unwrap();
    let state = bot(vec![down("YouTube"), down("Blog"), down("API")], &dir);

    let err = commands::latest_news(&state).await.unwrap_err();
    assert!(matches!(err, BotError::NoNewsFound));
    assert!(err.is_informational());
}

#[tokio::test]
async fn test_latest_news_ignores_posted_state() {
    let dir = TempDir::new().unwrap();
    let items = vec![news("u1", "2024-01-01")];
    let state = bot(vec![ok("A", items.clone())], &dir);
    state.store.lock().await.mark_posted(10, &items, chrono::Utc::now()).await.unwrap();

    assert_eq!(commands::latest_news(&state).await.unwrap(), items);
}

#[tokio::test]
async fn test_admin_sets_channel_then_failed_cycle_is_silent() {
    let dir = TempDir::new().unwrap();
    let state = bot(vec![down("YouTube"), down("Blog"), down("API")], &dir);

    let config = commands::set_news_channel(&state, ADMIN, 555).await.unwrap();
    assert_eq!(config.news_channel_id, 555);

    let announcer = CountingAnnouncer::default();
    let report = scheduler::run_cycle(&state, &announcer).await;

    assert_eq!(report.aggregated, 0);
    assert_eq!(report.failed, 0);
    assert!(announcer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_admin_cannot_change_channel() {
    let dir = TempDir::new().unwrap();
    let state = bot(vec![], &dir);

    let err = commands::set_news_channel(&state, MEMBER, 555).await.unwrap_err();
    assert!(matches!(err, BotError::PermissionDenied));
    assert!(state.store.lock().await.guild_config(10).is_none());

    let outside = Invoker { guild_id: None, is_admin: true };
    let err = commands::set_news_channel(&state, outside, 555).await.unwrap_err();
    assert!(matches!(err, BotError::NotInGuild));
}

#[tokio::test]
async fn test_scheduled_cycles_do_not_repeat_items() {
    let dir = TempDir::new().unwrap();
    let state = bot(
        vec![ok("A", vec![news("u1", "2024-01-01"), news("u2", "2024-01-02")])],
        &dir,
    );
    commands::set_news_channel(&state, ADMIN, 555).await.unwrap();

    let announcer = CountingAnnouncer::default();
    scheduler::run_cycle(&state, &announcer).await;
    scheduler::run_cycle(&state, &announcer).await;

    assert_eq!(announcer.sent.lock().unwrap().clone(), vec!["u1", "u2"]);
}

#[tokio::test]
async fn test_posted_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let items = vec![news("u1", "2024-01-01")];
    {
        let state = bot(vec![ok("A", items.clone())], &dir);
        commands::set_news_channel(&state, ADMIN, 555).await.unwrap();
        scheduler::run_cycle(&state, &CountingAnnouncer::default()).await;
    }

    let restarted = bot(vec![ok("A", items)], &dir);
    let announcer = CountingAnnouncer::default();
    let report = scheduler::run_cycle(&restarted, &announcer).await;

    assert_eq!(report.delivered, 0);
    assert!(announcer.sent.lock().unwrap().is_empty());
}

/// Serves one canned HTTP response per connection on a local port
async fn serve(status: &'static str, content_type: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/feed", addr)
}

const RSS_BODY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title><link>https://blog.test</link><description>d</description>
<item><title>Shared story</title><link>https://news.test/shared</link><pubDate>Wed, 03 Jan 2024 00:00:00 GMT</pubDate></item>
<item><title>Blog only</title><link>https://news.test/blog</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
</channel></rss>"#;

const JSON_BODY: &str = r#"{"articles": [
    {"title": "Shared story", "url": "https://news.test/shared", "publishedAt": "2024-01-03T00:00:00Z"},
    {"title": "API only", "url": "https://news.test/api", "publishedAt": "2024-01-02T00:00:00Z"}
]}"#;

#[tokio::test]
async fn test_http_sources_end_to_end() {
    let rss_url = serve("200 OK", "application/rss+xml", RSS_BODY).await;
    let json_url = serve("200 OK", "application/json", JSON_BODY).await;
    let broken_url = serve("500 Internal Server Error", "text/plain", "oops").await;

    let sources = vec![
        FeedSource::new("Blog", rss_url, SourceKind::Rss),
        FeedSource::new("API", json_url, SourceKind::JsonApi),
        FeedSource::new("YouTube", broken_url, SourceKind::Atom),
    ];

    let client = fetcher::build_client("brawlnews-test", Duration::from_secs(5)).unwrap();
    let aggregator = Aggregator::from_sources(&client, &sources, Duration::from_secs(5));

    let items = aggregator.latest(5).await;
    let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://news.test/shared", "https://news.test/api", "https://news.test/blog"]
    );
    assert_eq!(items[0].source, "Blog");
}
