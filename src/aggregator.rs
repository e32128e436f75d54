use futures::future::join_all;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::BotError;
use crate::fetcher::{NewsFetcher, SourceFetcher};
use crate::models::{FeedSource, NewsItem};

pub const DEFAULT_LIMIT: usize = 5;

/// Fans out to every fetcher, then merges what came back.
pub struct Aggregator {
    fetchers: Vec<Box<dyn NewsFetcher>>,
    fetch_timeout: Duration,
}

impl Aggregator {
    pub fn new(fetchers: Vec<Box<dyn NewsFetcher>>, fetch_timeout: Duration) -> Self {
        Self { fetchers, fetch_timeout }
    }

    /// One HTTP fetcher per configured source, all sharing `client`
    pub fn from_sources(client: &Client, sources: &[FeedSource], fetch_timeout: Duration) -> Self {
        let fetchers = sources
            .iter()
            .cloned()
            .map(|source| Box::new(SourceFetcher::new(client.clone(), source)) as Box<dyn NewsFetcher>)
            .collect();
        Self::new(fetchers, fetch_timeout)
    }

    pub fn source_count(&self) -> usize {
        self.fetchers.len()
    }

    /// Most recent `limit` distinct items across all sources.
    /// Returns an empty list when every source fails.
    pub async fn latest(&self, limit: usize) -> Vec<NewsItem> {
        let batches = join_all(self.fetchers.iter().map(|f| self.fetch_or_empty(f.as_ref()))).await;
        let fetched: usize = batches.iter().map(Vec::len).sum();

        let items = merge(batches, limit);
        info!(
            "Aggregated {} items from {} sources, keeping {}",
            fetched,
            self.fetchers.len(),
            items.len()
        );
        items
    }

    async fn fetch_or_empty(&self, fetcher: &dyn NewsFetcher) -> Vec<NewsItem> {
        let reason = match tokio::time::timeout(self.fetch_timeout, fetcher.fetch()).await {
            Ok(Ok(items)) => {
                debug!("{}: fetched {} items", fetcher.name(), items.len());
                return items;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {:?}", self.fetch_timeout),
        };

        let failure = BotError::FetchFailure {
            source_name: fetcher.name().to_string(),
            reason,
        };
        warn!("{}", failure);
        Vec::new()
    }
}

/// Sorts newest first, drops repeated identity keys and keeps at most `limit`.
///
/// The sort is stable, so items with equal timestamps keep the order of the
/// batches they came from. Items without a timestamp rank as oldest.
pub fn merge(batches: Vec<Vec<NewsItem>>, limit: usize) -> Vec<NewsItem> {
    let mut items: Vec<NewsItem> = batches.into_iter().flatten().collect();

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.key().to_string()));

    items.truncate(limit);
    items
}
