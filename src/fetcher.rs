use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::models::{FeedSource, NewsItem, SourceKind};
use crate::parser;

/// Anything that can produce a batch of news items on demand.
///
/// Implementations may fail freely; the aggregator turns a failure into an
/// empty contribution for that cycle.
pub trait NewsFetcher: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NewsItem>>>;
}

/// Builds the HTTP client shared by every source
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// HTTP-backed fetcher for one configured feed
pub struct SourceFetcher {
    client: Client,
    source: FeedSource,
}

impl SourceFetcher {
    pub fn new(client: Client, source: FeedSource) -> Self {
        Self { client, source }
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    async fn fetch_source(&self) -> Result<Vec<NewsItem>> {
        let response = self.client.get(&self.source.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to fetch {}: {}", self.source.url, response.status()));
        }

        let bytes = response.bytes().await?;
        debug!("{}: received {} bytes", self.source.name, bytes.len());

        match self.source.kind {
            SourceKind::Atom | SourceKind::Rss => parser::parse_xml_feed(&self.source.name, &bytes),
            SourceKind::JsonApi => parser::parse_json_feed(&self.source.name, &bytes),
        }
    }
}

impl NewsFetcher for SourceFetcher {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<NewsItem>>> {
        self.fetch_source().boxed()
    }
}
