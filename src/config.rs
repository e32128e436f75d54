use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregator::DEFAULT_LIMIT;
use crate::models::{FeedSource, SourceKind};
use crate::store;

const BRAWL_STARS_YOUTUBE: &str =
    "https://www.youtube.com/feeds/videos.xml?channel_id=UCooVYzDxdwTtGYAkcPmOgOw";
const BRAWL_STARS_BLOG: &str = "https://blog.brawlstars.com/rss.xml";
const BRAWL_STARS_API: &str = "https://api.brawlapi.com/v1/news";

/// Discord rejects messages carrying more than ten embeds
pub const MAX_NEWS_LIMIT: usize = 10;
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Runtime settings.
///
/// Built from defaults, then an optional JSON file, then environment
/// variables. Every field in the file is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sources: Vec<FeedSource>,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub news_limit: usize,
    pub posted_retention_days: i64,
    pub user_agent: String,
    pub data_dir: Option<PathBuf>,
    #[serde(skip)]
    pub discord_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: vec![
                FeedSource::new("YouTube", BRAWL_STARS_YOUTUBE, SourceKind::Atom),
                FeedSource::new("Blog", BRAWL_STARS_BLOG, SourceKind::Rss),
                FeedSource::new("BrawlAPI", BRAWL_STARS_API, SourceKind::JsonApi),
            ],
            poll_interval_secs: 600,
            fetch_timeout_secs: 20,
            news_limit: DEFAULT_LIMIT,
            posted_retention_days: 30,
            user_agent: concat!("BrawlNewsBot/", env!("CARGO_PKG_VERSION")).to_string(),
            data_dir: None,
            discord_token: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (if given) and applies env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(token) = std::env::var("DISCORD_TOKEN") {
            if !token.trim().is_empty() {
                self.discord_token = Some(token.trim().to_string());
            }
        }
        if let Ok(dir) = std::env::var("BRAWLNEWS_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(shellexpand::tilde(&dir).to_string()));
        }
        if let Ok(secs) = std::env::var("BRAWLNEWS_POLL_SECS") {
            self.poll_interval_secs = secs
                .parse()
                .with_context(|| format!("BRAWLNEWS_POLL_SECS is not a number: {}", secs))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(anyhow!("At least one feed source must be configured"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be greater than zero"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs must be greater than zero"));
        }
        if self.news_limit == 0 || self.news_limit > MAX_NEWS_LIMIT {
            return Err(anyhow!("news_limit must be between 1 and {}", MAX_NEWS_LIMIT));
        }
        if self.posted_retention_days <= 0 || self.posted_retention_days > MAX_RETENTION_DAYS {
            return Err(anyhow!(
                "posted_retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            ));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(store::default_data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.posted_retention_days)
    }

    pub fn require_token(&self) -> Result<&str> {
        self.discord_token
            .as_deref()
            .ok_or_else(|| anyhow!("DISCORD_TOKEN is not set"))
    }
}
