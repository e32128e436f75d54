use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{GuildConfig, NewsItem};
use crate::posted::PostedSet;

const GUILDS_FILE: &str = "guilds.json";
const POSTED_FILE: &str = "posted.json";

/// Resolves where bot state lives when no directory is configured.
/// `BRAWLNEWS_DATA_DIR` wins, then `$XDG_DATA_HOME/brawlnews`,
/// then `~/.local/share/brawlnews`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BRAWLNEWS_DATA_DIR") {
        PathBuf::from(shellexpand::tilde(&dir).to_string())
    } else if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("brawlnews")
    } else {
        PathBuf::from(shellexpand::tilde("~/.local/share/brawlnews").to_string())
    }
}

/// Durable bot state: one news channel per guild and, per guild, the keys
/// already announced there.
///
/// Both documents are small flat JSON files rewritten wholesale on every
/// change, through a temp file and a rename so a crash mid-write leaves the
/// previous version intact. The store is loaded once at startup and shared
/// behind a mutex.
pub struct StateStore {
    base_dir: PathBuf,
    retention: Duration,
    guilds: HashMap<u64, GuildConfig>,
    posted: HashMap<u64, PostedSet>,
}

impl StateStore {
    /// Opens (creating if needed) the store rooted at `base_dir`
    pub fn open(base_dir: impl Into<PathBuf>, retention: Duration) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create data directory {}", base_dir.display()))?;

        // No pruning on load; `refresh_seen` prunes after refreshing listed keys
        let guilds: HashMap<u64, GuildConfig> = read_json(&base_dir.join(GUILDS_FILE))?;
        let posted: HashMap<u64, PostedSet> = read_json(&base_dir.join(POSTED_FILE))?;

        info!(
            "Loaded state from {}: {} guild(s) configured",
            base_dir.display(),
            guilds.len()
        );

        Ok(Self { base_dir, retention, guilds, posted })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn guild_config(&self, guild_id: u64) -> Option<GuildConfig> {
        self.guilds.get(&guild_id).copied()
    }

    /// All configured guilds, ordered by id
    pub fn guild_configs(&self) -> Vec<GuildConfig> {
        let mut configs: Vec<GuildConfig> = self.guilds.values().copied().collect();
        configs.sort_by_key(|c| c.guild_id);
        configs
    }

    /// Creates or replaces the guild's news channel and persists it
    pub async fn set_news_channel(&mut self, guild_id: u64, news_channel_id: u64) -> Result<GuildConfig> {
        let config = GuildConfig { guild_id, news_channel_id };
        self.guilds.insert(guild_id, config);
        self.save_guilds().await?;

        info!("Guild {} now posts news to channel {}", guild_id, news_channel_id);
        Ok(config)
    }

    pub fn posted(&self, guild_id: u64) -> Option<&PostedSet> {
        self.posted.get(&guild_id)
    }

    /// Items not yet announced in this guild
    pub fn unposted(&self, guild_id: u64, items: &[NewsItem]) -> Vec<NewsItem> {
        match self.posted.get(&guild_id) {
            Some(set) => set.filter_unposted(items),
            None => items.to_vec(),
        }
    }

    /// Marks the guild's already-posted keys that are still in `items` as
    /// seen at `now`, then evicts keys not seen within the retention window.
    /// Persists only when something changed.
    pub async fn refresh_seen(&mut self, guild_id: u64, items: &[NewsItem], now: DateTime<Utc>) -> Result<()> {
        let Some(set) = self.posted.get_mut(&guild_id) else {
            return Ok(());
        };
        let touched = set.touch(items, now);
        let pruned = set.prune(now, self.retention);

        if touched + pruned == 0 {
            return Ok(());
        }
        self.save_posted().await
    }

    /// Records delivered items for the guild, evicts expired keys, persists
    pub async fn mark_posted(&mut self, guild_id: u64, items: &[NewsItem], now: DateTime<Utc>) -> Result<()> {
        let set = self.posted.entry(guild_id).or_default();
        set.mark_posted(items, now);
        set.prune(now, self.retention);
        debug!("Guild {} has {} posted keys", guild_id, set.len());

        self.save_posted().await
    }

    async fn save_guilds(&self) -> Result<()> {
        let sorted: BTreeMap<_, _> = self.guilds.iter().collect();
        write_json(&self.base_dir.join(GUILDS_FILE), &sorted).await
    }

    async fn save_posted(&self) -> Result<()> {
        let sorted: BTreeMap<_, _> = self.posted.iter().collect();
        write_json(&self.base_dir.join(POSTED_FILE), &sorted).await
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Replaces `path` atomically: the JSON goes to a sibling temp file first
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    tokio::fs::write(&tmp_path, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
