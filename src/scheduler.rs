use anyhow::Result;
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::models::NewsItem;
use crate::state::BotState;

/// Delivers one item to one channel.
pub trait Announcer: Send + Sync {
    fn announce<'a>(&'a self, channel_id: u64, item: &'a NewsItem) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub aggregated: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Runs one fetch-aggregate-filter-post pass for every configured guild.
///
/// Only items that were actually delivered are marked as posted. Delivery
/// failures are logged and dropped; the item is offered again next cycle
/// while it is still among the latest. Posted keys that are still listed are
/// refreshed before expired ones are pruned, so retention never lets a
/// long-lived item through twice.
pub async fn run_cycle(state: &BotState, announcer: &dyn Announcer) -> CycleReport {
    let _cycle = state.cycle_lock.lock().await;
    let mut report = CycleReport::default();

    let items = state.aggregator.latest(state.news_limit).await;
    report.aggregated = items.len();
    if items.is_empty() {
        debug!("No news this cycle");
        return report;
    }

    let guilds = state.store.lock().await.guild_configs();

    for guild in guilds {
        let fresh = {
            let mut store = state.store.lock().await;
            if let Err(e) = store.refresh_seen(guild.guild_id, &items, Utc::now()).await {
                error!("Failed to persist posted items for guild {}: {:#}", guild.guild_id, e);
            }
            store.unposted(guild.guild_id, &items)
        };
        if fresh.is_empty() {
            continue;
        }

        let mut delivered = Vec::with_capacity(fresh.len());
        // Oldest first so the channel reads chronologically
        for item in fresh.iter().rev() {
            match announcer.announce(guild.news_channel_id, item).await {
                Ok(()) => delivered.push(item.clone()),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Failed to post {} to channel {} in guild {}: {:#}",
                        item.url, guild.news_channel_id, guild.guild_id, e
                    );
                }
            }
        }

        if delivered.is_empty() {
            continue;
        }
        report.delivered += delivered.len();

        let mut store = state.store.lock().await;
        if let Err(e) = store.mark_posted(guild.guild_id, &delivered, Utc::now()).await {
            error!("Failed to persist posted items for guild {}: {:#}", guild.guild_id, e);
        }
        info!("Posted {} new item(s) to guild {}", delivered.len(), guild.guild_id);
    }

    report
}

/// Runs a cycle immediately and then every `interval`, forever
pub async fn run_forever(state: Arc<BotState>, announcer: Arc<dyn Announcer>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("News scheduler started, polling every {:?}", interval);

    loop {
        ticker.tick().await;
        let report = run_cycle(&state, announcer.as_ref()).await;
        debug!("Cycle finished: {:?}", report);
    }
}
