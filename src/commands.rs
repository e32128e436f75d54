//! Slash command logic, independent of the Discord transport.

use tracing::info;

use crate::error::BotError;
use crate::models::{GuildConfig, NewsItem};
use crate::state::BotState;

pub const LATEST_NEWS: &str = "latest-news";
pub const ADMIN_NEWS_CHANNEL: &str = "admin-newschannel";
pub const PING: &str = "ping";

/// Who ran a command, as far as the handlers care
#[derive(Debug, Clone, Copy)]
pub struct Invoker {
    pub guild_id: Option<u64>,
    pub is_admin: bool,
}

/// `admin-newschannel <channel>`: points the guild's announcements at a channel.
/// Rejected without touching state unless the invoker is an administrator.
pub async fn set_news_channel(
    state: &BotState,
    invoker: Invoker,
    channel_id: u64,
) -> Result<GuildConfig, BotError> {
    let guild_id = invoker.guild_id.ok_or(BotError::NotInGuild)?;
    if !invoker.is_admin {
        info!("Rejected {} in guild {}: not an administrator", ADMIN_NEWS_CHANNEL, guild_id);
        return Err(BotError::PermissionDenied);
    }

    let mut store = state.store.lock().await;
    let config = store.set_news_channel(guild_id, channel_id).await?;
    Ok(config)
}

/// `ping`: liveness check
pub fn ping() -> &'static str {
    "Pong!"
}

/// `latest-news`: the newest items right now, ignoring what was already posted
pub async fn latest_news(state: &BotState) -> Result<Vec<NewsItem>, BotError> {
    let items = state.aggregator.latest(state.news_limit).await;
    if items.is_empty() {
        return Err(BotError::NoNewsFound);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_answers_pong() {
        assert_eq!(ping(), "Pong!");
    }
}
