use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serenity::all::{
    ChannelId, ChannelType, Client, Command, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
    EditInteractionResponse, EventHandler, GatewayIntents, Interaction, Permissions, Ready,
};
use serenity::async_trait;
use serenity::http::Http;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::commands::{self, Invoker, ADMIN_NEWS_CHANNEL, LATEST_NEWS, PING};
use crate::config::MAX_NEWS_LIMIT;
use crate::error::BotError;
use crate::format::{format_date, preview, truncate_chars};
use crate::models::NewsItem;
use crate::scheduler::Announcer;
use crate::state::BotState;

const EMBED_COLOR: u32 = 0xFFC107;

/// Embed for one news item: title linking to the item, source, date and a
/// short body preview.
pub fn news_embed(item: &NewsItem) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(truncate_chars(&item.title, 256))
        .url(&item.url)
        .colour(EMBED_COLOR)
        .field("Published", format_date(item.published_at), true)
        .footer(CreateEmbedFooter::new(&item.source));

    if let Some(text) = preview(item) {
        embed = embed.description(text);
    }
    embed
}

/// Posts announcements through the REST client, no gateway needed
pub struct DiscordAnnouncer {
    http: Arc<Http>,
}

impl DiscordAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl Announcer for DiscordAnnouncer {
    fn announce<'a>(&'a self, channel_id: u64, item: &'a NewsItem) -> BoxFuture<'a, Result<()>> {
        async move {
            ChannelId::new(channel_id)
                .send_message(self.http.as_ref(), CreateMessage::new().embed(news_embed(item)))
                .await
                .with_context(|| format!("sending to channel {}", channel_id))?;
            Ok(())
        }
        .boxed()
    }
}

fn command_definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new(PING).description("Check that the bot is alive"),
        CreateCommand::new(LATEST_NEWS).description("Show the latest Brawl Stars news"),
        CreateCommand::new(ADMIN_NEWS_CHANNEL)
            .description("Set the channel where Brawl Stars news is posted")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(CommandOptionType::Channel, "channel", "Channel for news posts")
                    .channel_types(vec![ChannelType::Text, ChannelType::News])
                    .required(true),
            ),
    ]
}

struct Handler {
    state: Arc<BotState>,
}

impl Handler {
    async fn handle_ping(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let message = CreateInteractionResponseMessage::new().content(commands::ping());
        command
            .create_response(&ctx.http, CreateInteractionResponse::Message(message))
            .await?;
        Ok(())
    }

    async fn handle_latest_news(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        // Aggregation takes a few seconds; acknowledge first
        command.defer(&ctx.http).await?;

        let response = match commands::latest_news(&self.state).await {
            Ok(items) => {
                let embeds: Vec<CreateEmbed> = items.iter().take(MAX_NEWS_LIMIT).map(news_embed).collect();
                EditInteractionResponse::new()
                    .content(format!("📰 Latest Brawl Stars news ({})", embeds.len()))
                    .embeds(embeds)
            }
            Err(e) => {
                log_command_error(LATEST_NEWS, &e);
                EditInteractionResponse::new().content(e.user_message())
            }
        };

        command.edit_response(&ctx.http, response).await?;
        Ok(())
    }

    async fn handle_news_channel(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let invoker = Invoker {
            guild_id: command.guild_id.map(|id| id.get()),
            is_admin: command
                .member
                .as_ref()
                .and_then(|m| m.permissions)
                .is_some_and(|p| p.administrator()),
        };

        let channel = command
            .data
            .options
            .iter()
            .find(|o| o.name == "channel")
            .and_then(|o| o.value.as_channel_id());

        let outcome = match channel {
            Some(channel) => commands::set_news_channel(&self.state, invoker, channel.get())
                .await
                .map(|_| format!("News will now be posted in <#{}>.", channel.get())),
            None => Err(BotError::InteractionFailure(anyhow::anyhow!("missing channel option"))),
        };

        let content = match outcome {
            Ok(message) => message,
            Err(e) => {
                log_command_error(ADMIN_NEWS_CHANNEL, &e);
                e.user_message().to_string()
            }
        };

        respond(ctx, command, content).await
    }
}

fn log_command_error(command: &str, e: &BotError) {
    if e.is_informational() {
        info!("/{}: {}", command, e);
    } else {
        warn!("/{} failed: {}", command, e);
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    let message = CreateInteractionResponseMessage::new().content(content).ephemeral(true);
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected to Discord!", ready.user.name);

        match Command::set_global_commands(&ctx.http, command_definitions()).await {
            Ok(registered) => info!("Registered {} slash commands", registered.len()),
            Err(e) => error!("Failed to register slash commands: {}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let result = match command.data.name.as_str() {
            PING => self.handle_ping(&ctx, &command).await,
            LATEST_NEWS => self.handle_latest_news(&ctx, &command).await,
            ADMIN_NEWS_CHANNEL => self.handle_news_channel(&ctx, &command).await,
            other => {
                warn!("Unknown command: {}", other);
                Ok(())
            }
        };

        // Last resort: tell the user something broke, never bring the bot down
        if let Err(e) = result {
            let failure = BotError::InteractionFailure(e);
            error!("/{}: {}", command.data.name, failure);

            let followup = EditInteractionResponse::new().content(failure.user_message());
            if command.edit_response(&ctx.http, followup).await.is_err() {
                if let Err(e) = respond(&ctx, &command, failure.user_message().to_string()).await {
                    warn!("/{}: could not report the failure to the user: {:#}", command.data.name, e);
                }
            }
        }
    }
}

/// Connects to the gateway, starts the news scheduler and runs until the
/// client stops.
pub async fn run(state: Arc<BotState>, token: &str, poll_interval: std::time::Duration) -> Result<()> {
    let handler = Handler { state: state.clone() };

    let mut client = Client::builder(token, GatewayIntents::GUILDS)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    let announcer: Arc<dyn Announcer> = Arc::new(DiscordAnnouncer::new(client.http.clone()));
    tokio::spawn(crate::scheduler::run_forever(state, announcer, poll_interval));

    client.start().await.context("Discord client stopped")?;
    Ok(())
}
