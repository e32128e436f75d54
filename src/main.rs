use anyhow::Result;
use brawlnews::{fetcher, format, Aggregator, BotState, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brawlnews")]
#[command(about = "Posts Brawl Stars news from YouTube, the blog and the news API to Discord", long_about = None)]
struct Cli {
    /// JSON settings file; defaults are used for anything it leaves out
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and post news on a timer
    Run,
    /// Fetch and print the latest news without touching Discord
    Latest {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List the configured feed sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => {
            let token = settings.require_token()?.to_string();
            let state = Arc::new(BotState::from_settings(&settings)?);
            info!(
                "Starting with {} sources, state in {}",
                state.aggregator.source_count(),
                settings.data_dir().display()
            );
            brawlnews::discord::run(state, &token, settings.poll_interval()).await?;
        }
        Commands::Latest { limit } => {
            let client = fetcher::build_client(&settings.user_agent, settings.fetch_timeout())?;
            let aggregator = Aggregator::from_sources(&client, &settings.sources, settings.fetch_timeout());
            let items = aggregator.latest(limit.unwrap_or(settings.news_limit)).await;

            if items.is_empty() {
                println!("No news found.");
            }
            for item in items {
                println!("{}\n", format::format_item(&item));
            }
        }
        Commands::Sources => {
            for source in &settings.sources {
                println!("{:<10} {:?}\t{}", source.name, source.kind, source.url);
            }
        }
    }

    Ok(())
}
