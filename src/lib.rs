pub mod aggregator;
pub mod commands;
pub mod config;
pub mod discord;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod models;
pub mod parser;
pub mod posted;
pub mod scheduler;
pub mod state;
pub mod store;

pub use aggregator::Aggregator;
pub use config::Settings;
pub use error::BotError;
pub use models::{FeedSource, GuildConfig, NewsItem, SourceKind};
pub use posted::PostedSet;
pub use state::BotState;
pub use store::StateStore;
