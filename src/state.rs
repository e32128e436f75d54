use anyhow::Result;
use tokio::sync::Mutex;

use crate::aggregator::Aggregator;
use crate::config::Settings;
use crate::fetcher;
use crate::store::StateStore;

/// Everything the command handlers and the scheduler share
pub struct BotState {
    pub aggregator: Aggregator,
    pub store: Mutex<StateStore>,
    pub news_limit: usize,
    /// Held for the whole of a scheduled cycle so cycles never overlap
    pub(crate) cycle_lock: Mutex<()>,
}

impl BotState {
    pub fn new(aggregator: Aggregator, store: StateStore, news_limit: usize) -> Self {
        Self {
            aggregator,
            store: Mutex::new(store),
            news_limit,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = fetcher::build_client(&settings.user_agent, settings.fetch_timeout())?;
        let aggregator = Aggregator::from_sources(&client, &settings.sources, settings.fetch_timeout());
        let store = StateStore::open(settings.data_dir(), settings.retention())?;
        Ok(Self::new(aggregator, store, settings.news_limit))
    }
}
