use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::models::NewsItem;

/// Identity keys that have already been announced, with the time each was
/// last seen in an aggregate. Keys not seen for longer than the retention
/// window are evicted by [`PostedSet::prune`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostedSet {
    entries: HashMap<String, DateTime<Utc>>,
}

impl PostedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Items whose key has not been marked yet, in their original order
    pub fn filter_unposted(&self, items: &[NewsItem]) -> Vec<NewsItem> {
        items
            .iter()
            .filter(|item| !self.contains(item.key()))
            .cloned()
            .collect()
    }

    /// Records the items as announced at `now`
    pub fn mark_posted(&mut self, items: &[NewsItem], now: DateTime<Utc>) {
        for item in items {
            self.entries.insert(item.key().to_string(), now);
        }
    }

    /// Refreshes the timestamp of every already-posted key among `items`.
    /// Unknown keys are ignored. Returns how many were refreshed.
    pub fn touch(&mut self, items: &[NewsItem], now: DateTime<Utc>) -> usize {
        let mut touched = 0;
        for item in items {
            if let Some(seen_at) = self.entries.get_mut(item.key()) {
                *seen_at = now;
                touched += 1;
            }
        }
        touched
    }

    /// Drops keys last seen more than `retention` before `now`.
    /// Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        // A window reaching past the earliest representable time keeps everything
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, seen_at| *seen_at >= cutoff);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Pruned {} posted keys older than {}", removed, cutoff);
        }
        removed
    }
}
