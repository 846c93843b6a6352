//! Channel catalog
//!
//! Owns the current channel set in playlist order, a lookup index by id and
//! the derived category set. Records are only ever changed through
//! [`ChannelCatalog::apply_liveness`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ChannelRecord, Liveness, ALL_CATEGORIES};

/// Shared access to a catalog; readers take `read()`, the loader and the
/// prober take `write()`
pub type CatalogHandle = Arc<RwLock<ChannelCatalog>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LivenessSummary {
    pub unknown: usize,
    pub reachable: usize,
    pub unreachable: usize,
}

#[derive(Debug, Default)]
pub struct ChannelCatalog {
    channels: Vec<ChannelRecord>,
    index: HashMap<Uuid, usize>,
    categories: BTreeSet<String>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> CatalogHandle {
        Arc::new(RwLock::new(self))
    }

    /// Replace the whole channel set. Records without a stream URL and
    /// repeated ids are dropped; the first record with a given id wins.
    pub fn load(&mut self, records: Vec<ChannelRecord>) -> usize {
        self.channels.clear();
        self.index.clear();
        self.categories.clear();

        for record in records {
            if record.stream_url.trim().is_empty() {
                debug!("Dropping channel '{}' without stream URL", record.name);
                continue;
            }
            if self.index.contains_key(&record.id) {
                debug!("Dropping duplicate channel id {}", record.id);
                continue;
            }
            if !record.category.is_empty() {
                self.categories.insert(record.category.clone());
            }
            self.index.insert(record.id, self.channels.len());
            self.channels.push(record);
        }

        info!(
            "Catalog loaded {} channels in {} categories",
            self.channels.len(),
            self.categories.len()
        );
        self.channels.len()
    }

    pub fn all(&self) -> &[ChannelRecord] {
        &self.channels
    }

    pub fn by_id(&self, id: Uuid) -> Option<&ChannelRecord> {
        self.index.get(&id).map(|&i| &self.channels[i])
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Channels in `category`, in playlist order; `"all"` matches everything
    pub fn filter(&self, category: &str) -> Vec<&ChannelRecord> {
        if category == ALL_CATEGORIES {
            return self.channels.iter().collect();
        }
        self.channels
            .iter()
            .filter(|c| c.category == category)
            .collect()
    }

    /// Channels not known to be unreachable
    pub fn reachable(&self) -> Vec<&ChannelRecord> {
        self.channels
            .iter()
            .filter(|c| c.liveness != Liveness::Unreachable)
            .collect()
    }

    /// Record probe results. Ids that are no longer loaded are ignored, so a
    /// pass that raced a reload is harmless. Returns how many records changed.
    pub fn apply_liveness<I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = (Uuid, Liveness)>,
    {
        let mut changed = 0;
        for (id, liveness) in results {
            if let Some(&i) = self.index.get(&id) {
                let channel = &mut self.channels[i];
                if channel.liveness != liveness {
                    channel.liveness = liveness;
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn liveness_summary(&self) -> LivenessSummary {
        self.channels
            .iter()
            .fold(LivenessSummary::default(), |mut summary, c| {
                match c.liveness {
                    Liveness::Unknown => summary.unknown += 1,
                    Liveness::Reachable => summary.reachable += 1,
                    Liveness::Unreachable => summary.unreachable += 1,
                }
                summary
            })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
