//! Top-level wiring: one call to open the registry, the article store and
//! the event bus they share.

use chrono::{Duration, Utc};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::events::{EventBus, StoreEvent};
use crate::storage::{ArticleStore, FeedRegistry, StoreError};

/// Everything the desktop frontend talks to.
///
/// Handles are cheap to clone and share the underlying state, so a `Vault`
/// can be handed to each component that needs it instead of living in a
/// process-wide global.
#[derive(Clone)]
pub struct Vault {
    pub registry: FeedRegistry,
    pub articles: ArticleStore,
    events: EventBus,
    retention_days: u32,
    keep_tagged_forever: bool,
}

impl Vault {
    /// Opens (or creates) the record logs under the configured data
    /// directory and wires both stores to a shared event bus.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let events = EventBus::new(config.event_buffer);
        let registry = FeedRegistry::open(&config.data_dir, events.clone()).await?;
        let articles =
            ArticleStore::open(&config.data_dir, registry.clone(), events.clone()).await?;
        Ok(Self {
            registry,
            articles,
            events,
            retention_days: config.retention_days,
            keep_tagged_forever: config.keep_tagged_forever,
        })
    }

    /// Subscribes to the domain events both stores publish.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Applies the configured retention policy: removes untagged articles
    /// older than `retention_days` (and tagged ones too, unless
    /// `keep_tagged_forever` is set). Returns the number removed;
    /// `retention_days = 0` disables the sweep.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        if self.retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        self.articles
            .remove_older_than(cutoff, self.keep_tagged_forever)
            .await
    }
}
