//! Typed domain events published by the storage core.
//!
//! The frontend subscribes through [`EventBus::subscribe`] and re-renders on
//! whatever it cares about; the core never holds a reference to a consumer.
//! A lagging subscriber loses the oldest events (broadcast semantics), which
//! is acceptable for render invalidation — consumers re-read the store.

use tokio::sync::broadcast;

use crate::storage::Feed;

/// Default broadcast buffer when no configuration overrides it.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Everything the storage core announces to the outside world.
///
/// Feed-carrying variants hold a snapshot taken at emission time —
/// `FeedRemoved` in particular still exposes the removed feed's `url`,
/// which favicon cleanup keys off.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    FeedAdded(Feed),
    FeedUpdated(Feed),
    /// A feed's `site_url` was assigned for the first time. Emitted once
    /// per feed; later edits only produce `FeedUpdated`.
    FeedSiteUrlSpecified(Feed),
    /// Emitted once per removed feed, including every feed removed by a
    /// cascading category removal.
    FeedRemoved(Feed),
    /// Emitted exactly once per OPML import, after all per-feed events.
    FeedsImported { added: usize },
    CategoryAdded(String),
    CategoryUpdated(String),
    CategoryRemoved(String),
    /// The global set of article tags changed.
    TagsListChanged,
}

/// Multi-subscriber event channel shared by the registry and article store.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Send only fails when nobody is subscribed, which
    /// is not an error for a notification bus.
    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Feed, FeedId};

    fn feed(url: &str) -> Feed {
        Feed {
            id: FeedId::new("feed-1"),
            url: url.to_string(),
            title: None,
            site_url: None,
            favicon: None,
            category: None,
            average_activity: None,
            unread_count: 0,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(StoreEvent::FeedAdded(feed("https://a.example/feed")));
        bus.emit(StoreEvent::TagsListChanged);

        match rx.try_recv().unwrap() {
            StoreEvent::FeedAdded(f) => assert_eq!(f.url, "https://a.example/feed"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), StoreEvent::TagsListChanged));
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        bus.emit(StoreEvent::TagsListChanged);
        // subscribing afterwards sees nothing
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
