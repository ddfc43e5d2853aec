//! Category operations on the registry.
//!
//! Categories are mostly virtual — a feed's `category` string materializes
//! one in the tree. Only explicitly created ("sticky") categories get a
//! record of their own, which is what lets them exist with zero feeds and
//! survive restarts.

use serde::{Deserialize, Serialize};

use crate::events::StoreEvent;
use crate::util::strip_control_chars;

use super::feeds::FeedRegistry;
use super::records::Record;
use super::types::{Feed, FeedId, StoreError};

/// Sticky category entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CategoryRecord {
    pub name: String,
}

impl Record for CategoryRecord {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Validates a category name: control characters stripped, whitespace
/// trimmed, empty rejected.
fn sanitize_name(name: &str) -> Result<String, StoreError> {
    let stripped = strip_control_chars(name);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(
            "category name cannot be empty or whitespace-only".into(),
        ));
    }
    Ok(trimmed.to_owned())
}

/// Same cleanup for a feed's category assignment, where an empty name just
/// means uncategorized.
pub(crate) fn normalize_category(category: Option<String>) -> Option<String> {
    category.and_then(|name| {
        let stripped = strip_control_chars(&name);
        let trimmed = stripped.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    })
}

impl FeedRegistry {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Explicitly creates a category. Sticky: it stays in the tree with
    /// zero feeds and across restarts. Idempotent for names that are
    /// already sticky.
    pub async fn add_category(&self, name: &str) -> Result<(), StoreError> {
        let name = sanitize_name(name)?;

        let mut inner = self.inner.write().await;
        if inner.categories.get(&name).is_some() {
            return Ok(());
        }
        inner
            .categories
            .put(CategoryRecord { name: name.clone() })
            .await?;
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::CategoryAdded(name));
        Ok(())
    }

    /// Removes a category, cascading into its feeds: every member feed is
    /// removed individually, one `FeedRemoved` event each, so per-feed
    /// subscribers (favicon cleanup) observe every removal. A single
    /// `CategoryRemoved` follows.
    pub async fn remove_category(&self, name: &str) -> Result<(), StoreError> {
        let members: Vec<FeedId> = {
            let inner = self.inner.read().await;
            let known = inner.categories.get(name).is_some()
                || inner.feeds.all().any(|f| f.category.as_deref() == Some(name));
            if !known {
                return Err(StoreError::NotFound(format!("category '{name}'")));
            }
            inner
                .feeds
                .all()
                .filter(|f| f.category.as_deref() == Some(name))
                .map(|f| f.id.clone())
                .collect()
        };

        for id in members {
            self.remove_feed(&id).await?;
        }

        let mut inner = self.inner.write().await;
        inner.categories.delete(name).await?;
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::CategoryRemoved(name.to_owned()));
        Ok(())
    }

    /// Renames a category, moving every member feed along. Holding the
    /// write guard across the whole rename keeps the tree atomic for
    /// observers: they see the old name everywhere or the new one,
    /// never a mix.
    pub async fn rename_category(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let new = sanitize_name(new)?;

        let mut inner = self.inner.write().await;
        let sticky = inner.categories.get(old).is_some();
        let members: Vec<Feed> = inner
            .feeds
            .all()
            .filter(|f| f.category.as_deref() == Some(old))
            .cloned()
            .collect();
        if !sticky && members.is_empty() {
            return Err(StoreError::NotFound(format!("category '{old}'")));
        }

        for mut feed in members {
            feed.category = Some(new.clone());
            inner.feeds.put(feed).await?;
        }
        if sticky {
            inner.categories.delete(old).await?;
            inner
                .categories
                .put(CategoryRecord { name: new.clone() })
                .await?;
        }
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::CategoryUpdated(new));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::events::{EventBus, StoreEvent};
    use crate::storage::{FeedRegistry, NewFeed, StoreError, TreeNode};

    async fn test_registry() -> (FeedRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = FeedRegistry::open(dir.path(), EventBus::default())
            .await
            .unwrap();
        (registry, dir)
    }

    fn categorized(url: &str, title: &str, category: &str) -> NewFeed {
        NewFeed {
            url: url.into(),
            title: Some(title.into()),
            category: Some(category.into()),
            ..NewFeed::default()
        }
    }

    #[tokio::test]
    async fn explicit_category_exists_with_zero_feeds() {
        let (registry, _dir) = test_registry().await;

        registry.add_category("Third Category").await.unwrap();

        let tree = registry.tree().await;
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            TreeNode::Category(category) => {
                assert_eq!(category.name, "Third Category");
                assert!(category.feeds.is_empty());
            }
            other => panic!("expected category node, got {other:?}"),
        }

        // sticky across restarts
        registry.reload().await.unwrap();
        assert_eq!(registry.categories_names().await, vec!["Third Category"]);
    }

    #[tokio::test]
    async fn add_category_is_idempotent_and_sanitized() {
        let (registry, _dir) = test_registry().await;

        registry.add_category("  News  ").await.unwrap();
        registry.add_category("News").await.unwrap();
        assert_eq!(registry.categories_names().await, vec!["News"]);

        let err = registry.add_category("   ").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = registry.add_category("\x1b[31m\x1b[0m").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn implicit_category_disappears_with_its_last_feed() {
        let (registry, _dir) = test_registry().await;

        let feed = registry
            .add_feed(categorized("a.com/feed", "a", "Fleeting"))
            .await
            .unwrap();
        assert_eq!(registry.categories_names().await, vec!["Fleeting"]);

        registry.set_feed_category(&feed.id, None).await.unwrap();
        assert!(registry.categories_names().await.is_empty());
    }

    #[tokio::test]
    async fn sticky_category_survives_losing_its_last_feed() {
        let (registry, _dir) = test_registry().await;

        registry.add_category("Keeper").await.unwrap();
        let feed = registry
            .add_feed(categorized("a.com/feed", "a", "Keeper"))
            .await
            .unwrap();

        registry.remove_feed(&feed.id).await.unwrap();
        assert_eq!(registry.categories_names().await, vec!["Keeper"]);
    }

    #[tokio::test]
    async fn remove_category_cascades_one_event_per_feed() {
        let (registry, _dir) = test_registry().await;

        registry
            .add_feed(categorized("a.com/feed", "ąĄ", "ą First Category"))
            .await
            .unwrap();
        registry
            .add_feed(categorized("b.com/feed", "b", "ą First Category"))
            .await
            .unwrap();
        registry
            .add_feed(categorized("c.com/feed", "c", "ć Second Category"))
            .await
            .unwrap();

        let mut rx = registry.events.subscribe();
        registry.remove_category("ą First Category").await.unwrap();

        let mut removed_urls = Vec::new();
        let mut category_removed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                StoreEvent::FeedRemoved(feed) => removed_urls.push(feed.url),
                StoreEvent::CategoryRemoved(name) => {
                    assert_eq!(name, "ą First Category");
                    category_removed += 1;
                }
                _ => {}
            }
        }
        removed_urls.sort();
        assert_eq!(removed_urls, vec!["a.com/feed", "b.com/feed"]);
        assert_eq!(category_removed, 1);

        let tree = registry.tree().await;
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].title(), "ć Second Category");
        assert_eq!(registry.feeds().await.len(), 1);
    }

    #[tokio::test]
    async fn remove_unknown_category_fails() {
        let (registry, _dir) = test_registry().await;
        let err = registry.remove_category("Ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_moves_member_feeds_and_resorts() {
        let (registry, _dir) = test_registry().await;

        registry.add_category("Alpha").await.unwrap();
        registry
            .add_feed(categorized("a.com/feed", "a", "Alpha"))
            .await
            .unwrap();
        registry
            .add_feed(categorized("m.com/feed", "m", "Middle"))
            .await
            .unwrap();

        registry.rename_category("Alpha", "Zulu").await.unwrap();

        assert_eq!(registry.categories_names().await, vec!["Middle", "Zulu"]);
        let feed = registry.get_feed_by_url("a.com/feed").await.unwrap();
        assert_eq!(feed.category.as_deref(), Some("Zulu"));

        // the rename is durable for both the sticky record and the members
        registry.reload().await.unwrap();
        assert_eq!(registry.categories_names().await, vec!["Middle", "Zulu"]);
    }

    #[tokio::test]
    async fn rename_unknown_category_fails() {
        let (registry, _dir) = test_registry().await;
        let err = registry.rename_category("Ghost", "Shell").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
