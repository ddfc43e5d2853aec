//! The feed registry: the authoritative in-memory feed/category model.
//!
//! All reads answer from memory; every mutation persists through the record
//! log before it becomes visible, recomputes the tree projection, and then
//! publishes its event. Category operations live in `categories.rs`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::events::{EventBus, StoreEvent};
use crate::opml;

use super::categories::{normalize_category, CategoryRecord};
use super::records::Collection;
use super::tree::{self, TreeNode};
use super::types::{Feed, FeedId, FeedMeta, NewFeed, StoreError};

pub(crate) struct RegistryInner {
    pub(crate) feeds: Collection<Feed>,
    pub(crate) categories: Collection<CategoryRecord>,
    pub(crate) tree: Vec<TreeNode>,
}

impl RegistryInner {
    pub(crate) fn rebuild_tree(&mut self) {
        self.tree = tree::project(
            self.feeds.all(),
            self.categories.all().map(|c| c.name.as_str()),
        );
    }
}

/// Handle to the feed registry. Clones share one underlying model.
#[derive(Clone)]
pub struct FeedRegistry {
    pub(crate) inner: Arc<RwLock<RegistryInner>>,
    dir: PathBuf,
    pub(crate) events: EventBus,
}

impl FeedRegistry {
    /// Loads the registry from the record logs under `dir`, creating them
    /// if absent.
    pub async fn open(dir: impl AsRef<Path>, events: EventBus) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let inner = Self::load(&dir).await?;
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            dir,
            events,
        })
    }

    async fn load(dir: &Path) -> Result<RegistryInner, StoreError> {
        let feeds = Collection::open(dir.join("feeds.db")).await?;
        let categories = Collection::open(dir.join("categories.db")).await?;
        let mut inner = RegistryInner {
            feeds,
            categories,
            tree: Vec::new(),
        };
        inner.rebuild_tree();
        tracing::debug!(
            feeds = inner.feeds.len(),
            categories = inner.categories.len(),
            "feed registry loaded"
        );
        Ok(inner)
    }

    /// Discards all in-memory state and reloads from durable storage. The
    /// previous log handles are released when the fresh state replaces
    /// them. Safe to call repeatedly.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let fresh = Self::load(&self.dir).await?;
        *self.inner.write().await = fresh;
        Ok(())
    }

    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribes to a feed. The url is required and must be unique.
    pub async fn add_feed(&self, new: NewFeed) -> Result<Feed, StoreError> {
        if new.url.trim().is_empty() {
            return Err(StoreError::Validation("feed url must not be empty".into()));
        }

        let mut inner = self.inner.write().await;
        if inner.feeds.all().any(|f| f.url == new.url) {
            return Err(StoreError::DuplicateFeed(new.url));
        }

        let feed = Feed {
            id: FeedId::generate(),
            url: new.url,
            title: new.title,
            site_url: new.site_url,
            favicon: new.favicon,
            category: normalize_category(new.category),
            average_activity: new.average_activity,
            unread_count: 0,
        };
        inner.feeds.put(feed.clone()).await?;
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::FeedAdded(feed.clone()));
        Ok(feed)
    }

    pub async fn get_feed_by_id(&self, id: &FeedId) -> Option<Feed> {
        self.inner.read().await.feeds.get(id.as_str()).cloned()
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Option<Feed> {
        self.inner
            .read()
            .await
            .feeds
            .all()
            .find(|f| f.url == url)
            .cloned()
    }

    /// Unsubscribes a feed and returns its final state (also carried on the
    /// `FeedRemoved` event). The feed's articles stay in the article store:
    /// read history deliberately outlives the subscription.
    pub async fn remove_feed(&self, id: &FeedId) -> Result<Feed, StoreError> {
        let mut inner = self.inner.write().await;
        let feed = inner
            .feeds
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("feed {id}")))?;
        inner.feeds.delete(id.as_str()).await?;
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::FeedRemoved(feed.clone()));
        Ok(feed)
    }

    // ========================================================================
    // Feed Field Mutation
    // ========================================================================
    // Each setter persists immediately, recomputes the tree, and emits
    // `FeedUpdated`; there is no batching.

    pub async fn set_feed_title(
        &self,
        id: &FeedId,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        let title = title.into();
        self.update_feed(id, |feed| feed.title = Some(title)).await?;
        Ok(())
    }

    /// Sets the feed's website url. The first assignment on a feed that
    /// never had one additionally emits `FeedSiteUrlSpecified` — a one-time
    /// transition the favicon collaborator keys off.
    pub async fn set_feed_site_url(
        &self,
        id: &FeedId,
        site_url: impl Into<String>,
    ) -> Result<(), StoreError> {
        let site_url = site_url.into();
        let mut first_assignment = false;
        let feed = self
            .update_feed(id, |feed| {
                first_assignment = feed.site_url.is_none();
                feed.site_url = Some(site_url);
            })
            .await?;
        if first_assignment {
            self.events.emit(StoreEvent::FeedSiteUrlSpecified(feed));
        }
        Ok(())
    }

    /// Moves the feed to a category (`None` = uncategorized). A name with
    /// no existing category materializes it in the tree; such implicit
    /// categories vanish again when their last feed leaves, unless they
    /// were created explicitly via `add_category`.
    pub async fn set_feed_category(
        &self,
        id: &FeedId,
        category: Option<String>,
    ) -> Result<(), StoreError> {
        let category = normalize_category(category);
        self.update_feed(id, |feed| feed.category = category).await?;
        Ok(())
    }

    pub async fn set_feed_favicon(
        &self,
        id: &FeedId,
        favicon: Option<String>,
    ) -> Result<(), StoreError> {
        self.update_feed(id, |feed| feed.favicon = favicon).await?;
        Ok(())
    }

    pub async fn set_feed_average_activity(
        &self,
        id: &FeedId,
        average_activity: Option<f64>,
    ) -> Result<(), StoreError> {
        self.update_feed(id, |feed| feed.average_activity = average_activity)
            .await?;
        Ok(())
    }

    /// Updates the cached unread counter. Derived data: kept in memory
    /// only, never written to the log, reset to 0 on reload.
    pub async fn set_feed_unread_count(&self, id: &FeedId, count: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let snapshot = {
            let feed = inner
                .feeds
                .get_mut(id.as_str())
                .ok_or_else(|| StoreError::NotFound(format!("feed {id}")))?;
            feed.unread_count = count;
            feed.clone()
        };
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::FeedUpdated(snapshot));
        Ok(())
    }

    /// Applies metadata harvested by the feed-fetch collaborator to the
    /// feed with this url.
    pub async fn digest_feed_meta(&self, url: &str, meta: FeedMeta) -> Result<(), StoreError> {
        let id = self
            .get_feed_by_url(url)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("feed with url '{url}'")))?
            .id;

        if let Some(title) = meta.title {
            self.set_feed_title(&id, title).await?;
        }
        if let Some(link) = meta.link {
            self.set_feed_site_url(&id, link).await?;
        }
        Ok(())
    }

    async fn update_feed<F>(&self, id: &FeedId, apply: F) -> Result<Feed, StoreError>
    where
        F: FnOnce(&mut Feed),
    {
        let mut inner = self.inner.write().await;
        let mut feed = inner
            .feeds
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("feed {id}")))?;
        apply(&mut feed);
        inner.feeds.put(feed.clone()).await?;
        inner.rebuild_tree();
        drop(inner);

        self.events.emit(StoreEvent::FeedUpdated(feed.clone()));
        Ok(feed)
    }

    // ========================================================================
    // Projections
    // ========================================================================

    /// The sorted subscription tree. A fresh copy of the cached projection;
    /// mutating it does not touch the registry.
    pub async fn tree(&self) -> Vec<TreeNode> {
        self.inner.read().await.tree.clone()
    }

    /// All feeds, collation-sorted by display title.
    pub async fn feeds(&self) -> Vec<Feed> {
        let inner = self.inner.read().await;
        let collator = crate::util::collate::collator();
        let mut feeds: Vec<Feed> = inner.feeds.all().cloned().collect();
        feeds.sort_by(|a, b| {
            collator
                .compare(a.display_title(), b.display_title())
                .then_with(|| a.url.cmp(&b.url))
        });
        feeds
    }

    /// Distinct category names currently in the tree (implicit and sticky),
    /// collation-sorted.
    pub async fn categories_names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .tree
            .iter()
            .filter_map(|node| match node {
                TreeNode::Category(category) => Some(category.name.clone()),
                TreeNode::Feed(_) => None,
            })
            .collect()
    }

    /// Sum of the cached unread counters across all feeds.
    pub async fn unread_total(&self) -> i64 {
        self.inner
            .read()
            .await
            .feeds
            .all()
            .map(|f| f.unread_count)
            .sum()
    }

    // ========================================================================
    // OPML
    // ========================================================================

    /// Imports subscriptions from an OPML document. Grouping outlines
    /// become sticky categories; entries already subscribed (by url) are
    /// skipped. Every created feed emits its own `FeedAdded`; exactly one
    /// `FeedsImported` follows. Returns the number of feeds created.
    pub async fn import_opml(&self, xml: &str) -> Result<usize, StoreError> {
        let document = opml::parse(xml)?;

        for name in &document.categories {
            self.add_category(name).await?;
        }

        let mut added = 0usize;
        for entry in document.entries {
            if self.get_feed_by_url(&entry.xml_url).await.is_some() {
                tracing::debug!(url = %entry.xml_url, "skipping already-subscribed feed");
                continue;
            }
            self.add_feed(NewFeed {
                url: entry.xml_url,
                title: entry.title,
                site_url: entry.html_url,
                category: entry.category,
                ..NewFeed::default()
            })
            .await?;
            added += 1;
        }

        self.events.emit(StoreEvent::FeedsImported { added });
        Ok(added)
    }

    /// Serializes the current subscription tree as OPML 2.0 text, category
    /// grouping and empty sticky categories included.
    pub async fn export_opml(&self) -> Result<String, StoreError> {
        let tree = self.tree().await;
        Ok(opml::export(&tree)?)
    }
}
