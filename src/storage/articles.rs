//! The article store: durable articles with dedup, ordering and retention.
//!
//! Articles are keyed by (feed id, guid); a store call for an existing key
//! upserts, refreshing metadata while preserving user state (read flag,
//! tags, insertion sequence). Queries always answer newest-first with a
//! stable tie-break, and the retention sweep is the only thing that ever
//! deletes — removing a feed does not touch its articles.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::events::{EventBus, StoreEvent};

use super::feeds::FeedRegistry;
use super::records::Collection;
use super::types::{
    article_key, Article, ArticleFilter, Feed, FeedId, NewArticle, StoreError, StoredArticle,
};

pub(crate) struct ArticlesInner {
    collection: Collection<StoredArticle>,
    next_seq: u64,
}

/// Handle to the article store. Clones share one underlying collection.
#[derive(Clone)]
pub struct ArticleStore {
    inner: Arc<RwLock<ArticlesInner>>,
    dir: PathBuf,
    registry: FeedRegistry,
    events: EventBus,
}

impl ArticleStore {
    /// Loads the article log under `dir`. The registry handle is used only
    /// to decorate query results with the owning feed.
    pub async fn open(
        dir: impl AsRef<Path>,
        registry: FeedRegistry,
        events: EventBus,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let inner = Self::load(&dir).await?;
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            dir,
            registry,
            events,
        })
    }

    async fn load(dir: &Path) -> Result<ArticlesInner, StoreError> {
        let collection = Collection::open(dir.join("articles.db")).await?;
        let next_seq = collection.all().map(|a: &StoredArticle| a.seq).max().map_or(0, |s| s + 1);
        tracing::debug!(articles = collection.len(), "article store loaded");
        Ok(ArticlesInner {
            collection,
            next_seq,
        })
    }

    /// Discards all in-memory state and reloads from durable storage,
    /// releasing the previous log handle. Safe to call repeatedly.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let fresh = Self::load(&self.dir).await?;
        *self.inner.write().await = fresh;
        Ok(())
    }

    // ========================================================================
    // Storing
    // ========================================================================

    /// Upserts an article by (feed id, guid), the guid falling back to the
    /// url when absent. Rejected with `Validation` — and nothing persisted —
    /// when neither is present. A missing `pub_date` becomes the store-call
    /// time. On upsert the metadata is refreshed while the read flag, the
    /// insertion sequence and (unless new ones are supplied) the tags are
    /// preserved.
    pub async fn store(&self, new: NewArticle) -> Result<Article, StoreError> {
        let guid = match (&new.guid, &new.url) {
            (Some(guid), _) if !guid.is_empty() => guid.clone(),
            (_, Some(url)) if !url.is_empty() => url.clone(),
            _ => {
                return Err(StoreError::Validation(
                    "article has neither guid nor url".into(),
                ))
            }
        };

        let mut inner = self.inner.write().await;
        let key = article_key(&new.feed_id, &guid);
        let existing = inner.collection.get(&key).cloned();
        let tags_before = global_tags(&inner.collection);

        let (seq, read, prior_tags) = match &existing {
            Some(prior) => (prior.seq, prior.read, prior.tags.clone()),
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                (seq, false, Vec::new())
            }
        };
        let tags = if new.tags.is_empty() {
            prior_tags
        } else {
            dedup_tags(new.tags)
        };

        let record = StoredArticle {
            guid,
            url: new.url,
            feed_id: new.feed_id,
            pub_date: new.pub_date.unwrap_or_else(Utc::now),
            title: new.title,
            body: new.body,
            tags,
            enclosures: new.enclosures,
            read,
            seq,
        };
        inner.collection.put(record.clone()).await?;
        let tags_changed = tags_before != global_tags(&inner.collection);
        drop(inner);

        if tags_changed {
            self.events.emit(StoreEvent::TagsListChanged);
        }

        let feed = self.registry.get_feed_by_id(&record.feed_id).await;
        Ok(record.into_article(feed))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All matching articles, newest first. See [`ArticleStore::query_page`].
    pub async fn query(&self, filter: &ArticleFilter) -> Vec<Article> {
        self.query_page(filter, 0, None).await
    }

    /// Matching articles ordered by `pub_date` descending, ties broken by
    /// insertion order. `start_index` is 0-based; an out-of-range start
    /// yields an empty page. Every article carries its owning feed,
    /// resolved through the registry (`None` for removed feeds).
    pub async fn query_page(
        &self,
        filter: &ArticleFilter,
        start_index: usize,
        limit: Option<usize>,
    ) -> Vec<Article> {
        let inner = self.inner.read().await;
        let mut matches: Vec<&StoredArticle> =
            inner.collection.all().filter(|a| filter.matches(a)).collect();
        matches.sort_by(|a, b| {
            b.pub_date
                .cmp(&a.pub_date)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        let page: Vec<StoredArticle> = matches
            .into_iter()
            .skip(start_index)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        drop(inner);

        // resolve each distinct feed once per page
        let mut feeds: HashMap<String, Option<Feed>> = HashMap::new();
        let mut articles = Vec::with_capacity(page.len());
        for stored in page {
            let feed = match feeds.get(stored.feed_id.as_str()) {
                Some(feed) => feed.clone(),
                None => {
                    let feed = self.registry.get_feed_by_id(&stored.feed_id).await;
                    feeds.insert(stored.feed_id.as_str().to_owned(), feed.clone());
                    feed
                }
            };
            articles.push(stored.into_article(feed));
        }
        articles
    }

    /// Every tag currently in use across all stored articles,
    /// deduplicated, alphabetical.
    pub async fn all_tags(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        global_tags(&inner.collection).into_iter().collect()
    }

    /// Unread articles belonging to a feed. Feeds the cached counters on
    /// the registry side.
    pub async fn count_unread(&self, feed_id: &FeedId) -> u64 {
        self.inner
            .read()
            .await
            .collection
            .all()
            .filter(|a| a.feed_id == *feed_id && !a.read)
            .count() as u64
    }

    /// Byte size of the backing log. Reporting only.
    pub async fn db_size(&self) -> Result<u64, StoreError> {
        self.inner.read().await.collection.size_bytes().await
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Sets the read flag. Idempotent: setting the current value writes
    /// nothing.
    pub async fn set_read(
        &self,
        feed_id: &FeedId,
        guid: &str,
        read: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = article_key(feed_id, guid);
        let mut article = inner
            .collection
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("article '{guid}'")))?;
        if article.read == read {
            return Ok(());
        }
        article.read = read;
        inner.collection.put(article).await?;
        Ok(())
    }

    /// Adds a tag to an article (no-op when already present).
    pub async fn add_tag(
        &self,
        feed_id: &FeedId,
        guid: &str,
        tag: &str,
    ) -> Result<(), StoreError> {
        let tag = tag.trim().to_owned();
        if tag.is_empty() {
            return Err(StoreError::Validation("tag cannot be empty".into()));
        }
        self.edit_tags(feed_id, guid, |tags| {
            if !tags.iter().any(|t| *t == tag) {
                tags.push(tag);
            }
        })
        .await
    }

    /// Removes a tag from an article.
    pub async fn remove_tag(
        &self,
        feed_id: &FeedId,
        guid: &str,
        tag: &str,
    ) -> Result<(), StoreError> {
        self.edit_tags(feed_id, guid, |tags| tags.retain(|t| t != tag))
            .await
    }

    async fn edit_tags<F>(
        &self,
        feed_id: &FeedId,
        guid: &str,
        edit: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let mut inner = self.inner.write().await;
        let key = article_key(feed_id, guid);
        let mut article = inner
            .collection
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("article '{guid}'")))?;
        let tags_before = global_tags(&inner.collection);
        edit(&mut article.tags);
        inner.collection.put(article).await?;
        let tags_changed = tags_before != global_tags(&inner.collection);
        drop(inner);

        if tags_changed {
            self.events.emit(StoreEvent::TagsListChanged);
        }
        Ok(())
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Deletes every article published before `cutoff`, sparing tagged
    /// ones when `keep_tagged_forever` is set. Returns the exact count
    /// removed.
    ///
    /// Each deletion commits on its own; a storage failure mid-sweep
    /// surfaces as [`StoreError::SweepAborted`] whose `removed` field is
    /// the authoritative count of what is already gone. The write guard is
    /// held for the whole sweep, so interleaved queries observe the
    /// pre-sweep or post-sweep state, never a torn one.
    pub async fn remove_older_than(
        &self,
        cutoff: DateTime<Utc>,
        keep_tagged_forever: bool,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let victims: Vec<String> = inner
            .collection
            .all()
            .filter(|a| a.pub_date < cutoff && !(keep_tagged_forever && !a.tags.is_empty()))
            .map(|a| article_key(&a.feed_id, &a.guid))
            .collect();
        let tags_before = global_tags(&inner.collection);

        let mut removed = 0u64;
        for key in &victims {
            if let Err(source) = inner.collection.delete(key).await {
                tracing::warn!(removed, error = %source, "retention sweep aborted");
                return Err(StoreError::SweepAborted {
                    removed,
                    source: Box::new(source),
                });
            }
            removed += 1;
        }

        let tags_changed = tags_before != global_tags(&inner.collection);
        tracing::debug!(removed, cutoff = %cutoff, "retention sweep complete");
        drop(inner);

        if tags_changed {
            self.events.emit(StoreEvent::TagsListChanged);
        }
        Ok(removed)
    }

    /// Rewrites the article log to live records only.
    pub async fn compact(&self) -> Result<(), StoreError> {
        self.inner.write().await.collection.compact().await
    }
}

fn global_tags(collection: &Collection<StoredArticle>) -> BTreeSet<String> {
    collection
        .all()
        .flat_map(|a| a.tags.iter().cloned())
        .collect()
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
