use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::records::Record;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the storage core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation's input was rejected before anything was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A feed with this url already exists.
    #[error("a feed with url '{0}' already exists")]
    DuplicateFeed(String),

    /// Lookup target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence I/O failed; the in-progress single-record operation was
    /// not applied.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A durable record (or one being written) could not be (de)serialized.
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// OPML text could not be parsed.
    #[error(transparent)]
    Opml(#[from] crate::opml::OpmlError),

    /// The retention sweep hit a storage failure mid-flight. Deletions
    /// commit independently, so `removed` is the authoritative count of
    /// what is already gone.
    #[error("retention sweep aborted after {removed} removals: {source}")]
    SweepAborted {
        removed: u64,
        #[source]
        source: Box<StoreError>,
    },
}

// ============================================================================
// Identity
// ============================================================================

/// Opaque feed identity. Generated at add time; stable for the lifetime of
/// the subscription and still valid in article records after the feed is
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key for the article log: feed id and guid, separated by a
/// character that appears in neither.
pub(crate) fn article_key(feed_id: &FeedId, guid: &str) -> String {
    format!("{}\u{1f}{}", feed_id.as_str(), guid)
}

// ============================================================================
// Feeds
// ============================================================================

/// A subscribed feed.
///
/// `unread_count` is a cached, derived counter — it is skipped on
/// serialization and reset to 0 on every load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// `None` means uncategorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_activity: Option<f64>,
    #[serde(skip)]
    pub unread_count: i64,
}

impl Feed {
    /// Title shown in the tree; feeds that never reported one fall back to
    /// their url.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

impl Record for Feed {
    fn key(&self) -> String {
        self.id.as_str().to_owned()
    }
}

/// Attributes for [`crate::FeedRegistry::add_feed`]. Only `url` is required.
#[derive(Debug, Clone, Default)]
pub struct NewFeed {
    pub url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub favicon: Option<String>,
    pub category: Option<String>,
    pub average_activity: Option<f64>,
}

impl NewFeed {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Metadata harvested from a feed poll, applied through
/// [`crate::FeedRegistry::digest_feed_meta`].
#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    /// The document's "link" element; maps to the feed's `site_url`.
    pub link: Option<String>,
}

// ============================================================================
// Articles
// ============================================================================

/// An attachment advertised by an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// Durable article record.
///
/// `seq` is the insertion sequence: assigned once when the article is first
/// stored, preserved across upserts, and used as the stable tie-break for
/// equal publication dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredArticle {
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub feed_id: FeedId,
    pub pub_date: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enclosures: Vec<Enclosure>,
    #[serde(default)]
    pub read: bool,
    pub seq: u64,
}

impl StoredArticle {
    pub(crate) fn into_article(self, feed: Option<Feed>) -> Article {
        Article {
            guid: self.guid,
            url: self.url,
            feed_id: self.feed_id,
            pub_date: self.pub_date,
            title: self.title,
            body: self.body,
            tags: self.tags,
            enclosures: self.enclosures,
            read: self.read,
            feed,
        }
    }
}

impl Record for StoredArticle {
    fn key(&self) -> String {
        article_key(&self.feed_id, &self.guid)
    }
}

/// Article as returned from queries: the stored fields plus the owning feed
/// resolved through the registry (`None` once the feed has been removed —
/// articles deliberately outlive their subscription).
#[derive(Debug, Clone)]
pub struct Article {
    pub guid: String,
    pub url: Option<String>,
    pub feed_id: FeedId,
    pub pub_date: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub enclosures: Vec<Enclosure>,
    pub read: bool,
    pub feed: Option<Feed>,
}

/// Input to [`crate::ArticleStore::store`]. At least one of `guid` and
/// `url` must be present; a missing `pub_date` becomes the store-call time.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: FeedId,
    pub guid: Option<String>,
    pub url: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub enclosures: Vec<Enclosure>,
}

impl NewArticle {
    pub fn for_feed(feed_id: FeedId) -> Self {
        Self {
            feed_id,
            guid: None,
            url: None,
            pub_date: None,
            title: String::new(),
            body: String::new(),
            tags: Vec::new(),
            enclosures: Vec::new(),
        }
    }
}

/// Query scope for [`crate::ArticleStore::query`].
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub feed_id: Option<FeedId>,
    /// Only articles carrying this tag.
    pub tag: Option<String>,
    /// Only unread articles.
    pub unread_only: bool,
}

impl ArticleFilter {
    pub fn feed(feed_id: FeedId) -> Self {
        Self {
            feed_id: Some(feed_id),
            ..Self::default()
        }
    }

    pub(crate) fn matches(&self, article: &StoredArticle) -> bool {
        if let Some(feed_id) = &self.feed_id {
            if article.feed_id != *feed_id {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !article.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if self.unread_only && article.read {
            return false;
        }
        true
    }
}
