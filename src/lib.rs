//! Offline article store and feed registry core for a desktop RSS reader.
//!
//! This crate is the persistence and query layer a desktop frontend builds
//! on: a durable [`ArticleStore`] deduplicating articles by (feed, guid),
//! a [`FeedRegistry`] holding the authoritative feed/category model and its
//! sorted [`TreeNode`] projection, and the append/compact record log both of
//! them persist through. Mutations publish [`StoreEvent`]s on a broadcast
//! bus so the UI layer can re-render without the core knowing about it.
//!
//! Everything network-facing — feed polling, favicon fetching — lives in
//! collaborator crates. They feed discovered articles into
//! [`ArticleStore::store`] and poll results into
//! [`FeedRegistry::digest_feed_meta`].

pub mod config;
pub mod events;
pub mod opml;
pub mod storage;
mod util;
mod vault;

pub use config::{Config, ConfigError};
pub use events::{EventBus, StoreEvent};
pub use opml::{OpmlDocument, OpmlEntry, OpmlError};
pub use storage::{
    Article, ArticleFilter, ArticleStore, CategoryNode, Collection, Enclosure, Feed, FeedId,
    FeedMeta, FeedRegistry, NewArticle, NewFeed, Record, StoreError, TreeNode,
};
pub use vault::Vault;
