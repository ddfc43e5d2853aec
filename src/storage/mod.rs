mod articles;
mod categories;
mod feeds;
mod records;
mod tree;
mod types;

pub use articles::ArticleStore;
pub use feeds::FeedRegistry;
pub use records::{Collection, Record};
pub use tree::{CategoryNode, TreeNode};
pub use types::{
    Article, ArticleFilter, Enclosure, Feed, FeedId, FeedMeta, NewArticle, NewFeed, StoreError,
};
