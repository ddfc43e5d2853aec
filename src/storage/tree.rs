//! The sorted subscription tree: the read projection the sidebar renders.
//!
//! A pure function from (feeds, sticky category names) to an ordered node
//! list. The registry recomputes it after every mutation, so observers never
//! see a half-updated ordering.

use std::collections::HashMap;

use super::types::Feed;
use crate::util::collate;

/// A category with its member feeds, both collation-sorted.
#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub name: String,
    pub feeds: Vec<Feed>,
    /// Sum of the member feeds' cached unread counters.
    pub unread_count: i64,
}

/// One entry of the subscription tree: categories first, then feeds that
/// belong to no category.
#[derive(Debug, Clone)]
pub enum TreeNode {
    Category(CategoryNode),
    Feed(Feed),
}

impl TreeNode {
    /// Display title of the node, whichever kind it is.
    pub fn title(&self) -> &str {
        match self {
            TreeNode::Category(category) => &category.name,
            TreeNode::Feed(feed) => feed.display_title(),
        }
    }
}

/// Recomputes the tree from scratch.
///
/// Categories (those referenced by a feed plus the sticky ones, which may
/// be empty) sort among themselves, uncategorized feeds among themselves;
/// both groups use locale-aware collation with the url as a deterministic
/// tie-break for identical titles.
pub(crate) fn project<'a>(
    feeds: impl Iterator<Item = &'a Feed>,
    sticky: impl Iterator<Item = &'a str>,
) -> Vec<TreeNode> {
    let collator = collate::collator();

    let mut by_category: HashMap<String, Vec<Feed>> = HashMap::new();
    let mut uncategorized: Vec<Feed> = Vec::new();

    for feed in feeds {
        match &feed.category {
            Some(name) => by_category.entry(name.clone()).or_default().push(feed.clone()),
            None => uncategorized.push(feed.clone()),
        }
    }
    for name in sticky {
        by_category.entry(name.to_owned()).or_default();
    }

    let mut categories: Vec<CategoryNode> = by_category
        .into_iter()
        .map(|(name, mut feeds)| {
            feeds.sort_by(|a, b| {
                collator
                    .compare(a.display_title(), b.display_title())
                    .then_with(|| a.url.cmp(&b.url))
            });
            let unread_count = feeds.iter().map(|f| f.unread_count).sum();
            CategoryNode {
                name,
                feeds,
                unread_count,
            }
        })
        .collect();
    categories.sort_by(|a, b| collator.compare(&a.name, &b.name));

    uncategorized.sort_by(|a, b| {
        collator
            .compare(a.display_title(), b.display_title())
            .then_with(|| a.url.cmp(&b.url))
    });

    categories
        .into_iter()
        .map(TreeNode::Category)
        .chain(uncategorized.into_iter().map(TreeNode::Feed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FeedId;

    fn feed(url: &str, title: &str, category: Option<&str>) -> Feed {
        Feed {
            id: FeedId::new(url),
            url: url.to_string(),
            title: Some(title.to_string()),
            site_url: None,
            favicon: None,
            category: category.map(str::to_string),
            average_activity: None,
            unread_count: 0,
        }
    }

    #[test]
    fn collation_example_ordering() {
        // Ą/ą/ć exercise the utf-aware sort
        let feeds = vec![
            feed("d.com/feed", "d", None),
            feed("e.com/feed", "e", None),
            feed("c.com/feed", "c", Some("ć Second Category")),
            feed("a.com/feed", "ąĄ", Some("ą First Category")),
            feed("b.com/feed", "b", Some("ą First Category")),
        ];
        let sticky = ["Third Category"];

        let tree = project(feeds.iter(), sticky.iter().copied());

        assert_eq!(tree.len(), 5);
        assert_eq!(tree[0].title(), "ą First Category");
        assert_eq!(tree[1].title(), "ć Second Category");
        assert_eq!(tree[2].title(), "Third Category");
        assert_eq!(tree[3].title(), "d");
        assert_eq!(tree[4].title(), "e");

        match &tree[0] {
            TreeNode::Category(category) => {
                assert_eq!(category.feeds.len(), 2);
                assert_eq!(category.feeds[0].display_title(), "ąĄ");
                assert_eq!(category.feeds[1].display_title(), "b");
            }
            other => panic!("expected category node, got {other:?}"),
        }
        match &tree[2] {
            TreeNode::Category(category) => assert!(category.feeds.is_empty()),
            other => panic!("expected empty category node, got {other:?}"),
        }
    }

    #[test]
    fn untitled_feed_sorts_by_url() {
        let mut untitled = feed("m.com/feed", "", None);
        untitled.title = None;
        let feeds = vec![feed("z.com/feed", "a", None), untitled];

        let tree = project(feeds.iter(), std::iter::empty());
        assert_eq!(tree[0].title(), "a");
        assert_eq!(tree[1].title(), "m.com/feed");
    }

    #[test]
    fn unread_counts_roll_up_to_the_category() {
        let mut one = feed("a.com/feed", "a", Some("News"));
        one.unread_count = 3;
        let mut two = feed("b.com/feed", "b", Some("News"));
        two.unread_count = 4;

        let feeds = vec![one, two];
        let tree = project(feeds.iter(), std::iter::empty());

        match &tree[0] {
            TreeNode::Category(category) => assert_eq!(category.unread_count, 7),
            other => panic!("expected category node, got {other:?}"),
        }
    }
}
