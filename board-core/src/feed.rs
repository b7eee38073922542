//! Local feed of posts.
//!
//! Posts are kept newest first and deduplicated by id. Comments on a post
//! are kept oldest first.

use board_types::{Address, Comment, Post};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from feed mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// No post with this id in the local feed.
    #[error("unknown post: {0}")]
    UnknownPost(String),

    /// Only the author may change a post.
    #[error("post {0} was not written by the local user")]
    NotAuthor(String),
}

/// The local feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    posts: Vec<Post>,
}

impl Feed {
    /// Empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts, newest first.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Look up a post.
    pub fn get(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// Number of posts.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Whether the feed is empty.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Timestamp of the newest post, if any.
    pub fn newest_timestamp(&self) -> Option<u64> {
        self.posts.first().map(|p| p.timestamp)
    }

    /// Insert a locally created post, replacing any post with the same id.
    pub fn insert(&mut self, post: Post) {
        self.posts.retain(|p| p.id != post.id);
        self.posts.push(post);
        self.sort();
    }

    /// Merge a page of remote posts. Posts already present keep their local
    /// copy (likes and comments live locally). Returns how many were new.
    pub fn merge(&mut self, page: Vec<Post>) -> usize {
        let mut added = 0;
        for post in page {
            if self.get(&post.id).is_none() {
                self.posts.push(post);
                added += 1;
            }
        }
        if added > 0 {
            self.sort();
        }
        added
    }

    /// Change the text of one of `author`'s posts.
    pub fn edit_post(
        &mut self,
        id: &str,
        author: &Address,
        content: impl Into<String>,
    ) -> Result<&Post, FeedError> {
        let post = self.get_mut(id)?;
        if &post.author_address != author {
            return Err(FeedError::NotAuthor(id.to_string()));
        }
        post.content = content.into();
        Ok(post)
    }

    /// Remove one of `author`'s posts.
    pub fn remove_post(&mut self, id: &str, author: &Address) -> Result<Post, FeedError> {
        let position = self
            .posts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| FeedError::UnknownPost(id.to_string()))?;
        if &self.posts[position].author_address != author {
            return Err(FeedError::NotAuthor(id.to_string()));
        }
        Ok(self.posts.remove(position))
    }

    /// Attach a comment, keeping comments in ascending timestamp order.
    pub fn add_comment(&mut self, comment: Comment) -> Result<&Post, FeedError> {
        let post = self.get_mut(&comment.post_id)?;
        if !post.comments.iter().any(|c| c.id == comment.id) {
            post.comments.push(comment);
            post.comments
                .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(post)
    }

    /// Increment a post's like counter.
    pub fn like(&mut self, id: &str) -> Result<u32, FeedError> {
        let post = self.get_mut(id)?;
        post.likes = post.likes.saturating_add(1);
        Ok(post.likes)
    }

    /// Decrement a post's like counter, stopping at zero.
    pub fn unlike(&mut self, id: &str) -> Result<u32, FeedError> {
        let post = self.get_mut(id)?;
        post.likes = post.likes.saturating_sub(1);
        Ok(post.likes)
    }

    /// Posts `viewer` may see. `follows` answers whether the viewer follows an author.
    pub fn visible_to(
        &self,
        viewer: Option<&Address>,
        follows: impl Fn(&Address) -> bool,
    ) -> Vec<&Post> {
        self.posts
            .iter()
            .filter(|p| p.is_visible_to(viewer, follows(&p.author_address)))
            .collect()
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Post, FeedError> {
        self.posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| FeedError::UnknownPost(id.to_string()))
    }

    fn sort(&mut self) {
        self.posts
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_types::Visibility;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn post(id: &str, author: &str, ts: u64, visibility: Visibility) -> Post {
        Post {
            id: id.into(),
            author_address: addr(author),
            content: format!("post {id}"),
            timestamp: ts,
            visibility,
            content_cid: None,
            media_items: vec![],
            likes: 0,
            comments: vec![],
        }
    }

    fn comment(post_id: &str, id: &str, ts: u64) -> Comment {
        Comment {
            id: id.into(),
            post_id: post_id.into(),
            author_address: addr("0xc"),
            content: "nice".into(),
            timestamp: ts,
        }
    }

    #[test]
    fn newest_first() {
        let mut feed = Feed::new();
        feed.insert(post("a", "0xa", 1, Visibility::Public));
        feed.insert(post("c", "0xa", 3, Visibility::Public));
        feed.insert(post("b", "0xa", 2, Visibility::Public));

        let ids: Vec<_> = feed.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(feed.newest_timestamp(), Some(3));
    }

    #[test]
    fn merge_dedupes_and_keeps_local_copy() {
        let mut feed = Feed::new();
        feed.insert(post("a", "0xa", 1, Visibility::Public));
        feed.like("a").unwrap();

        let added = feed.merge(vec![
            post("a", "0xa", 1, Visibility::Public),
            post("b", "0xb", 2, Visibility::Public),
            post("b", "0xb", 2, Visibility::Public),
        ]);

        assert_eq!(added, 1);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.get("a").unwrap().likes, 1);
    }

    #[test]
    fn comments_sorted_ascending() {
        let mut feed = Feed::new();
        feed.insert(post("p", "0xa", 1, Visibility::Public));

        feed.add_comment(comment("p", "late", 30)).unwrap();
        feed.add_comment(comment("p", "early", 10)).unwrap();
        let post = feed.add_comment(comment("p", "early", 10)).unwrap();

        let ids: Vec<_> = post.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn comment_on_unknown_post() {
        let mut feed = Feed::new();
        assert_eq!(
            feed.add_comment(comment("ghost", "c", 1)).unwrap_err(),
            FeedError::UnknownPost("ghost".into())
        );
    }

    #[test]
    fn likes_never_go_negative() {
        let mut feed = Feed::new();
        feed.insert(post("p", "0xa", 1, Visibility::Public));
        assert_eq!(feed.unlike("p").unwrap(), 0);
        assert_eq!(feed.like("p").unwrap(), 1);
        assert_eq!(feed.unlike("p").unwrap(), 0);
    }

    #[test]
    fn only_author_edits_and_removes() {
        let mut feed = Feed::new();
        feed.insert(post("p", "0xa", 1, Visibility::Public));

        assert_eq!(
            feed.edit_post("p", &addr("0xb"), "hijack").unwrap_err(),
            FeedError::NotAuthor("p".into())
        );
        assert_eq!(feed.edit_post("p", &addr("0xa"), "fixed").unwrap().content, "fixed");
        assert!(feed.remove_post("p", &addr("0xb")).is_err());
        assert_eq!(feed.remove_post("p", &addr("0xa")).unwrap().id, "p");
        assert!(feed.is_empty());
    }

    #[test]
    fn visibility_filter() {
        let mut feed = Feed::new();
        feed.insert(post("pub", "0xa", 3, Visibility::Public));
        feed.insert(post("fol", "0xa", 2, Visibility::Followers));
        feed.insert(post(
            "priv",
            "0xa",
            1,
            Visibility::Private {
                allowed: vec![addr("0xfriend")],
            },
        ));

        let stranger = addr("0xstranger");
        let seen: Vec<_> = feed
            .visible_to(Some(&stranger), |_| false)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(seen, vec!["pub"]);

        let friend = addr("0xfriend");
        let seen: Vec<_> = feed
            .visible_to(Some(&friend), |_| true)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(seen, vec!["pub", "fol", "priv"]);
    }
}
