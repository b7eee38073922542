//! Post discovery index client.
//!
//! Public posts are announced to a central HTTP index so other users can
//! find them:
//!
//! ```text
//! POST /posts              register a post summary
//! POST /posts/index        register a content identifier
//! GET  /posts?since=&limit= page recent posts
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use board_types::{ContentId, PostSummary};
use serde::Deserialize;
use thiserror::Error;

/// Errors from the discovery index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The index could not be reached.
    #[error("discovery index unreachable: {0}")]
    Unreachable(String),

    /// The index answered with an error status.
    #[error("discovery index returned {0}")]
    Status(u16),

    /// The response body was not understood.
    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DiscoveryError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            DiscoveryError::Status(status.as_u16())
        } else {
            DiscoveryError::Unreachable(e.to_string())
        }
    }
}

/// Central index of public posts.
#[async_trait]
pub trait DiscoveryIndex: Send + Sync {
    /// Announce a post summary.
    async fn register_post(&self, summary: &PostSummary) -> Result<(), DiscoveryError>;

    /// Announce a content identifier.
    async fn register_cid(&self, cid: &ContentId) -> Result<(), DiscoveryError>;

    /// Posts newer than `since` (all posts if `None`), at most `limit`.
    async fn recent_posts(
        &self,
        since: Option<u64>,
        limit: usize,
    ) -> Result<Vec<PostSummary>, DiscoveryError>;
}

/// Either a bare array or `{ "posts": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostsPage {
    Bare(Vec<PostSummary>),
    Wrapped { posts: Vec<PostSummary> },
}

impl PostsPage {
    fn into_posts(self) -> Vec<PostSummary> {
        match self {
            PostsPage::Bare(posts) | PostsPage::Wrapped { posts } => posts,
        }
    }
}

/// [`DiscoveryIndex`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDiscovery {
    /// Create a client for the index at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DiscoveryIndex for HttpDiscovery {
    async fn register_post(&self, summary: &PostSummary) -> Result<(), DiscoveryError> {
        self.http
            .post(self.url("/posts"))
            .json(summary)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn register_cid(&self, cid: &ContentId) -> Result<(), DiscoveryError> {
        self.http
            .post(self.url("/posts/index"))
            .json(&serde_json::json!({ "cid": cid.as_str() }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recent_posts(
        &self,
        since: Option<u64>,
        limit: usize,
    ) -> Result<Vec<PostSummary>, DiscoveryError> {
        let mut request = self
            .http
            .get(self.url("/posts"))
            .query(&[("limit", limit.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_string())]);
        }
        let page: PostsPage = request.send().await?.error_for_status()?.json().await?;
        Ok(page.into_posts())
    }
}

#[derive(Debug, Default)]
struct MockDiscoveryInner {
    posts: Vec<PostSummary>,
    cids: Vec<ContentId>,
    queries: Vec<(Option<u64>, usize)>,
    offline: bool,
}

/// In-memory index for testing.
///
/// Registered posts are served back by `recent_posts`, filtered by
/// timestamp. Can be switched offline.
#[derive(Debug, Default, Clone)]
pub struct MockDiscovery {
    inner: Arc<Mutex<MockDiscoveryInner>>,
}

impl MockDiscovery {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Seed a post as if another user had registered it.
    pub fn seed(&self, summary: PostSummary) {
        self.lock().posts.push(summary);
    }

    /// Registered post summaries.
    pub fn posts(&self) -> Vec<PostSummary> {
        self.lock().posts.clone()
    }

    /// Registered identifiers.
    pub fn cids(&self) -> Vec<ContentId> {
        self.lock().cids.clone()
    }

    /// `(since, limit)` of every `recent_posts` call.
    pub fn queries(&self) -> Vec<(Option<u64>, usize)> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockDiscoveryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(inner: &MockDiscoveryInner) -> Result<(), DiscoveryError> {
        if inner.offline {
            Err(DiscoveryError::Unreachable("index offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DiscoveryIndex for MockDiscovery {
    async fn register_post(&self, summary: &PostSummary) -> Result<(), DiscoveryError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.posts.push(summary.clone());
        Ok(())
    }

    async fn register_cid(&self, cid: &ContentId) -> Result<(), DiscoveryError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        inner.cids.push(cid.clone());
        Ok(())
    }

    async fn recent_posts(
        &self,
        since: Option<u64>,
        limit: usize,
    ) -> Result<Vec<PostSummary>, DiscoveryError> {
        let mut inner = self.lock();
        inner.queries.push((since, limit));
        Self::check(&inner)?;
        let mut page: Vec<PostSummary> = inner
            .posts
            .iter()
            .filter(|p| since.map_or(true, |s| p.timestamp > s))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        page.truncate(limit);
        Ok(page)
    }
}
