//! Feed service: publishing and paging posts.
//!
//! A post is written to the content store as a canonical JSON document and
//! pinned; public posts are also announced to the discovery index. The
//! local [`Feed`] holds what the user sees, including likes and comments,
//! which never leave this peer.

use std::sync::Arc;
use std::time::Duration;

use board_content::{ContentError, ContentStore, ContentStoreExt, PinLedger, PutOptions};
use board_core::{classify, Feed, FeedError, MediaKind};
use board_types::{
    now_millis, Address, Comment, ContentId, Post, PostDocument, PostMedia, PostSummary,
    Visibility,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use crate::discovery::{DiscoveryError, DiscoveryIndex};

/// Errors from feed operations.
#[derive(Debug, Error)]
pub enum FeedServiceError {
    /// Neither text nor media.
    #[error("nothing to publish")]
    Empty,

    /// The local feed refused the change.
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// The discovery index failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The content store failed.
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// A file to attach to a new post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    /// Original file name.
    pub filename: String,
    /// Declared type, if the picker reported one.
    pub mime_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A post being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    /// Post text.
    pub content: String,
    /// Audience.
    pub visibility: Visibility,
    /// Attachments.
    pub media: Vec<MediaUpload>,
}

impl PostDraft {
    /// A public text post.
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            visibility: Visibility::Public,
            media: Vec::new(),
        }
    }
}

#[derive(Default)]
struct FeedState {
    feed: Feed,
    last_fetch: Option<u64>,
}

/// Publishes posts and keeps the local feed filled from the discovery index.
pub struct FeedService {
    me: Address,
    content: Arc<dyn ContentStore>,
    discovery: Option<Arc<dyn DiscoveryIndex>>,
    ledger: PinLedger,
    state: Mutex<FeedState>,
    page_limit: usize,
}

impl FeedService {
    /// Posts requested per page unless configured otherwise.
    pub const DEFAULT_PAGE_LIMIT: usize = 50;

    /// Create a service. Without a discovery index posts stay local.
    pub fn new(
        me: Address,
        content: Arc<dyn ContentStore>,
        discovery: Option<Arc<dyn DiscoveryIndex>>,
    ) -> Self {
        Self {
            me,
            content,
            discovery,
            ledger: PinLedger::new(),
            state: Mutex::new(FeedState::default()),
            page_limit: Self::DEFAULT_PAGE_LIMIT,
        }
    }

    /// Set the page size used by [`FeedService::refresh`].
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// Share an existing pin ledger.
    pub fn with_ledger(mut self, ledger: PinLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Pin outcomes of published posts.
    pub fn ledger(&self) -> &PinLedger {
        &self.ledger
    }

    /// Time of the last successful refresh.
    pub async fn last_fetch(&self) -> Option<u64> {
        self.state.lock().await.last_fetch
    }

    /// All posts, newest first.
    pub async fn posts(&self) -> Vec<Post> {
        self.state.lock().await.feed.posts().to_vec()
    }

    /// Posts the local user may see. `follows` answers whether they follow an author.
    pub async fn visible_posts(&self, follows: impl Fn(&Address) -> bool) -> Vec<Post> {
        let state = self.state.lock().await;
        state
            .feed
            .visible_to(Some(&self.me), follows)
            .into_iter()
            .cloned()
            .collect()
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Publish a post.
    ///
    /// Media that fails to upload is dropped. If the canonical copy cannot be
    /// stored the post gets a random id and stays local. Discovery failures
    /// are logged and ignored. The post always lands in the local feed.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post, FeedServiceError> {
        if draft.content.trim().is_empty() && draft.media.is_empty() {
            return Err(FeedServiceError::Empty);
        }

        let mut media_items = Vec::new();
        for upload in draft.media {
            // Only a specific declared type is trusted; anything generic is sniffed.
            let declared = upload.mime_type.as_deref().map(str::trim);
            let mime = match declared {
                Some(declared) if MediaKind::from_mime(Some(declared)) != MediaKind::Other => {
                    declared.to_string()
                }
                _ => classify(None, &upload.bytes).1,
            };
            let options = PutOptions::file(upload.filename.clone(), Some(mime.clone()));
            match self.content.put_bytes(&upload.bytes, options).await {
                Ok(cid) => media_items.push(PostMedia {
                    content_cid: cid,
                    media_type: mime,
                }),
                Err(e) => {
                    tracing::warn!(file = %upload.filename, error = %e, "Dropped attachment")
                }
            }
        }

        let document = PostDocument {
            version: PostDocument::VERSION,
            content: draft.content,
            author_address: self.me.clone(),
            timestamp: now_millis(),
            visibility: draft.visibility,
            media_items,
        };

        let content_cid = match self.content.put_json(&document).await {
            Ok(cid) => {
                let outcome = self.content.pin(&cid).await;
                self.ledger.record(&cid, outcome);
                Some(cid)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Post kept local, canonical copy not stored");
                None
            }
        };

        let post = Post {
            id: content_cid
                .as_ref()
                .map(ContentId::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            author_address: document.author_address,
            content: document.content,
            timestamp: document.timestamp,
            visibility: document.visibility,
            content_cid,
            media_items: document.media_items,
            likes: 0,
            comments: Vec::new(),
        };

        if post.visibility.is_public() {
            self.announce(&post).await;
        }

        self.state.lock().await.feed.insert(post.clone());
        tracing::info!(post_id = %post.id, "Published post");
        Ok(post)
    }

    async fn announce(&self, post: &Post) {
        let Some(discovery) = &self.discovery else {
            return;
        };
        if let Some(cid) = &post.content_cid {
            if let Err(e) = discovery.register_cid(cid).await {
                tracing::warn!(cid = %cid, error = %e, "Failed to index post identifier");
            }
        }
        if let Err(e) = discovery.register_post(&PostSummary::of(post)).await {
            tracing::warn!(post_id = %post.id, error = %e, "Failed to register post");
        }
    }

    /// Load the canonical copy of a post.
    pub async fn fetch_document(&self, cid: &ContentId) -> Result<PostDocument, FeedServiceError> {
        Ok(self.content.get_json(cid).await?)
    }

    // =========================================================================
    // Paging
    // =========================================================================

    /// Pull posts newer than the last successful refresh.
    ///
    /// Returns how many posts were new. The refresh time only advances on
    /// success, so a failed poll is repeated in full next time.
    pub async fn refresh(&self) -> Result<usize, FeedServiceError> {
        let Some(discovery) = &self.discovery else {
            return Ok(0);
        };
        let since = self.state.lock().await.last_fetch;
        let fetched_at = now_millis();
        let page = discovery.recent_posts(since, self.page_limit).await?;

        let mut state = self.state.lock().await;
        let added = state
            .feed
            .merge(page.into_iter().map(Post::from_summary).collect());
        state.last_fetch = Some(fetched_at);
        Ok(added)
    }

    // =========================================================================
    // Local edits
    // =========================================================================

    /// Change the text of one of the local user's posts.
    pub async fn edit_post(&self, id: &str, content: &str) -> Result<Post, FeedServiceError> {
        let mut state = self.state.lock().await;
        Ok(state.feed.edit_post(id, &self.me, content)?.clone())
    }

    /// Remove one of the local user's posts.
    pub async fn remove_post(&self, id: &str) -> Result<Post, FeedServiceError> {
        Ok(self.state.lock().await.feed.remove_post(id, &self.me)?)
    }

    /// Comment on a post.
    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Comment, FeedServiceError> {
        if content.trim().is_empty() {
            return Err(FeedServiceError::Empty);
        }
        let comment = Comment::compose(post_id, self.me.clone(), content);
        self.state.lock().await.feed.add_comment(comment.clone())?;
        Ok(comment)
    }

    /// Like a post. Returns the new count.
    pub async fn like(&self, id: &str) -> Result<u32, FeedServiceError> {
        Ok(self.state.lock().await.feed.like(id)?)
    }

    /// Take back a like. Returns the new count.
    pub async fn unlike(&self, id: &str) -> Result<u32, FeedServiceError> {
        Ok(self.state.lock().await.feed.unlike(id)?)
    }
}

/// Spawn the periodic feed poller.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_feed_poller(service: Arc<FeedService>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Feed poller started (interval: {}s)", every.as_secs());

        let mut timer = interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            match service.refresh().await {
                Ok(added) if added > 0 => tracing::info!("Feed: {} new posts", added),
                Ok(_) => tracing::debug!("Feed: nothing new"),
                Err(e) => tracing::warn!("Feed refresh failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::MockDiscovery;
    use board_content::{MemoryContentStore, PinOutcome};

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn service() -> (FeedService, MemoryContentStore, MockDiscovery) {
        let content = MemoryContentStore::new();
        let discovery = MockDiscovery::new();
        let service = FeedService::new(
            addr("0xa11ce"),
            Arc::new(content.clone()),
            Some(Arc::new(discovery.clone())),
        );
        (service, content, discovery)
    }

    fn remote(id: &str, ts: u64) -> PostSummary {
        PostSummary {
            id: id.to_string(),
            content: format!("from elsewhere {id}"),
            author_address: addr("0xb0b"),
            timestamp: ts,
            content_cid: None,
            media_items: vec![],
        }
    }

    // ===========================================
    // Publishing
    // ===========================================

    #[tokio::test]
    async fn public_post_is_stored_pinned_and_announced() {
        let (service, content, discovery) = service();

        let post = service.create_post(PostDraft::public("gm")).await.unwrap();

        let cid = post.content_cid.clone().unwrap();
        assert_eq!(post.id, cid.to_string());
        assert!(content.is_pinned(&cid));
        assert_eq!(service.ledger().outcome(&cid), Some(PinOutcome::Pinned));
        assert_eq!(discovery.cids(), vec![cid.clone()]);
        assert_eq!(discovery.posts()[0].id, post.id);

        let document = service.fetch_document(&cid).await.unwrap();
        assert_eq!(document.content, "gm");
        assert_eq!(document.version, PostDocument::VERSION);
    }

    #[tokio::test]
    async fn non_public_post_is_not_announced() {
        let (service, _, discovery) = service();
        let draft = PostDraft {
            visibility: Visibility::Followers,
            ..PostDraft::public("friends only")
        };

        service.create_post(draft).await.unwrap();

        assert!(discovery.posts().is_empty());
        assert!(discovery.cids().is_empty());
        assert_eq!(service.posts().await.len(), 1);
    }

    #[tokio::test]
    async fn discovery_failure_does_not_fail_post() {
        let (service, _, discovery) = service();
        discovery.set_offline(true);

        let post = service.create_post(PostDraft::public("still here")).await.unwrap();

        assert_eq!(service.posts().await[0].id, post.id);
    }

    #[tokio::test]
    async fn limited_plan_is_recorded() {
        let (service, content, _) = service();
        content.set_limited_plan(true);

        let post = service.create_post(PostDraft::public("gm")).await.unwrap();

        let cid = post.content_cid.unwrap();
        assert!(service.ledger().has_limitation(&cid));
    }

    #[tokio::test]
    async fn offline_store_keeps_post_local() {
        let (service, content, discovery) = service();
        content.set_offline(true);

        let post = service.create_post(PostDraft::public("offline")).await.unwrap();

        assert!(post.content_cid.is_none());
        assert!(uuid::Uuid::parse_str(&post.id).is_ok());
        assert!(discovery.cids().is_empty());
        assert_eq!(discovery.posts().len(), 1);
    }

    #[tokio::test]
    async fn attachment_type_is_sniffed() {
        let (service, _, _) = service();
        let draft = PostDraft {
            media: vec![MediaUpload {
                filename: "pic".into(),
                mime_type: None,
                bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A],
            }],
            ..PostDraft::public("look")
        };

        let post = service.create_post(draft).await.unwrap();

        assert_eq!(post.media_items.len(), 1);
        assert_eq!(post.media_items[0].media_type, "image/png");
    }

    #[tokio::test]
    async fn generic_declared_type_is_sniffed_on_a_real_node() {
        use axum::extract::{Multipart, State};
        use axum::routing::post;
        use axum::{Json, Router};
        use board_content::HttpContentStore;
        use std::sync::Mutex as StdMutex;

        #[derive(Clone, Default)]
        struct Node {
            added: Arc<StdMutex<Vec<(String, Option<String>)>>>,
        }

        async fn add(State(node): State<Node>, mut multipart: Multipart) -> Json<serde_json::Value> {
            let mut fields = Vec::new();
            while let Ok(Some(field)) = multipart.next_field().await {
                let filename = field.file_name().unwrap_or_default().to_string();
                let mime = field.content_type().map(str::to_string);
                fields.push((filename, mime));
            }
            let mut added = node.added.lock().unwrap();
            added.extend(fields);
            let cid = format!("bafkadded{:04}", added.len());
            Json(serde_json::json!({ "Hash": cid }))
        }

        let node = Node::default();
        let app = Router::new()
            .route("/api/v0/add", post(add))
            .route("/api/v0/pin/add", post(|| async { "{}" }))
            .with_state(node.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = HttpContentStore::new(format!("http://{bound}"), Duration::from_secs(5)).unwrap();
        let service = FeedService::new(addr("0xa11ce"), Arc::new(store), None);
        let draft = PostDraft {
            media: vec![MediaUpload {
                filename: "a.png".into(),
                mime_type: Some("other".into()),
                bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            }],
            ..PostDraft::public("look")
        };

        let post = service.create_post(draft).await.unwrap();

        assert_eq!(post.media_items.len(), 1);
        assert_eq!(post.media_items[0].media_type, "image/png");
        let added = node.added.lock().unwrap();
        assert_eq!(added[0], ("a.png".to_string(), Some("image/png".to_string())));
    }

    #[tokio::test]
    async fn empty_draft_is_refused() {
        let (service, _, _) = service();
        let result = service.create_post(PostDraft::public("   ")).await;
        assert!(matches!(result, Err(FeedServiceError::Empty)));
    }

    // ===========================================
    // Paging
    // ===========================================

    #[tokio::test]
    async fn refresh_merges_and_advances_cursor() {
        let (service, _, discovery) = service();
        discovery.seed(remote("r1", 10));
        discovery.seed(remote("r2", 20));

        assert_eq!(service.refresh().await.unwrap(), 2);
        let first_fetch = service.last_fetch().await.unwrap();
        assert_eq!(service.refresh().await.unwrap(), 0);

        let queries = discovery.queries();
        assert_eq!(queries[0], (None, FeedService::DEFAULT_PAGE_LIMIT));
        assert_eq!(queries[1].0, Some(first_fetch));
        let ids: Vec<_> = service.posts().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cursor() {
        let (service, _, discovery) = service();
        discovery.set_offline(true);

        assert!(service.refresh().await.is_err());
        assert!(service.last_fetch().await.is_none());
    }

    #[tokio::test]
    async fn no_discovery_means_local_only() {
        let service = FeedService::new(addr("0xa11ce"), Arc::new(MemoryContentStore::new()), None);
        assert_eq!(service.refresh().await.unwrap(), 0);
        assert!(service.create_post(PostDraft::public("solo")).await.is_ok());
    }

    // ===========================================
    // Local edits
    // ===========================================

    #[tokio::test]
    async fn comments_likes_and_edits() {
        let (service, _, discovery) = service();
        discovery.seed(remote("r1", 10));
        service.refresh().await.unwrap();
        let mine = service.create_post(PostDraft::public("draft")).await.unwrap();

        service.add_comment("r1", "nice").await.unwrap();
        assert_eq!(service.like("r1").await.unwrap(), 1);
        assert_eq!(service.unlike("r1").await.unwrap(), 0);
        assert_eq!(service.unlike("r1").await.unwrap(), 0);

        assert!(matches!(
            service.edit_post("r1", "hijack").await,
            Err(FeedServiceError::Feed(FeedError::NotAuthor(_)))
        ));
        let edited = service.edit_post(&mine.id, "final").await.unwrap();
        assert_eq!(edited.content, "final");

        service.remove_post(&mine.id).await.unwrap();
        let posts = service.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comments.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_refreshes_on_interval() {
        let (service, _, discovery) = service();
        let service = Arc::new(service);
        discovery.seed(remote("r1", 10));

        let handle = spawn_feed_poller(Arc::clone(&service), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(service.posts().await.len(), 1);

        discovery.seed(remote("r2", now_millis() + 60_000));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(service.posts().await.len(), 2);

        handle.abort();
    }
}
