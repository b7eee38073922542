//! HTTP fetch abstraction.
//!
//! The resolver only needs two requests: a HEAD probe and a GET. Hiding them
//! behind [`Fetcher`] lets tests script every remote endpoint, including
//! ones that hang, with [`MockFetcher`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request did not finish in time.
    #[error("timed out")]
    Timeout,

    /// Connection or protocol failure.
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// A completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if sent.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Fetched {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP client used by the resolver.
///
/// Implementations need not enforce timeouts; the resolver bounds every call.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Send a HEAD request and return the status code.
    async fn head(&self, url: &str) -> Result<u16, FetchError>;

    /// Send a GET request.
    async fn get(&self, url: &str) -> Result<Fetched, FetchError>;
}

/// [`Fetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn head(&self, url: &str) -> Result<u16, FetchError> {
        let response = self.http.head(url).send().await?;
        Ok(response.status().as_u16())
    }

    async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(Fetched {
            status,
            content_type,
            body,
        })
    }
}

/// Scripted response for one URL.
#[derive(Debug, Clone)]
pub struct MockRoute {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
    delay: Option<Duration>,
    error: Option<FetchError>,
}

impl MockRoute {
    /// Respond with `status` and an empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
            delay: None,
            error: None,
        }
    }

    /// Respond 200 with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::status(200)
        }
    }

    /// Fail with a network error.
    pub fn network_error(message: &str) -> Self {
        Self {
            error: Some(FetchError::Network(message.to_string())),
            ..Self::status(0)
        }
    }

    /// Never answer in any reasonable time.
    pub fn hang() -> Self {
        Self::status(200).delayed(Duration::from_secs(3600))
    }

    /// Set the `Content-Type` header.
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Answer only after `delay`.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// HTTP method recorded by [`MockFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HEAD
    Head,
    /// GET
    Get,
}

#[derive(Debug, Default)]
struct MockFetcherInner {
    routes: HashMap<String, MockRoute>,
    requests: Vec<(Method, String)>,
}

/// Mock fetcher for testing.
///
/// Unrouted URLs fail with a network error. Delays use the tokio clock, so
/// tests with a paused clock run instantly.
#[derive(Debug, Default, Clone)]
pub struct MockFetcher {
    inner: Arc<Mutex<MockFetcherInner>>,
}

impl MockFetcher {
    /// Create a fetcher with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for `url`.
    pub fn route(&self, url: impl Into<String>, route: MockRoute) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.routes.insert(url.into(), route);
    }

    /// Every request made, in order.
    pub fn requests(&self) -> Vec<(Method, String)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.requests.clone()
    }

    /// Whether `url` was requested with any method.
    pub fn was_requested(&self, url: &str) -> bool {
        self.requests().iter().any(|(_, u)| u == url)
    }

    async fn respond(&self, method: Method, url: &str) -> Result<Fetched, FetchError> {
        let route = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.requests.push((method, url.to_string()));
            inner.routes.get(url).cloned()
        };
        let Some(route) = route else {
            return Err(FetchError::Network(format!("no route to {url}")));
        };
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = route.error {
            return Err(error);
        }
        Ok(Fetched {
            status: route.status,
            content_type: route.content_type,
            body: if method == Method::Head {
                Vec::new()
            } else {
                route.body
            },
        })
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn head(&self, url: &str) -> Result<u16, FetchError> {
        self.respond(Method::Head, url).await.map(|f| f.status)
    }

    async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        self.respond(Method::Get, url).await
    }
}
