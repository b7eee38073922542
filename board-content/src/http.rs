//! Content store backed by a content node's HTTP RPC API.
//!
//! Speaks the subset of the node API meshboard needs:
//!
//! | Operation   | Request                                              |
//! |-------------|------------------------------------------------------|
//! | `put_bytes` | `POST /api/v0/add?pin=<bool>&cid-version=1` (multipart `file`) |
//! | `get_bytes` | `POST /api/v0/cat?arg=<cid>`                         |
//! | `pin`       | `POST /api/v0/pin/add?arg=<cid>`                     |
//!
//! When a remote pinning service is configured, `pin` goes there instead
//! (`POST <endpoint>/pins` with a bearer token).

use std::time::Duration;

use async_trait::async_trait;
use board_types::ContentId;
use reqwest::multipart::Part;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::ContentError;
use crate::store::{ContentStore, PinOutcome, PutOptions};

/// Marker some pinning services put in the body when the plan forbids pinning.
pub const PAID_FEATURE_ONLY: &str = "PAID_FEATURE_ONLY";

/// Remote pinning service credentials.
#[derive(Debug, Clone)]
pub struct PinningService {
    /// Base URL, e.g. `https://api.pinning.example/psa`.
    pub endpoint: String,
    /// Bearer token.
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Content store talking to a content node over HTTP.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    api_url: String,
    pinning: Option<PinningService>,
    http: reqwest::Client,
}

impl HttpContentStore {
    /// Create a store for the node API at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ContentError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            pinning: None,
            http,
        })
    }

    /// Route pin requests to a remote pinning service.
    pub fn with_pinning_service(mut self, service: PinningService) -> Self {
        self.pinning = Some(service);
        self
    }

    /// The node API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn rpc_url(&self, method: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, method)
    }

    async fn pin_remote(&self, service: &PinningService, cid: &ContentId) -> PinOutcome {
        let url = format!("{}/pins", service.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({ "cid": cid.as_str(), "name": cid.as_str() });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&service.token)
            .json(&body)
            .send()
            .await;
        classify_pin_response(response).await
    }

    async fn pin_local(&self, cid: &ContentId) -> PinOutcome {
        let response = self
            .http
            .post(self.rpc_url("pin/add"))
            .query(&[("arg", cid.as_str())])
            .send()
            .await;
        classify_pin_response(response).await
    }
}

async fn classify_pin_response(response: Result<reqwest::Response, reqwest::Error>) -> PinOutcome {
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            return PinOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    pin_outcome(status, &body)
}

/// Map a pin response to an outcome.
///
/// 402/403 and a `PAID_FEATURE_ONLY` body mean the plan does not allow
/// pinning; the content is still shared.
pub fn pin_outcome(status: StatusCode, body: &str) -> PinOutcome {
    if body.contains(PAID_FEATURE_ONLY)
        || status == StatusCode::PAYMENT_REQUIRED
        || status == StatusCode::FORBIDDEN
    {
        let reason = if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        };
        return PinOutcome::LimitedPlan { reason };
    }
    if status.is_success() {
        PinOutcome::Pinned
    } else {
        PinOutcome::Failed {
            reason: format!("{status}: {}", body.trim()),
        }
    }
}

/// Multipart `file` field. A declared type that is not a valid mime string
/// (such as the generic marker `other`) is left off the part.
fn file_part(bytes: &[u8], filename: String, mime: Option<&str>) -> Part {
    let part = Part::bytes(bytes.to_vec()).file_name(filename.clone());
    let Some(mime) = mime else {
        return part;
    };
    match part.mime_str(mime) {
        Ok(part) => part,
        Err(_) => {
            tracing::debug!(mime, "Declared type is not a mime string, sending untyped");
            Part::bytes(bytes.to_vec()).file_name(filename)
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn put_bytes(&self, bytes: &[u8], options: PutOptions) -> Result<ContentId, ContentError> {
        let filename = options.filename.unwrap_or_else(|| "file".to_string());
        let part = file_part(bytes, filename, options.mime_type.as_deref());
        let form = reqwest::multipart::Form::new().part("file", part);
        let pin = if options.pin { "true" } else { "false" };

        let response = self
            .http
            .post(self.rpc_url("add"))
            .query(&[("pin", pin), ("cid-version", "1")])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::StorageFailure(format!("add returned {status}: {body}")));
        }
        let added: AddResponse = response.json().await?;
        let cid = ContentId::parse(&added.hash)
            .map_err(|e| ContentError::InvalidResponse(e.to_string()))?;
        tracing::debug!(cid = %cid, size = bytes.len(), "Stored content");
        Ok(cid)
    }

    async fn get_bytes(&self, cid: &ContentId) -> Result<Vec<u8>, ContentError> {
        let response = self
            .http
            .post(self.rpc_url("cat"))
            .query(&[("arg", cid.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(ContentError::NotFound {
                cid: cid.to_string(),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("not found") {
                    Err(ContentError::NotFound {
                        cid: cid.to_string(),
                    })
                } else {
                    Err(ContentError::StorageFailure(format!("cat returned {status}: {body}")))
                }
            }
        }
    }

    async fn pin(&self, cid: &ContentId) -> PinOutcome {
        let outcome = match &self.pinning {
            Some(service) => self.pin_remote(service, cid).await,
            None => self.pin_local(cid).await,
        };
        tracing::debug!(cid = %cid, outcome = ?outcome, "Pin request finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Multipart, Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};

    // =========================================================================
    // Fake content node
    // =========================================================================

    #[derive(Clone, Default)]
    struct Node {
        blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        add_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    async fn add(
        State(node): State<Node>,
        Query(query): Query<HashMap<String, String>>,
        mut multipart: Multipart,
    ) -> Result<Json<serde_json::Value>, AxumStatus> {
        node.add_queries.lock().unwrap().push(query);
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|_| AxumStatus::BAD_REQUEST)?
        {
            if field.name() == Some("file") {
                let data = field.bytes().await.map_err(|_| AxumStatus::BAD_REQUEST)?;
                let cid = format!("bafk{}", blake3::hash(&data).to_hex());
                node.blobs.lock().unwrap().insert(cid.clone(), data.to_vec());
                return Ok(Json(serde_json::json!({ "Name": "file", "Hash": cid, "Size": "1" })));
            }
        }
        Err(AxumStatus::BAD_REQUEST)
    }

    async fn cat(
        State(node): State<Node>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Result<Vec<u8>, (AxumStatus, String)> {
        let arg = query.get("arg").cloned().unwrap_or_default();
        node.blobs
            .lock()
            .unwrap()
            .get(&arg)
            .cloned()
            .ok_or((AxumStatus::INTERNAL_SERVER_ERROR, "block not found".to_string()))
    }

    async fn pin_add(Query(query): Query<HashMap<String, String>>) -> (AxumStatus, String) {
        match query.get("arg").map(String::as_str) {
            Some(arg) if arg.starts_with("paid") => {
                (AxumStatus::BAD_REQUEST, "{\"error\":\"PAID_FEATURE_ONLY\"}".into())
            }
            Some(_) => (AxumStatus::OK, "{}".into()),
            None => (AxumStatus::BAD_REQUEST, "missing arg".into()),
        }
    }

    async fn remote_pins(headers: HeaderMap) -> AxumStatus {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good") => AxumStatus::ACCEPTED,
            Some("Bearer free-tier") => AxumStatus::PAYMENT_REQUIRED,
            _ => AxumStatus::UNAUTHORIZED,
        }
    }

    async fn spawn_node() -> (String, Node) {
        let node = Node::default();
        let app = Router::new()
            .route("/api/v0/add", post(add))
            .route("/api/v0/cat", post(cat))
            .route("/api/v0/pin/add", post(pin_add))
            .route("/psa/pins", post(remote_pins))
            .with_state(node.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), node)
    }

    fn store(url: &str) -> HttpContentStore {
        HttpContentStore::new(url, Duration::from_secs(5)).unwrap()
    }

    // =========================================================================
    // Put / get
    // =========================================================================

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let (url, node) = spawn_node().await;
        let store = store(&url);

        let cid = store
            .put_bytes(b"hello node", PutOptions::file("hello.txt", Some("text/plain".into())))
            .await
            .unwrap();
        let bytes = store.get_bytes(&cid).await.unwrap();

        assert_eq!(bytes, b"hello node");
        let queries = node.add_queries.lock().unwrap();
        assert_eq!(queries[0].get("pin").map(String::as_str), Some("true"));
        assert_eq!(queries[0].get("cid-version").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn generic_declared_type_still_stores() {
        let (url, _node) = spawn_node().await;
        let store = store(&url);
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

        let cid = store
            .put_bytes(&png, PutOptions::file("a.png", Some("other".into())))
            .await
            .unwrap();

        assert_eq!(store.get_bytes(&cid).await.unwrap(), png);
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let (url, _node) = spawn_node().await;
        let store = store(&url);
        let cid = ContentId::parse("bafkmissing00").unwrap();

        let result = store.get_bytes(&cid).await;

        assert!(matches!(result, Err(ContentError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unreachable_node_is_storage_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = store(&format!("http://{addr}"));
        let result = store.put_bytes(b"x", PutOptions::default()).await;

        assert!(matches!(result, Err(ContentError::StorageFailure(_))));
    }

    // =========================================================================
    // Pinning
    // =========================================================================

    #[tokio::test]
    async fn local_pin_outcomes() {
        let (url, _node) = spawn_node().await;
        let store = store(&url);

        let ok = ContentId::parse("bafkpinnable").unwrap();
        assert_eq!(store.pin(&ok).await, PinOutcome::Pinned);

        let paid = ContentId::parse("paidcontent1").unwrap();
        assert!(matches!(store.pin(&paid).await, PinOutcome::LimitedPlan { .. }));
    }

    #[tokio::test]
    async fn remote_pinning_service_outcomes() {
        let (url, _node) = spawn_node().await;
        let cid = ContentId::parse("bafkpinnable").unwrap();

        let good = store(&url).with_pinning_service(PinningService {
            endpoint: format!("{url}/psa"),
            token: "good".into(),
        });
        assert_eq!(good.pin(&cid).await, PinOutcome::Pinned);

        let free = store(&url).with_pinning_service(PinningService {
            endpoint: format!("{url}/psa"),
            token: "free-tier".into(),
        });
        assert!(matches!(free.pin(&cid).await, PinOutcome::LimitedPlan { .. }));

        let bad = store(&url).with_pinning_service(PinningService {
            endpoint: format!("{url}/psa"),
            token: "nope".into(),
        });
        assert!(matches!(bad.pin(&cid).await, PinOutcome::Failed { .. }));
    }

    #[test]
    fn pin_outcome_mapping() {
        assert_eq!(pin_outcome(StatusCode::OK, ""), PinOutcome::Pinned);
        assert!(matches!(
            pin_outcome(StatusCode::FORBIDDEN, ""),
            PinOutcome::LimitedPlan { .. }
        ));
        assert!(matches!(
            pin_outcome(StatusCode::OK, "PAID_FEATURE_ONLY"),
            PinOutcome::LimitedPlan { .. }
        ));
        assert!(matches!(
            pin_outcome(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            PinOutcome::Failed { .. }
        ));
    }
}
