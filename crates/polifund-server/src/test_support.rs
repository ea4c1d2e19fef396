//! In-process router harness shared by the handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use ethers::types::{Address, Bytes};
use polifund_chain::{ChainError, ChainReader, ContractLayout, Contracts};
use polifund_store::StorePool;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::{build_router, AppState};
use crate::config::ServerConfig;
use crate::feeds::ChainFeeds;
use crate::image_store::ImageStore;
use crate::rate_limit::{Quota, RateLimiter, RateLimits};

const BOUNDARY: &str = "polifund-test-boundary";

fn unlimited() -> RateLimits {
    RateLimits::uniform(Quota {
        per_sec: 1000.0,
        burst: 1000.0,
    })
}

pub struct TestApp {
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None, RateLimiter::new(unlimited())).await
    }

    pub async fn with_chain(feeds: ChainFeeds) -> Self {
        Self::build(Some(Arc::new(feeds)), RateLimiter::new(unlimited())).await
    }

    pub async fn with_rate_limits(limits: RateLimits) -> Self {
        Self::build(None, RateLimiter::new(limits)).await
    }

    async fn build(chain: Option<Arc<ChainFeeds>>, rate_limiter: RateLimiter) -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig {
            image_storage_path: dir.path().join("images"),
            ..ServerConfig::default()
        };
        let images = ImageStore::new(config.image_storage_path.clone())
            .await
            .unwrap();
        let state = AppState {
            store: StorePool::open_in_memory().unwrap(),
            images: Arc::new(images),
            chain,
            rate_limiter,
            config: Arc::new(config),
        };
        Self { state, _dir: dir }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn get_raw(&self, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }
}

/// Send a request and decode the JSON body (`Null` when it is not JSON).
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    router: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, req).await
}

/// Multipart upload to `/api/campaigns/{campaign_id}/add-image`.
/// `file` is `(filename, content type, bytes)`.
pub fn upload_request(
    campaign_id: &str,
    creator: Option<&str>,
    file: Option<(&str, &str, Vec<u8>)>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(creator) = creator {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"creator\"\r\n\r\n{creator}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(format!("/api/campaigns/{campaign_id}/add-image"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Reader whose node never answers.
pub struct OfflineReader;

#[async_trait]
impl ChainReader for OfflineReader {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Err(ChainError::Transport("connection refused".to_string()))
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, ChainError> {
        Err(ChainError::Transport("connection refused".to_string()))
    }
}

pub fn offline_contracts(layout: ContractLayout) -> Contracts {
    Contracts::new(Arc::new(OfflineReader), layout)
}
