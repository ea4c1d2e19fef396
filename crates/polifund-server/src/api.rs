use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::Method,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ethers::types::Address;
use polifund_chain::{
    ChainError, ContractError, FeedSnapshot, FeedStatus, FundraiserProgress, PlatformStats,
    UserStatus,
};
use polifund_shared::normalize_address;
use polifund_store::StorePool;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::campaigns;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::feeds::ChainFeeds;
use crate::image_store::ImageStore;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

/// Multipart overhead allowed on top of the image limit, so that
/// oversize files reach the handler and get a validation error instead
/// of a bare 413.
const MULTIPART_SLACK: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: StorePool,
    pub images: Arc<ImageStore>,
    /// `None` when no contract is configured.
    pub chain: Option<Arc<ChainFeeds>>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    fn chain(&self) -> Result<&ChainFeeds, ServerError> {
        self.chain.as_deref().ok_or(ServerError::ChainUnavailable)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.config.max_image_size.saturating_add(MULTIPART_SLACK);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/campaigns",
            get(campaigns::get_campaigns).post(campaigns::upsert_campaign),
        )
        .route("/api/campaigns/:id/add-image", post(campaigns::add_image))
        .route("/api/campaigns/:id/gallery", get(campaigns::gallery))
        .route("/api/campaigns/:id/images", get(campaigns::main_image))
        .route("/api/images/:id", get(campaigns::serve_image))
        .route("/api/fundraisers", get(list_fundraisers))
        .route("/api/fundraisers/:id/progress", get(fundraiser_progress))
        .route("/api/proposals", get(list_proposals))
        .route("/api/stats", get(platform_stats))
        .route("/api/users/:address/status", get(user_status))
        .route("/api/chain/status", get(chain_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store: bool,
    chain: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.is_open(),
        chain: state.chain.is_some(),
    })
}

// ─── Chain feeds ───

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedQuery {
    page: Option<u64>,
    page_size: Option<u64>,
    /// Only fundraisers still accepting donations / proposals still open.
    active: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedPage<T> {
    status: FeedStatus,
    total: usize,
    items: Vec<T>,
    last_block: Option<u64>,
    updated_at: Option<DateTime<Utc>>,
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Filter and page a snapshot. Without `pageSize` every item is returned.
fn feed_page<T, F>(snapshot: &FeedSnapshot<T>, query: &FeedQuery, is_active: F) -> FeedPage<T>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let filtered: Vec<&T> = snapshot
        .items
        .iter()
        .filter(|&item| !query.active.unwrap_or(false) || is_active(item))
        .collect();

    let items = match query.page_size {
        Some(size) => {
            let start = query.page.unwrap_or(0).saturating_mul(size);
            filtered
                .iter()
                .skip(usize::try_from(start).unwrap_or(usize::MAX))
                .take(usize::try_from(size).unwrap_or(usize::MAX))
                .map(|item| (*item).clone())
                .collect()
        }
        None => filtered.iter().map(|item| (*item).clone()).collect(),
    };

    FeedPage {
        status: snapshot.status,
        total: filtered.len(),
        items,
        last_block: snapshot.last_block,
        updated_at: snapshot.updated_at,
    }
}

async fn list_fundraisers(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage<polifund_chain::Fundraiser>>, ServerError> {
    let chain = state.chain()?;
    let now = unix_now();
    let snapshot = chain.fundraisers.borrow();
    Ok(Json(feed_page(&snapshot, &query, |f| f.is_active(now))))
}

async fn list_proposals(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedPage<polifund_chain::Proposal>>, ServerError> {
    let chain = state.chain()?;
    let now = unix_now();
    let snapshot = chain.proposals.borrow();
    Ok(Json(feed_page(&snapshot, &query, |p| p.is_open(now))))
}

async fn fundraiser_progress(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<FundraiserProgress>, ServerError> {
    let chain = state.chain()?;
    match chain.contracts()?.fetch_fundraiser_progress(id).await {
        Ok(progress) => Ok(Json(progress)),
        Err(ChainError::Revert(ContractError::FundraiserNotFound(_))) => {
            Err(ServerError::NotFound(format!("Fundraiser {id} not found")))
        }
        Err(e) => Err(e.into()),
    }
}

async fn platform_stats(State(state): State<AppState>) -> Result<Json<PlatformStats>, ServerError> {
    let chain = state.chain()?;
    Ok(Json(chain.contracts()?.fetch_platform_stats().await?))
}

async fn user_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<UserStatus>, ServerError> {
    let chain = state.chain()?;
    let user: Address = normalize_address(&address)
        .ok()
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| ServerError::BadRequest(format!("Invalid address: {address}")))?;
    Ok(Json(chain.contracts()?.fetch_user_status(user).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedSummary {
    status: FeedStatus,
    count: usize,
    last_block: Option<u64>,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> From<&FeedSnapshot<T>> for FeedSummary {
    fn from(snapshot: &FeedSnapshot<T>) -> Self {
        Self {
            status: snapshot.status,
            count: snapshot.items.len(),
            last_block: snapshot.last_block,
            updated_at: snapshot.updated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainStatusResponse {
    layout: polifund_chain::ContractLayout,
    transport: polifund_chain::TransportKind,
    fundraisers: FeedSummary,
    proposals: FeedSummary,
}

async fn chain_status(State(state): State<AppState>) -> Result<Json<ChainStatusResponse>, ServerError> {
    let chain = state.chain()?;
    let fundraisers = FeedSummary::from(&*chain.fundraisers.borrow());
    let proposals = FeedSummary::from(&*chain.proposals.borrow());
    Ok(Json(ChainStatusResponse {
        layout: chain.layout,
        transport: chain.transport,
        fundraisers,
        proposals,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
