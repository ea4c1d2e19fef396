//! Per-client request quotas.
//!
//! Every request is sorted into a [`RouteClass`]; each client IP gets one
//! token bucket per class. Metadata writes and uploads are the expensive
//! routes (a database transaction, files on disk), so their quota is the
//! tightest. Feed snapshots and stored images are served from memory or
//! a single file read and get the loosest one.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// `POST /api/campaigns` and image uploads.
    Write,
    /// Chain feeds, chain status and image bytes.
    Feed,
    /// Everything else.
    Standard,
}

impl RouteClass {
    pub fn of(method: &Method, path: &str) -> Self {
        let path = path.trim_end_matches('/');
        if method == Method::POST
            && (path == "/api/campaigns"
                || (path.starts_with("/api/campaigns/") && path.ends_with("/add-image")))
        {
            return Self::Write;
        }
        if method == Method::GET
            && (path.starts_with("/api/fundraisers")
                || path.starts_with("/api/proposals")
                || path == "/api/chain/status"
                || path.starts_with("/api/images/"))
        {
            return Self::Feed;
        }
        Self::Standard
    }
}

/// Sustained rate and bucket size of one route class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub per_sec: f64,
    pub burst: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    pub write: Quota,
    pub feed: Quota,
    pub standard: Quota,
}

impl RateLimits {
    /// Same quota for every class.
    pub fn uniform(quota: Quota) -> Self {
        Self {
            write: quota,
            feed: quota,
            standard: quota,
        }
    }

    pub fn quota(&self, class: RouteClass) -> Quota {
        match class {
            RouteClass::Write => self.write,
            RouteClass::Feed => self.feed,
            RouteClass::Standard => self.standard,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            // 12 per minute
            write: Quota {
                per_sec: 0.2,
                burst: 5.0,
            },
            feed: Quota {
                per_sec: 30.0,
                burst: 90.0,
            },
            standard: Quota {
                per_sec: 10.0,
                burst: 30.0,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(quota: Quota) -> Self {
        Self {
            tokens: quota.burst,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, quota: Quota) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * quota.per_sec).min(quota.burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<(IpAddr, RouteClass), TokenBucket>>>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            limits,
        }
    }

    pub async fn check(&self, ip: IpAddr, class: RouteClass) -> bool {
        let quota = self.limits.quota(class);
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry((ip, class))
            .or_insert_with(|| TokenBucket::full(quota))
            .try_consume(quota)
    }

    /// Drop buckets untouched for `max_idle_secs`.
    pub async fn purge_stale(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| {
            now.duration_since(bucket.last_refill).as_secs_f64() < max_idle_secs
        });
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(ip) = client_ip(&req) {
        let class = RouteClass::of(req.method(), req.uri().path());
        if !limiter.check(ip, class).await {
            warn!(ip = %ip, ?class, path = req.uri().path(), "Rate limit exceeded");
            return Err(ServerError::RateLimited);
        }
    }

    Ok(next.run(req).await)
}

/// Peer address, else the first `X-Forwarded-For` hop, else `X-Real-IP`.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<std::net::SocketAddr>>() {
        return Some(addr.ip());
    }

    let header = |name: &str| req.headers().get(name)?.to_str().ok();
    header("x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .or_else(|| header("x-real-ip"))
        .and_then(|value| value.trim().parse().ok())
}
