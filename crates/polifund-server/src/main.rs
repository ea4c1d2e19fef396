//! # polifund-server
//!
//! Backend for the PolyFund DAO crowdfunding frontend.
//!
//! This binary provides:
//! - **Campaign metadata API** (title, description, location, creator) kept
//!   in SQLite next to the on-chain fundraisers
//! - **Image uploads** with a per-campaign gallery, restricted to the
//!   campaign creator
//! - **Live chain feeds** that poll the PoliDAO contracts and serve the
//!   latest fundraisers and proposals
//! - **Per-IP rate limiting** to protect against abuse

mod api;
mod campaigns;
mod config;
mod error;
mod feeds;
mod image_store;
mod rate_limit;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use polifund_store::{Database, StorePool};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::feeds::ChainFeeds;
use crate::image_store::ImageStore;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,polifund_server=debug,polifund_chain=debug")
        }))
        .init();

    info!("Starting PolyFund server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => Database::default_path()?,
    };
    let store = StorePool::open(&db_path)?;
    info!(path = %db_path.display(), "Metadata store opened");

    let images = Arc::new(ImageStore::new(config.image_storage_path.clone()).await?);

    let rate_limiter = RateLimiter::new(config.rate_limits);

    // The API still serves metadata when the node cannot be reached.
    let (chain, feed_tasks) = match ChainFeeds::start(&config).await {
        Ok(Some((feeds, tasks))) => (Some(Arc::new(feeds)), Some(tasks)),
        Ok(None) => (None, None),
        Err(e) => {
            warn!(error = %e, "Chain feeds unavailable, serving metadata only");
            (None, None)
        }
    };

    let feeds = chain.clone();
    let app_state = AppState {
        store: store.clone(),
        images,
        chain,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Evict buckets idle for more than 10 minutes, every 5 minutes.
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server until it fails or Ctrl+C arrives
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, config.http_addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    if let (Some(feeds), Some(tasks)) = (feeds, feed_tasks) {
        feeds.shutdown(tasks).await;
    }
    if store.close() {
        info!("Metadata store closed");
    }

    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server failed");
    }
    result
}
