//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Chain feeds are only started when
//! a contract address is configured.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ethers::types::Address;
use polifund_chain::{ContractLayout, PollerConfig, ProviderConfig};
use polifund_shared::constants::{
    BLOCK_TIME_SECS, DEFAULT_BATCH_SIZE, DEFAULT_HTTP_PORT, DEFAULT_RPC_URL, MAX_IMAGE_SIZE,
    REFRESH_EVERY_TICKS,
};
use polifund_shared::normalize_address;
use tracing::warn;

use crate::rate_limit::RateLimits;

/// Server configuration. `Debug` redacts the Alchemy key.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite metadata database.
    /// Env: `DATABASE_PATH`
    /// Default: `polifund.db` in the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Directory holding uploaded image files.
    /// Env: `IMAGE_STORAGE_PATH`
    /// Default: `./images`
    pub image_storage_path: PathBuf,

    /// Maximum accepted image size in bytes.
    /// Env: `MAX_IMAGE_SIZE`
    /// Default: 5 MiB
    pub max_image_size: usize,

    // -- Chain access --

    /// Legacy monolithic contract.
    /// Env: `POLIDAO_CONTRACT_ADDRESS` or `NEXT_PUBLIC_POLIDAO_CONTRACT_ADDRESS`
    pub contract_address: Option<Address>,

    /// Modular Core contract; when set the modular layout is used.
    /// Env: `POLIDAO_CORE_ADDRESS`
    pub core_address: Option<Address>,

    /// Modular Router contract (write target of the modular layout).
    /// Env: `POLIDAO_ROUTER_ADDRESS`
    pub router_address: Option<Address>,

    /// Env: `ALCHEMY_API_KEY` or `NEXT_PUBLIC_ALCHEMY_API_KEY`
    pub alchemy_api_key: Option<String>,

    /// Env: `RPC_URL`, `NEXT_PUBLIC_SEPOLIA_RPC_URL` or `NEXT_PUBLIC_RPC_URL`
    pub rpc_url: String,

    /// Env: `POLL_INTERVAL_SECS`, default 12
    pub poll_interval: Duration,

    /// Env: `POLL_JITTER_MS`, default 500
    pub poll_jitter: Duration,

    /// Env: `REFRESH_EVERY_TICKS`, default 5
    pub refresh_every: u64,

    /// Env: `BATCH_SIZE`, default 10
    pub batch_size: usize,

    // -- Rate limiting (per client IP and route class) --

    /// Env: `RATE_LIMIT_PER_SEC` / `RATE_LIMIT_BURST` for ordinary reads
    /// (default 10 / 30), `WRITE_RATE_LIMIT_PER_MIN` /
    /// `WRITE_RATE_LIMIT_BURST` for metadata writes and uploads
    /// (default 12 / 5), `FEED_RATE_LIMIT_PER_SEC` / `FEED_RATE_LIMIT_BURST`
    /// for chain feeds and image bytes (default 30 / 90).
    pub rate_limits: RateLimits,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("image_storage_path", &self.image_storage_path)
            .field("max_image_size", &self.max_image_size)
            .field("contract_address", &self.contract_address)
            .field("core_address", &self.core_address)
            .field("router_address", &self.router_address)
            .field("alchemy_api_key", &self.alchemy_api_key.as_ref().map(|_| "***"))
            .field("rpc_url", &self.rpc_url)
            .field("poll_interval", &self.poll_interval)
            .field("poll_jitter", &self.poll_jitter)
            .field("refresh_every", &self.refresh_every)
            .field("batch_size", &self.batch_size)
            .field("rate_limits", &self.rate_limits)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            image_storage_path: PathBuf::from("./images"),
            max_image_size: MAX_IMAGE_SIZE,
            contract_address: None,
            core_address: None,
            router_address: None,
            alchemy_api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            poll_interval: Duration::from_secs(BLOCK_TIME_SECS),
            poll_jitter: Duration::from_millis(500),
            refresh_every: REFRESH_EVERY_TICKS,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limits: RateLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
        };
        let mut config = Self::default();

        if let Some(addr) = get(&["HTTP_ADDR"]) {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = get(&["DATABASE_PATH"]) {
            config.database_path = Some(PathBuf::from(path));
        }
        if get(&["MONGO_URI", "MONGODB_URI"]).is_some() {
            warn!("MONGO_URI is set but ignored; metadata is stored in SQLite (see DATABASE_PATH)");
        }

        if let Some(path) = get(&["IMAGE_STORAGE_PATH"]) {
            config.image_storage_path = PathBuf::from(path);
        }

        if let Some(size) = parse_or_warn::<usize>(get(&["MAX_IMAGE_SIZE"]), "MAX_IMAGE_SIZE") {
            config.max_image_size = size.max(1);
        }

        config.contract_address = address_or_warn(
            get(&["POLIDAO_CONTRACT_ADDRESS", "NEXT_PUBLIC_POLIDAO_CONTRACT_ADDRESS"]),
            "POLIDAO_CONTRACT_ADDRESS",
        );
        config.core_address = address_or_warn(get(&["POLIDAO_CORE_ADDRESS"]), "POLIDAO_CORE_ADDRESS");
        config.router_address =
            address_or_warn(get(&["POLIDAO_ROUTER_ADDRESS"]), "POLIDAO_ROUTER_ADDRESS");

        config.alchemy_api_key = get(&["ALCHEMY_API_KEY", "NEXT_PUBLIC_ALCHEMY_API_KEY"]);
        if let Some(url) = get(&["RPC_URL", "NEXT_PUBLIC_SEPOLIA_RPC_URL", "NEXT_PUBLIC_RPC_URL"]) {
            config.rpc_url = url;
        }

        if let Some(secs) = parse_or_warn::<u64>(get(&["POLL_INTERVAL_SECS"]), "POLL_INTERVAL_SECS") {
            if secs == 0 {
                warn!("POLL_INTERVAL_SECS must be positive, using default");
            } else {
                config.poll_interval = Duration::from_secs(secs);
            }
        }
        if let Some(ms) = parse_or_warn::<u64>(get(&["POLL_JITTER_MS"]), "POLL_JITTER_MS") {
            config.poll_jitter = Duration::from_millis(ms);
        }
        if let Some(n) = parse_or_warn::<u64>(get(&["REFRESH_EVERY_TICKS"]), "REFRESH_EVERY_TICKS") {
            config.refresh_every = n.max(1);
        }
        if let Some(n) = parse_or_warn::<usize>(get(&["BATCH_SIZE"]), "BATCH_SIZE") {
            config.batch_size = n.max(1);
        }

        let limits = &mut config.rate_limits;
        let quota_value = |key: &str, min: f64| {
            let value = parse_or_warn::<f64>(get(&[key]), key)?;
            if value.is_nan() || value < min {
                warn!(key, value, "Rate limit value too small, using default");
                return None;
            }
            Some(value)
        };
        if let Some(rate) = quota_value("RATE_LIMIT_PER_SEC", f64::MIN_POSITIVE) {
            limits.standard.per_sec = rate;
        }
        if let Some(burst) = quota_value("RATE_LIMIT_BURST", 1.0) {
            limits.standard.burst = burst;
        }
        if let Some(per_min) = quota_value("WRITE_RATE_LIMIT_PER_MIN", f64::MIN_POSITIVE) {
            limits.write.per_sec = per_min / 60.0;
        }
        if let Some(burst) = quota_value("WRITE_RATE_LIMIT_BURST", 1.0) {
            limits.write.burst = burst;
        }
        if let Some(rate) = quota_value("FEED_RATE_LIMIT_PER_SEC", f64::MIN_POSITIVE) {
            limits.feed.per_sec = rate;
        }
        if let Some(burst) = quota_value("FEED_RATE_LIMIT_BURST", 1.0) {
            limits.feed.burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Contract layout to read from, if any contract is configured. Core
    /// takes precedence over the legacy address.
    pub fn layout(&self) -> Option<ContractLayout> {
        match (self.core_address, self.contract_address) {
            (Some(core), _) => {
                if self.router_address.is_none() {
                    warn!("POLIDAO_ROUTER_ADDRESS not set; modular writes are unavailable");
                }
                Some(ContractLayout::Modular {
                    core,
                    router: self.router_address.unwrap_or_default(),
                })
            }
            (None, Some(address)) => Some(ContractLayout::Legacy { address }),
            (None, None) => None,
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            alchemy_api_key: self.alchemy_api_key.clone(),
            rpc_url: self.rpc_url.clone(),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            jitter: self.poll_jitter,
            refresh_every: self.refresh_every,
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(value: Option<String>, key: &str) -> Option<T> {
    let value = value?;
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %value, "Invalid value, using default");
            None
        }
    }
}

fn address_or_warn(value: Option<String>, key: &str) -> Option<Address> {
    let value = value?;
    match normalize_address(&value).map(|a| a.parse::<Address>()) {
        Ok(Ok(address)) => Some(address),
        _ => {
            warn!(key, value = %value, "Invalid contract address, ignoring");
            None
        }
    }
}
