/// Application name
pub const APP_NAME: &str = "PolyFund";

/// Maximum campaign image size in bytes (5 MiB)
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// MIME types accepted for campaign images
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Approximate Ethereum block time, used as the default poll interval
pub const BLOCK_TIME_SECS: u64 = 12;

/// Every n-th idle poll tick refreshes vote / raise counters
pub const REFRESH_EVERY_TICKS: u64 = 5;

/// Chunk size of the concurrent detail loader
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Public Sepolia endpoint used when no RPC URL is configured
pub const DEFAULT_RPC_URL: &str = "https://rpc.sepolia.org";

/// Alchemy WebSocket endpoint prefix (the API key is appended)
pub const ALCHEMY_WS_PREFIX: &str = "wss://eth-sepolia.g.alchemy.com/v2/";

/// Module name hashed (keccak256) to look up the governance module in Core
pub const GOVERNANCE_MODULE: &str = "GOVERNANCE";

/// Module name the Router forwards donations to
pub const FUNDRAISING_MODULE: &str = "FUNDRAISING";

/// Campaign title length bounds (characters)
pub const TITLE_MIN_LEN: usize = 5;
pub const TITLE_MAX_LEN: usize = 100;

/// Campaign description length bounds (characters)
pub const DESCRIPTION_MIN_LEN: usize = 20;
pub const DESCRIPTION_MAX_LEN: usize = 5000;

pub const LOCATION_MAX_LEN: usize = 100;

/// Fundraiser duration bounds in days
pub const MIN_DURATION_DAYS: u32 = 1;
pub const MAX_DURATION_DAYS: u32 = 365;

/// Decimals of the default payment token (USDC)
pub const DEFAULT_TOKEN_DECIMALS: u32 = 6;
