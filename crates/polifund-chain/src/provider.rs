//! RPC provider adapter.
//!
//! [`connect`] prefers an Alchemy WebSocket endpoint when an API key is
//! configured and falls back to plain HTTP JSON-RPC. There is exactly one
//! fallback attempt and no reconnect: a dropped socket surfaces as
//! transport errors until the owner builds a new provider.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcError, Middleware, MiddlewareError, Provider, Ws};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use polifund_shared::constants::{ALCHEMY_WS_PREFIX, DEFAULT_RPC_URL};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ChainError;
use crate::revert::ContractError;

/// Read-only view of the chain. Every accessor goes through this trait.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub alchemy_api_key: Option<String>,
    pub rpc_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            alchemy_api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    WebSocket,
    Http,
}

pub struct ConnectedProvider {
    pub reader: Arc<dyn ChainReader>,
    pub kind: TransportKind,
}

impl std::fmt::Debug for ConnectedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedProvider")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Connect to the chain: WebSocket first (if a key is set), then HTTP.
pub async fn connect(config: &ProviderConfig) -> Result<ConnectedProvider, ChainError> {
    if let Some(key) = config.alchemy_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        let url = format!("{ALCHEMY_WS_PREFIX}{}", key.trim());
        match Provider::<Ws>::connect(url.as_str()).await {
            Ok(provider) => {
                info!("Connected to RPC over WebSocket");
                return Ok(ConnectedProvider {
                    reader: Arc::new(EthersReader::new(Arc::new(provider))),
                    kind: TransportKind::WebSocket,
                });
            }
            Err(e) => {
                warn!(error = %e, "WebSocket RPC connection failed, falling back to HTTP");
            }
        }
    }

    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
        .map_err(|e| ChainError::Config(format!("invalid RPC URL '{}': {e}", config.rpc_url)))?;
    info!(url = %config.rpc_url, "Using HTTP JSON-RPC provider");

    Ok(ConnectedProvider {
        reader: Arc::new(EthersReader::new(Arc::new(provider))),
        kind: TransportKind::Http,
    })
}

/// [`ChainReader`] over any ethers middleware stack.
#[derive(Debug)]
pub struct EthersReader<M> {
    client: Arc<M>,
}

impl<M: Middleware> EthersReader<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for EthersReader<M> {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let n = self
            .client
            .get_block_number()
            .await
            .map_err(classify_error)?;
        Ok(n.as_u64())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client.call(&tx, None).await.map_err(classify_error)
    }
}

/// Split middleware failures into reverts (with decoded data) and
/// transport problems.
pub(crate) fn classify_error<E: MiddlewareError>(err: E) -> ChainError {
    if let Some(resp) = err.as_error_response() {
        if let Some(revert) = revert_from_response(resp) {
            return ChainError::Revert(revert);
        }
    }
    ChainError::Transport(err.to_string())
}

fn revert_from_response(resp: &JsonRpcError) -> Option<ContractError> {
    // Nodes put revert data either directly in `data` or one level deeper.
    let data = resp.data.as_ref().and_then(|v| {
        v.as_str()
            .or_else(|| v.get("data").and_then(|inner| inner.as_str()))
    });

    if let Some(hex_data) = data {
        if let Ok(bytes) = hex::decode(hex_data.trim_start_matches("0x")) {
            return Some(ContractError::decode(&bytes));
        }
    }

    // Error code 3 is "execution reverted" on geth-compatible nodes.
    if resp.code == 3 || resp.message.contains("revert") {
        let reason = resp
            .message
            .split_once("execution reverted: ")
            .map(|(_, reason)| reason.trim().to_string());
        return Some(match reason {
            Some(reason) if !reason.is_empty() => ContractError::Message(reason),
            _ => ContractError::decode(&[]),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str, data: Option<serde_json::Value>) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn test_revert_with_hex_data() {
        let data = ContractError::FundraiserNotFound(5).encode();
        let resp = rpc_error(
            3,
            "execution reverted",
            Some(serde_json::Value::String(format!("0x{}", hex::encode(&data)))),
        );
        assert_eq!(
            revert_from_response(&resp),
            Some(ContractError::FundraiserNotFound(5))
        );
    }

    #[test]
    fn test_revert_with_nested_data() {
        let data = ContractError::ContractPaused.encode();
        let resp = rpc_error(
            -32000,
            "execution reverted",
            Some(serde_json::json!({ "data": format!("0x{}", hex::encode(&data)) })),
        );
        assert_eq!(revert_from_response(&resp), Some(ContractError::ContractPaused));
    }

    #[test]
    fn test_revert_reason_in_message() {
        let resp = rpc_error(-32000, "execution reverted: Goal too low", None);
        assert_eq!(
            revert_from_response(&resp),
            Some(ContractError::Message("Goal too low".into()))
        );
    }

    #[test]
    fn test_non_revert_error() {
        let resp = rpc_error(-32005, "rate limit exceeded", None);
        assert_eq!(revert_from_response(&resp), None);
    }

    #[tokio::test]
    async fn test_http_fallback_without_key() {
        let config = ProviderConfig {
            alchemy_api_key: Some("  ".into()),
            rpc_url: "http://127.0.0.1:8545".into(),
        };
        let provider = connect(&config).await.unwrap();
        assert_eq!(provider.kind, TransportKind::Http);
    }

    #[tokio::test]
    async fn test_invalid_rpc_url() {
        let config = ProviderConfig {
            alchemy_api_key: None,
            rpc_url: "not a url".into(),
        };
        assert!(matches!(connect(&config).await, Err(ChainError::Config(_))));
    }
}
