use thiserror::Error;

use crate::revert::ContractError;

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// The RPC endpoint could not be reached or answered with a non-revert error.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The call reverted; the revert data has already been decoded.
    #[error("Execution reverted: {0}")]
    Revert(ContractError),

    #[error("ABI decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The selected contract layout does not expose this read.
    #[error("Not supported by the {layout} contract layout: {operation}")]
    Unsupported {
        layout: &'static str,
        operation: &'static str,
    },
}

impl ChainError {
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert(_))
    }
}
