//! # polifund-chain
//!
//! Read and write access to the PolyFund smart contracts.
//!
//! Layers, leaves first:
//! - **provider**: RPC connection (WebSocket preferred, HTTP fallback)
//!   behind the [`ChainReader`] trait
//! - **abi / contracts**: typed accessors over the legacy monolithic
//!   contract and the modular Core/Router/Governance family; every return
//!   shape is decoded once into the records in [`types`]
//! - **batch**: chunked concurrent detail loading that tolerates per-item
//!   reverts
//! - **poller**: block-interval incremental refresh publishing snapshots
//!   over a `watch` channel
//! - **writer**: fundraiser creation and other state-changing calls

pub mod abi;
pub mod batch;
pub mod contracts;
pub mod error;
pub mod layout;
pub mod poller;
pub mod provider;
pub mod revert;
pub mod sources;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::load_batched;
pub use contracts::{page_ids, Contracts};
pub use error::ChainError;
pub use layout::ContractLayout;
pub use poller::{
    FeedSnapshot, FeedStatus, IncrementalPoller, PollSource, PollerConfig, PollerHandle, TickOutcome,
};
pub use provider::{connect, ChainReader, ConnectedProvider, EthersReader, ProviderConfig, TransportKind};
pub use revert::ContractError;
pub use sources::{FundraiserSource, ProposalSource};
pub use types::*;
pub use writer::{CreateFundraiserParams, EthersWriter, FundraiserWriter, TxOutcome};
