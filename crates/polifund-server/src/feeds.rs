//! Live chain feeds served by the API.
//!
//! One poller per collection (fundraisers, proposals) runs in the
//! background; handlers only read the latest published snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use polifund_chain::{
    connect, ChainError, ChainReader, ContractLayout, Contracts, FeedSnapshot, Fundraiser,
    FundraiserSource, IncrementalPoller, PollerConfig, PollerHandle, Proposal, ProposalSource,
    TransportKind,
};
use tokio::sync::watch;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Read side of the running pollers plus direct contract access for
/// on-demand reads.
pub struct ChainFeeds {
    pub layout: ContractLayout,
    pub transport: TransportKind,
    /// Emptied by [`ChainFeeds::shutdown`] so the provider can close.
    contracts: RwLock<Option<Contracts>>,
    pub fundraisers: watch::Receiver<FeedSnapshot<Fundraiser>>,
    pub proposals: watch::Receiver<FeedSnapshot<Proposal>>,
}

/// Owner of the poller tasks.
pub struct FeedTasks {
    handles: Vec<PollerHandle>,
}

impl ChainFeeds {
    pub fn new(
        layout: ContractLayout,
        transport: TransportKind,
        contracts: Contracts,
        fundraisers: watch::Receiver<FeedSnapshot<Fundraiser>>,
        proposals: watch::Receiver<FeedSnapshot<Proposal>>,
    ) -> Self {
        Self {
            layout,
            transport,
            contracts: RwLock::new(Some(contracts)),
            fundraisers,
            proposals,
        }
    }

    /// Contract handle for on-demand reads, until shutdown.
    pub fn contracts(&self) -> Result<Contracts, ServerError> {
        self.contracts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ServerError::ChainUnavailable)
    }

    /// Stop the pollers, then release the last contract handle and with
    /// it the provider connection.
    pub async fn shutdown(&self, tasks: FeedTasks) {
        for handle in tasks.handles {
            handle.shutdown().await;
        }
        self.contracts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("Chain feeds stopped");
    }

    /// Start both pollers over an existing reader.
    pub fn spawn(
        reader: Arc<dyn ChainReader>,
        transport: TransportKind,
        layout: ContractLayout,
        poller: PollerConfig,
        batch_size: usize,
    ) -> (Self, FeedTasks) {
        let contracts = Contracts::new(reader, layout);

        let (fundraiser_handle, fundraisers) = IncrementalPoller::new(
            FundraiserSource::new(contracts.clone(), batch_size),
            poller.refresh_every,
        )
        .spawn(poller.clone());

        let (proposal_handle, proposals) = IncrementalPoller::new(
            ProposalSource::new(contracts.clone(), batch_size),
            poller.refresh_every,
        )
        .spawn(poller);

        info!(layout = layout.name(), ?transport, "Chain feeds started");

        (
            Self::new(layout, transport, contracts, fundraisers, proposals),
            FeedTasks {
                handles: vec![fundraiser_handle, proposal_handle],
            },
        )
    }

    /// Connect to the configured RPC endpoint and start the pollers.
    /// Returns `None` when no contract address is configured.
    pub async fn start(config: &ServerConfig) -> Result<Option<(Self, FeedTasks)>, ChainError> {
        let Some(layout) = config.layout() else {
            info!("No contract address configured, chain feeds disabled");
            return Ok(None);
        };

        let provider = connect(&config.provider_config()).await?;
        Ok(Some(Self::spawn(
            provider.reader,
            provider.kind,
            layout,
            config.poller_config(),
            config.batch_size,
        )))
    }
}
