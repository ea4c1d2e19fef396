//! [`PollSource`] implementations for the two polled collections.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::contracts::Contracts;
use crate::error::ChainError;
use crate::poller::PollSource;
use crate::types::{Fundraiser, IdBase, Proposal};

/// Position-to-id mapping shared by both sources. The base is detected
/// lazily, the first time a non-empty range is requested, because an
/// empty collection cannot tell 0-based from 1-based numbering.
async fn ids_in_range<F, Fut>(
    base: &OnceCell<IdBase>,
    from: u64,
    to: u64,
    detect: F,
) -> Result<Vec<u64>, ChainError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<IdBase, ChainError>>,
{
    if from >= to {
        return Ok(Vec::new());
    }
    let base = *base.get_or_try_init(detect).await?;
    debug!(?base, from, to, "Resolved id range");
    Ok((from..to).map(|index| base.id_at(index)).collect())
}

pub struct ProposalSource {
    contracts: Contracts,
    batch_size: usize,
    id_base: OnceCell<IdBase>,
}

impl ProposalSource {
    pub fn new(contracts: Contracts, batch_size: usize) -> Self {
        Self {
            contracts,
            batch_size,
            id_base: OnceCell::new(),
        }
    }
}

#[async_trait]
impl PollSource for ProposalSource {
    type Item = Proposal;

    fn name(&self) -> &'static str {
        "proposals"
    }

    async fn prepare(&self) -> Result<(), ChainError> {
        self.contracts.governance_address().await.map(|_| ())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.contracts.block_number().await
    }

    async fn count(&self) -> Result<u64, ChainError> {
        self.contracts.fetch_proposal_count().await
    }

    async fn ids_between(&self, from: u64, to: u64) -> Result<Vec<u64>, ChainError> {
        ids_in_range(&self.id_base, from, to, || self.contracts.detect_proposal_id_base()).await
    }

    async fn load(&self, ids: &[u64]) -> Vec<Proposal> {
        self.contracts.load_proposals(ids, self.batch_size).await
    }
}

pub struct FundraiserSource {
    contracts: Contracts,
    batch_size: usize,
    id_base: OnceCell<IdBase>,
}

impl FundraiserSource {
    pub fn new(contracts: Contracts, batch_size: usize) -> Self {
        Self {
            contracts,
            batch_size,
            id_base: OnceCell::new(),
        }
    }
}

#[async_trait]
impl PollSource for FundraiserSource {
    type Item = Fundraiser;

    fn name(&self) -> &'static str {
        "fundraisers"
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.contracts.block_number().await
    }

    async fn count(&self) -> Result<u64, ChainError> {
        self.contracts.fetch_fundraiser_count().await
    }

    async fn ids_between(&self, from: u64, to: u64) -> Result<Vec<u64>, ChainError> {
        ids_in_range(&self.id_base, from, to, || self.contracts.detect_id_base()).await
    }

    async fn load(&self, ids: &[u64]) -> Vec<Fundraiser> {
        self.contracts.load_fundraisers(ids, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    #[tokio::test]
    async fn test_empty_range_skips_id_base_detection() {
        let chain = MockChain::modular(IdBase::Zero);
        let source = FundraiserSource::new(chain.contracts(), 10);

        assert!(source.ids_between(0, 0).await.unwrap().is_empty());
        assert!(source.id_base.get().is_none());

        chain.add_fundraisers(3);
        assert_eq!(source.ids_between(0, 3).await.unwrap(), vec![0, 1, 2]);
        assert_eq!(source.id_base.get(), Some(&IdBase::Zero));
    }

    #[tokio::test]
    async fn test_proposal_ids_one_based() {
        let chain = MockChain::legacy(IdBase::One);
        chain.add_proposals(4);
        let source = ProposalSource::new(chain.contracts(), 10);

        source.prepare().await.unwrap();
        assert_eq!(source.count().await.unwrap(), 4);
        assert_eq!(source.ids_between(2, 4).await.unwrap(), vec![3, 4]);
        assert_eq!(source.load(&[3, 4, 5]).await.len(), 2);
    }

    #[tokio::test]
    async fn test_prepare_fails_offline() {
        let chain = MockChain::modular(IdBase::One);
        chain.set_offline(true);
        let source = ProposalSource::new(chain.contracts(), 10);
        assert!(source.prepare().await.is_err());
    }
}
