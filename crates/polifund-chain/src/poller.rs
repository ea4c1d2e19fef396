//! Incremental polling of on-chain collections.
//!
//! The poller keeps an id-ordered copy of a collection (proposals,
//! fundraisers) and follows the chain by block interval:
//!
//! 1. read the block number; nothing else happens unless it advanced
//! 2. re-read the total count
//! 3. if the count grew, load only the new tail and append it
//! 4. otherwise, every n-th tick, reload the known entries to pick up
//!    new vote tallies / raised amounts
//!
//! [`IncrementalPoller`] holds the algorithm and can be driven tick by tick.
//! [`IncrementalPoller::spawn`] runs it on tokio and publishes
//! [`FeedSnapshot`]s through a `watch` channel.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polifund_shared::constants::{BLOCK_TIME_SECS, REFRESH_EVERY_TICKS};
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::types::Identified;

/// A collection the poller can follow.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Item: Identified + Clone + Send + Sync + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// One-time setup before the first load (e.g. module address lookup).
    async fn prepare(&self) -> Result<(), ChainError> {
        Ok(())
    }

    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn count(&self) -> Result<u64, ChainError>;

    /// Ids at zero-based positions `from..to` of the collection.
    async fn ids_between(&self, from: u64, to: u64) -> Result<Vec<u64>, ChainError>;

    /// Best-effort load; unreadable ids are left out.
    async fn load(&self, ids: &[u64]) -> Vec<Self::Item>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// What a single [`IncrementalPoller::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful load of `n` items.
    Initialized(usize),
    /// Block number did not advance.
    Idle,
    /// Count grew; `n` new items were appended.
    Appended(usize),
    /// Counters of `n` known items were reloaded.
    Refreshed(usize),
    /// Block advanced but nothing needed loading.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Upper bound of the random delay added to every interval.
    pub jitter: Duration,
    /// Refresh known items on every n-th tick without new entries.
    pub refresh_every: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(BLOCK_TIME_SECS),
            jitter: Duration::from_millis(500),
            refresh_every: REFRESH_EVERY_TICKS,
        }
    }
}

impl PollerConfig {
    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Published view of a polled collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot<T> {
    pub status: FeedStatus,
    pub items: Vec<T>,
    pub last_block: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for FeedSnapshot<T> {
    fn default() -> Self {
        Self {
            status: FeedStatus::Disconnected,
            items: Vec::new(),
            last_block: None,
            updated_at: None,
        }
    }
}

pub struct IncrementalPoller<S: PollSource> {
    source: S,
    refresh_every: u64,
    items: Vec<S::Item>,
    /// Count reported by the contract at the last load; may exceed
    /// `items.len()` when some entries could not be read.
    known_count: u64,
    last_block: Option<u64>,
    ticks: u64,
    initialized: bool,
}

impl<S: PollSource> IncrementalPoller<S> {
    pub fn new(source: S, refresh_every: u64) -> Self {
        Self {
            source,
            refresh_every: refresh_every.max(1),
            items: Vec::new(),
            known_count: 0,
            last_block: None,
            ticks: 0,
            initialized: false,
        }
    }

    pub fn items(&self) -> &[S::Item] {
        &self.items
    }

    pub fn known_count(&self) -> u64 {
        self.known_count
    }

    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Prepare the source and load the whole collection once.
    pub async fn initialize(&mut self) -> Result<usize, ChainError> {
        self.source.prepare().await?;
        let block = self.source.block_number().await?;
        let count = self.source.count().await?;
        let ids = self.source.ids_between(0, count).await?;

        let mut items = self.source.load(&ids).await;
        items.sort_by_key(|item| item.id());
        items.dedup_by_key(|item| item.id());

        self.items = items;
        self.known_count = count;
        self.last_block = Some(block);
        self.ticks = 0;
        self.initialized = true;

        info!(
            source = self.source.name(),
            count,
            loaded = self.items.len(),
            block,
            "Initial load complete"
        );
        Ok(self.items.len())
    }

    /// Run one poll step. Initializes first if that has not succeeded yet.
    pub async fn tick(&mut self) -> Result<TickOutcome, ChainError> {
        if !self.initialized {
            return self.initialize().await.map(TickOutcome::Initialized);
        }

        let block = self.source.block_number().await?;
        if self.last_block.is_some_and(|last| block <= last) {
            return Ok(TickOutcome::Idle);
        }

        // Idle and failed ticks do not count towards the refresh cadence.
        let tick = self.ticks + 1;

        let count = self.source.count().await?;
        let outcome = if count > self.known_count {
            let ids = self.source.ids_between(self.known_count, count).await?;
            let appended = self.append(self.source.load(&ids).await);
            self.known_count = count;
            info!(source = self.source.name(), appended, count, "New entries appended");
            TickOutcome::Appended(appended)
        } else if tick % self.refresh_every == 0 {
            let refreshed = self.refresh().await;
            debug!(source = self.source.name(), refreshed, "Counters refreshed");
            TickOutcome::Refreshed(refreshed)
        } else {
            TickOutcome::Unchanged
        };

        // Only advance once the whole step succeeded, so a failed count
        // read is retried on the next tick.
        self.last_block = Some(block);
        self.ticks = tick;
        Ok(outcome)
    }

    fn append(&mut self, new_items: Vec<S::Item>) -> usize {
        let mut seen: HashSet<u64> = self.items.iter().map(|item| item.id()).collect();
        let before = self.items.len();
        for item in new_items {
            if seen.insert(item.id()) {
                self.items.push(item);
            }
        }
        self.items.sort_by_key(|item| item.id());
        self.items.len() - before
    }

    /// Reload every known item in place; items that fail to reload keep
    /// their previous value.
    async fn refresh(&mut self) -> usize {
        let ids: Vec<u64> = self.items.iter().map(|item| item.id()).collect();
        let fresh = self.source.load(&ids).await;
        let mut refreshed = 0;
        for item in fresh {
            if let Ok(pos) = self.items.binary_search_by_key(&item.id(), |i| i.id()) {
                self.items[pos] = item;
                refreshed += 1;
            }
        }
        refreshed
    }

    fn snapshot(&self, status: FeedStatus) -> FeedSnapshot<S::Item> {
        FeedSnapshot {
            status,
            items: self.items.clone(),
            last_block: self.last_block,
            updated_at: Some(Utc::now()),
        }
    }

    /// Run the poller on the tokio runtime until the handle is shut down
    /// or dropped. Dropping the poller releases the source and with it
    /// the provider connection.
    pub fn spawn(mut self, config: PollerConfig) -> (PollerHandle, watch::Receiver<FeedSnapshot<S::Item>>) {
        let (feed_tx, feed_rx) = watch::channel(FeedSnapshot::default());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let name = self.source.name();

        let task = tokio::spawn(async move {
            loop {
                if !self.initialized {
                    feed_tx.send_modify(|s| s.status = FeedStatus::Connecting);
                }

                match self.tick().await {
                    Ok(TickOutcome::Idle | TickOutcome::Unchanged) => {
                        debug!(source = name, "Poll tick: no changes");
                    }
                    Ok(outcome) => {
                        debug!(source = name, ?outcome, "Poll tick");
                        feed_tx.send_replace(self.snapshot(FeedStatus::Connected));
                    }
                    Err(e) => {
                        warn!(source = name, error = %e, "Poll tick failed, retrying next interval");
                        if !self.initialized {
                            feed_tx.send_modify(|s| s.status = FeedStatus::Disconnected);
                        }
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(config.next_delay()) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            feed_tx.send_modify(|s| s.status = FeedStatus::Disconnected);
            info!(source = name, "Poller stopped");
        });

        (
            PollerHandle {
                shutdown: shutdown_tx,
                task,
            },
            feed_rx,
        )
    }
}

/// Owner handle of a spawned poller. Dropping it also stops the task.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ethers::types::U256;

    use super::*;
    use crate::sources::{FundraiserSource, ProposalSource};
    use crate::testing::MockChain;
    use crate::types::IdBase;

    fn proposal_poller(chain: &MockChain) -> IncrementalPoller<ProposalSource> {
        IncrementalPoller::new(ProposalSource::new(chain.contracts(), 10), 5)
    }

    fn assert_unique_sorted<T: Identified>(items: &[T]) {
        let ids: Vec<u64> = items.iter().map(Identified::id).collect();
        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in {ids:?}");
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_initial_load() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(12);
        let mut poller = proposal_poller(&chain);

        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Initialized(12));
        assert_eq!(poller.known_count(), 12);
        assert_eq!(poller.last_block(), Some(100));
        assert_unique_sorted(poller.items());
    }

    #[tokio::test]
    async fn test_appends_exactly_new_tail() {
        for (n, k) in [(0u64, 1u64), (3, 4), (10, 1), (7, 13)] {
            let chain = MockChain::legacy(IdBase::One);
            chain.add_proposals(n);
            let mut poller = proposal_poller(&chain);
            poller.initialize().await.unwrap();

            chain.add_proposals(k);
            chain.advance_block(1);
            assert_eq!(poller.tick().await.unwrap(), TickOutcome::Appended(k as usize));
            assert_eq!(poller.items().len() as u64, n + k);
            assert_unique_sorted(poller.items());

            for p in &poller.items()[n as usize..] {
                let expected = chain.proposal(p.id);
                assert_eq!(p.yes_votes, expected.yes_votes);
                assert_eq!(p.no_votes, expected.no_votes);
            }
        }
    }

    #[tokio::test]
    async fn test_idle_when_block_not_advanced() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(2);
        let mut poller = proposal_poller(&chain);
        poller.initialize().await.unwrap();

        chain.add_proposals(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(poller.items().len(), 2);

        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Appended(1));
    }

    #[tokio::test]
    async fn test_refresh_every_fifth_tick() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(3);
        let mut poller = proposal_poller(&chain);
        poller.initialize().await.unwrap();

        chain.set_votes(2, 40, 2);
        for _ in 0..4 {
            chain.advance_block(1);
            assert_eq!(poller.tick().await.unwrap(), TickOutcome::Unchanged);
        }
        assert_eq!(poller.items()[1].yes_votes, U256::from(6u64));

        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Refreshed(3));
        assert_eq!(poller.items()[1].yes_votes, U256::from(40u64));
        assert_eq!(poller.items()[1].no_votes, U256::from(2u64));
    }

    #[tokio::test]
    async fn test_idle_ticks_do_not_skip_refresh() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(3);
        let mut poller = proposal_poller(&chain);
        poller.initialize().await.unwrap();

        chain.set_votes(2, 40, 2);
        for _ in 0..4 {
            chain.advance_block(1);
            assert_eq!(poller.tick().await.unwrap(), TickOutcome::Unchanged);
            assert_eq!(poller.tick().await.unwrap(), TickOutcome::Idle);
        }

        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Refreshed(3));
        assert_eq!(poller.items()[1].yes_votes, U256::from(40u64));
    }

    #[tokio::test]
    async fn test_unreadable_tail_entry_is_skipped_once() {
        let chain = MockChain::legacy(IdBase::One);
        chain.add_proposals(2);
        let mut poller = proposal_poller(&chain);
        poller.initialize().await.unwrap();

        chain.add_proposals(3);
        chain.revert_on(4);
        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Appended(2));
        assert_eq!(poller.known_count(), 5);

        // The next tick does not re-request the same tail.
        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Unchanged);
        assert_unique_sorted(poller.items());
    }

    #[tokio::test]
    async fn test_failed_tick_is_retried() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(2);
        let mut poller = proposal_poller(&chain);
        poller.initialize().await.unwrap();

        chain.add_proposals(2);
        chain.advance_block(1);
        chain.set_offline(true);
        assert!(poller.tick().await.is_err());
        assert_eq!(poller.last_block(), Some(100));

        chain.set_offline(false);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Appended(2));
    }

    #[tokio::test]
    async fn test_fundraiser_source_with_zero_base() {
        let chain = MockChain::modular(IdBase::Zero);
        chain.add_fundraisers(4);
        let mut poller = IncrementalPoller::new(FundraiserSource::new(chain.contracts(), 10), 5);
        poller.initialize().await.unwrap();
        assert_eq!(poller.items().first().map(|f| f.id), Some(0));

        chain.add_fundraisers(2);
        chain.set_raised(0, 777);
        chain.advance_block(1);
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::Appended(2));
        assert_eq!(poller.items().len(), 6);
        assert_unique_sorted(poller.items());
    }

    #[tokio::test]
    async fn test_spawned_poller_publishes_and_stops() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(3);
        let config = PollerConfig {
            interval: Duration::from_millis(10),
            jitter: Duration::ZERO,
            refresh_every: 5,
        };
        let (handle, mut feed) = proposal_poller(&chain).spawn(config);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if feed.borrow().status == FeedStatus::Connected {
                    break;
                }
                feed.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(feed.borrow().items.len(), 3);

        chain.add_proposals(2);
        chain.advance_block(1);
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.borrow().items.len() < 5 {
                feed.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        handle.shutdown().await;
        assert_eq!(feed.borrow().status, FeedStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_spawned_poller_reports_disconnected_until_reachable() {
        let chain = MockChain::modular(IdBase::One);
        chain.add_proposals(1);
        chain.set_offline(true);
        let config = PollerConfig {
            interval: Duration::from_millis(10),
            jitter: Duration::from_millis(5),
            refresh_every: 5,
        };
        let (handle, mut feed) = proposal_poller(&chain).spawn(config);

        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.borrow().status != FeedStatus::Disconnected {
                feed.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        chain.set_offline(false);
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.borrow().status != FeedStatus::Connected {
                feed.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        drop(handle);
    }

    #[test]
    fn test_jitter_bounds() {
        let config = PollerConfig {
            interval: Duration::from_secs(12),
            jitter: Duration::from_millis(500),
            refresh_every: 5,
        };
        for _ in 0..100 {
            let d = config.next_delay();
            assert!(d >= Duration::from_secs(12));
            assert!(d <= Duration::from_millis(12_500));
        }
    }
}
