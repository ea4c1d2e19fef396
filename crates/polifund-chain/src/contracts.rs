//! Typed read accessors over both contract layouts.

use std::sync::Arc;

use chrono::Utc;
use ethers::abi::Token;
use ethers::types::{Address, U256};
use polifund_shared::constants::GOVERNANCE_MODULE;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::abi::{self, Method, TokenReader};
use crate::batch::load_batched;
use crate::error::ChainError;
use crate::layout::ContractLayout;
use crate::provider::ChainReader;
use crate::types::{Fundraiser, FundraiserProgress, IdBase, PlatformStats, Proposal, UserStatus};

/// Ids on `page` (0-based) when `total` entities exist.
///
/// Returns `min(page_size, total - page * page_size)` ids, or nothing once
/// the page starts past the end.
pub fn page_ids(total: u64, page: u64, page_size: u64, base: IdBase) -> Vec<u64> {
    let start = page.saturating_mul(page_size);
    if page_size == 0 || start >= total {
        return Vec::new();
    }
    let end = start.saturating_add(page_size).min(total);
    (start..end).map(|index| base.id_at(index)).collect()
}

/// Accessors for one deployment. Cheap to clone; clones share the
/// resolved governance address.
#[derive(Clone)]
pub struct Contracts {
    reader: Arc<dyn ChainReader>,
    layout: ContractLayout,
    governance: Arc<OnceCell<Address>>,
}

impl std::fmt::Debug for Contracts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contracts")
            .field("layout", &self.layout)
            .field("governance", &self.governance.get())
            .finish_non_exhaustive()
    }
}

impl Contracts {
    pub fn new(reader: Arc<dyn ChainReader>, layout: ContractLayout) -> Self {
        Self {
            reader,
            layout,
            governance: Arc::new(OnceCell::new()),
        }
    }

    pub fn layout(&self) -> ContractLayout {
        self.layout
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        self.reader.block_number().await
    }

    async fn read(&self, to: Address, method: Method, args: &[Token]) -> Result<TokenReader, ChainError> {
        let output = self.reader.call(to, method.encode(args)).await?;
        method.decode_output(&output)
    }

    fn unsupported(&self, operation: &'static str) -> ChainError {
        ChainError::Unsupported {
            layout: self.layout.name(),
            operation,
        }
    }

    // ------------------------------------------------------------------
    // Fundraisers
    // ------------------------------------------------------------------

    pub async fn fetch_fundraiser_count(&self) -> Result<u64, ChainError> {
        let method = match self.layout {
            ContractLayout::Legacy { .. } => abi::legacy::get_fundraiser_count(),
            ContractLayout::Modular { .. } => abi::modular_core::get_fundraiser_count(),
        };
        self.read(self.layout.fundraiser_contract(), method, &[])
            .await?
            .u64()
    }

    pub async fn fetch_fundraiser(&self, id: u64) -> Result<Fundraiser, ChainError> {
        let to = self.layout.fundraiser_contract();
        let args = [Token::Uint(U256::from(id))];
        match self.layout {
            ContractLayout::Legacy { .. } => {
                let r = self.read(to, abi::legacy::get_fundraiser(), &args).await?;
                Fundraiser::from_legacy(id, r)
            }
            ContractLayout::Modular { .. } => {
                let r = self
                    .read(to, abi::modular_core::get_fundraiser_details(), &args)
                    .await?;
                Fundraiser::from_modular(r)
            }
        }
    }

    /// Like [`Self::fetch_fundraiser`] but never fails: gaps in the id
    /// space (closed or removed campaigns) and broken reads become `None`.
    pub async fn fetch_fundraiser_safe(&self, id: u64) -> Option<Fundraiser> {
        match self.fetch_fundraiser(id).await {
            Ok(f) => Some(f),
            Err(ChainError::Revert(reason)) => {
                debug!(id, %reason, "Fundraiser read reverted, skipping");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "Fundraiser read failed, skipping");
                None
            }
        }
    }

    pub async fn fetch_fundraiser_progress(&self, id: u64) -> Result<FundraiserProgress, ChainError> {
        match self.layout {
            ContractLayout::Legacy { .. } => {
                let f = self.fetch_fundraiser(id).await?;
                let now = Utc::now().timestamp().max(0) as u64;
                Ok(FundraiserProgress {
                    raised: f.raised,
                    goal: f.goal,
                    percentage: u64::from(f.progress_percent()),
                    donors_count: 0,
                    time_left: f.end_time.saturating_sub(now),
                })
            }
            ContractLayout::Modular { core, .. } => {
                let mut r = self
                    .read(
                        core,
                        abi::modular_core::get_fundraiser_progress(),
                        &[Token::Uint(U256::from(id))],
                    )
                    .await?;
                Ok(FundraiserProgress {
                    raised: r.uint()?,
                    goal: r.uint()?,
                    percentage: r.u64()?,
                    donors_count: r.u64()?,
                    time_left: r.u64()?,
                })
            }
        }
    }

    /// Read id 0 to learn whether fundraisers are numbered from 0 or 1.
    /// A revert means id 0 does not exist, so numbering starts at 1.
    pub async fn detect_id_base(&self) -> Result<IdBase, ChainError> {
        match self.fetch_fundraiser(0).await {
            Ok(_) => Ok(IdBase::Zero),
            Err(ChainError::Revert(_)) => Ok(IdBase::One),
            Err(e) => Err(e),
        }
    }

    pub async fn list_fundraiser_ids(&self, page: u64, page_size: u64) -> Result<Vec<u64>, ChainError> {
        let total = self.fetch_fundraiser_count().await?;
        let base = self.detect_id_base().await?;
        Ok(page_ids(total, page, page_size, base))
    }

    pub async fn list_all_fundraiser_ids(&self) -> Result<Vec<u64>, ChainError> {
        match self.layout {
            ContractLayout::Legacy { address } => {
                let mut ids = self
                    .read(address, abi::legacy::get_all_fundraiser_ids(), &[])
                    .await?
                    .u64_array()?;
                ids.sort_unstable();
                Ok(ids)
            }
            ContractLayout::Modular { .. } => {
                let total = self.fetch_fundraiser_count().await?;
                let base = self.detect_id_base().await?;
                Ok(page_ids(total, 0, total, base))
            }
        }
    }

    /// Fetch details for `ids` in concurrent chunks, dropping failures.
    pub async fn load_fundraisers(&self, ids: &[u64], batch_size: usize) -> Vec<Fundraiser> {
        load_batched(ids, batch_size, |id| self.fetch_fundraiser_safe(id)).await
    }

    pub async fn is_token_whitelisted(&self, token: Address) -> Result<bool, ChainError> {
        let method = match self.layout {
            ContractLayout::Legacy { .. } => abi::legacy::is_token_whitelisted(),
            ContractLayout::Modular { .. } => abi::modular_core::is_token_whitelisted(),
        };
        self.read(self.layout.fundraiser_contract(), method, &[Token::Address(token)])
            .await?
            .bool()
    }

    // ------------------------------------------------------------------
    // Platform / users
    // ------------------------------------------------------------------

    pub async fn fetch_platform_stats(&self) -> Result<PlatformStats, ChainError> {
        let ContractLayout::Modular { core, .. } = self.layout else {
            return Err(self.unsupported("getPlatformStats"));
        };
        let mut r = self
            .read(core, abi::modular_core::get_platform_stats(), &[])
            .await?;
        Ok(PlatformStats {
            total_fundraisers: r.u64()?,
            active_fundraisers: r.u64()?,
            total_proposals: r.u64()?,
            total_donations: r.uint()?,
        })
    }

    pub async fn fetch_user_status(&self, user: Address) -> Result<UserStatus, ChainError> {
        let ContractLayout::Modular { core, .. } = self.layout else {
            return Err(self.unsupported("getUserStatus"));
        };
        let mut r = self
            .read(core, abi::modular_core::get_user_status(), &[Token::Address(user)])
            .await?;
        Ok(UserStatus {
            can_create: r.bool()?,
            is_suspended: r.bool()?,
            fundraisers_created: r.u64()?,
            donations_count: r.u64()?,
        })
    }

    // ------------------------------------------------------------------
    // Governance
    // ------------------------------------------------------------------

    /// Address answering proposal reads. For the modular layout it is
    /// looked up once in Core and cached.
    pub async fn governance_address(&self) -> Result<Address, ChainError> {
        let core = match self.layout {
            ContractLayout::Legacy { address } => return Ok(address),
            ContractLayout::Modular { core, .. } => core,
        };

        let address = self
            .governance
            .get_or_try_init(|| async move {
                let key = abi::module_key(GOVERNANCE_MODULE);
                let address = self
                    .read(
                        core,
                        abi::modular_core::get_module(),
                        &[Token::FixedBytes(key.as_bytes().to_vec())],
                    )
                    .await?
                    .address()?;
                if address.is_zero() {
                    return Err(ChainError::Config(
                        "governance module is not registered in Core".into(),
                    ));
                }
                info!(governance = ?address, "Resolved governance module");
                Ok(address)
            })
            .await?;
        Ok(*address)
    }

    pub async fn fetch_proposal_count(&self) -> Result<u64, ChainError> {
        let governance = self.governance_address().await?;
        let method = match self.layout {
            ContractLayout::Legacy { .. } => abi::legacy::get_proposal_count(),
            ContractLayout::Modular { .. } => abi::governance::get_proposal_count(),
        };
        self.read(governance, method, &[]).await?.u64()
    }

    pub async fn fetch_proposal(&self, id: u64) -> Result<Proposal, ChainError> {
        let governance = self.governance_address().await?;
        let args = [Token::Uint(U256::from(id))];
        match self.layout {
            ContractLayout::Legacy { .. } => {
                let r = self.read(governance, abi::legacy::get_proposal(), &args).await?;
                Proposal::from_tokens(r, false)
            }
            ContractLayout::Modular { .. } => {
                let r = self
                    .read(governance, abi::governance::get_proposal(), &args)
                    .await?;
                Proposal::from_tokens(r, true)
            }
        }
    }

    pub async fn fetch_proposal_safe(&self, id: u64) -> Option<Proposal> {
        match self.fetch_proposal(id).await {
            Ok(p) => Some(p),
            Err(ChainError::Revert(reason)) => {
                debug!(id, %reason, "Proposal read reverted, skipping");
                None
            }
            Err(e) => {
                warn!(id, error = %e, "Proposal read failed, skipping");
                None
            }
        }
    }

    pub async fn detect_proposal_id_base(&self) -> Result<IdBase, ChainError> {
        match self.fetch_proposal(0).await {
            Ok(_) => Ok(IdBase::Zero),
            Err(ChainError::Revert(_)) => Ok(IdBase::One),
            Err(e) => Err(e),
        }
    }

    /// Up to `limit` proposals starting at position `offset`.
    pub async fn fetch_proposals_page(
        &self,
        offset: u64,
        limit: u64,
        batch_size: usize,
    ) -> Result<Vec<Proposal>, ChainError> {
        let governance = self.governance_address().await?;
        match self.layout {
            ContractLayout::Legacy { .. } => {
                let ids = self
                    .read(governance, abi::legacy::get_all_proposal_ids(), &[])
                    .await?
                    .u64_array()?;
                let page: Vec<u64> = ids
                    .into_iter()
                    .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                    .take(usize::try_from(limit).unwrap_or(usize::MAX))
                    .collect();
                Ok(self.load_proposals(&page, batch_size).await)
            }
            ContractLayout::Modular { .. } => self
                .read(
                    governance,
                    abi::governance::get_proposals(),
                    &[Token::Uint(U256::from(offset)), Token::Uint(U256::from(limit))],
                )
                .await?
                .tuple_array()?
                .into_iter()
                .map(|r| Proposal::from_tokens(r, true))
                .collect(),
        }
    }

    pub async fn load_proposals(&self, ids: &[u64], batch_size: usize) -> Vec<Proposal> {
        load_batched(ids, batch_size, |id| self.fetch_proposal_safe(id)).await
    }
}
