//! Canonical records for on-chain entities.
//!
//! Both contract layouts decode into these types at the accessor boundary,
//! so nothing past [`crate::contracts`] has to care which ABI produced a
//! value.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::abi::TokenReader;
use crate::error::ChainError;

/// Anything tracked by id in a polled feed.
pub trait Identified {
    fn id(&self) -> u64;
}

/// Whether a contract numbers its entities from 0 or from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdBase {
    Zero,
    #[default]
    One,
}

impl IdBase {
    pub fn first_id(self) -> u64 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }

    /// Id at zero-based `index` in the id space.
    pub fn id_at(self, index: u64) -> u64 {
        self.first_id() + index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundraiser {
    pub id: u64,
    pub creator: Address,
    /// Payment token.
    pub token: Address,
    #[serde(with = "u256_dec")]
    pub goal: U256,
    #[serde(with = "u256_dec")]
    pub raised: U256,
    /// Unix timestamp (seconds).
    pub end_time: u64,
    pub is_flexible: bool,
    pub is_suspended: bool,
    pub closure_initiated: bool,
}

impl Fundraiser {
    /// Legacy `getFundraiser(id)`; the id is not part of the return value.
    pub(crate) fn from_legacy(id: u64, mut r: TokenReader) -> Result<Self, ChainError> {
        Ok(Self {
            id,
            creator: r.address()?,
            token: r.address()?,
            goal: r.uint()?,
            raised: r.uint()?,
            end_time: r.u64()?,
            is_flexible: r.bool()?,
            is_suspended: false,
            closure_initiated: r.bool()?,
        })
    }

    /// Modular `getFundraiserDetails(id)`.
    pub(crate) fn from_modular(mut r: TokenReader) -> Result<Self, ChainError> {
        Ok(Self {
            id: r.u64()?,
            creator: r.address()?,
            token: r.address()?,
            goal: r.uint()?,
            raised: r.uint()?,
            end_time: r.u64()?,
            is_flexible: r.bool()?,
            is_suspended: r.bool()?,
            closure_initiated: r.bool()?,
        })
    }

    pub fn is_active(&self, now: u64) -> bool {
        !self.is_suspended && !self.closure_initiated && now < self.end_time
    }

    /// Whole percent of the goal raised, capped at 100. Flexible
    /// fundraisers without a goal report 0.
    pub fn progress_percent(&self) -> u8 {
        if self.goal.is_zero() {
            return 0;
        }
        let pct = self.raised.saturating_mul(U256::from(100u64)) / self.goal;
        pct.min(U256::from(100u64)).as_u64() as u8
    }
}

impl Identified for Fundraiser {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: u64,
    pub question: String,
    #[serde(with = "u256_dec")]
    pub yes_votes: U256,
    #[serde(with = "u256_dec")]
    pub no_votes: U256,
    pub end_time: u64,
    pub creator: Address,
    pub exists: bool,
    pub executed: bool,
}

impl Proposal {
    /// Shared by legacy `getProposal`, governance `getProposal` and the
    /// elements of `getProposals`; only the governance shape carries `executed`.
    pub(crate) fn from_tokens(mut r: TokenReader, with_executed: bool) -> Result<Self, ChainError> {
        Ok(Self {
            id: r.u64()?,
            question: r.string()?,
            yes_votes: r.uint()?,
            no_votes: r.uint()?,
            end_time: r.u64()?,
            creator: r.address()?,
            exists: r.bool()?,
            executed: if with_executed { r.bool()? } else { false },
        })
    }

    pub fn is_open(&self, now: u64) -> bool {
        self.exists && !self.executed && now < self.end_time
    }

    pub fn total_votes(&self) -> U256 {
        self.yes_votes.saturating_add(self.no_votes)
    }
}

impl Identified for Proposal {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundraiserProgress {
    #[serde(with = "u256_dec")]
    pub raised: U256,
    #[serde(with = "u256_dec")]
    pub goal: U256,
    pub percentage: u64,
    pub donors_count: u64,
    /// Seconds until the end date, 0 once it has passed.
    pub time_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_fundraisers: u64,
    pub active_fundraisers: u64,
    pub total_proposals: u64,
    #[serde(with = "u256_dec")]
    pub total_donations: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub can_create: bool,
    pub is_suspended: bool,
    pub fundraisers_created: u64,
    pub donations_count: u64,
}

/// Serialize `U256` as a decimal string; JSON numbers cannot hold token amounts.
pub mod u256_dec {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(D::Error::custom)
    }
}
