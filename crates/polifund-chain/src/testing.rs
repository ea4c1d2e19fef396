//! In-memory contract deployment for tests.
//!
//! `MockChain` answers `eth_call`s for both contract layouts by decoding
//! the calldata and ABI-encoding the stored records, so tests exercise the
//! same encode/decode path as a real node.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::abi::{self as ethabi, Token};
use ethers::types::{Address, Bytes, H160, U256};

use crate::abi::{self, u256_to_u64, Method};
use crate::contracts::Contracts;
use crate::error::ChainError;
use crate::layout::ContractLayout;
use crate::provider::ChainReader;
use crate::revert::ContractError;
use crate::types::{Fundraiser, IdBase, Proposal};

pub const LEGACY: Address = H160([0x11; 20]);
pub const CORE: Address = H160([0x22; 20]);
pub const ROUTER: Address = H160([0x33; 20]);
pub const GOVERNANCE: Address = H160([0x44; 20]);

pub const FAR_FUTURE: u64 = 2_000_000_000;

struct MockState {
    layout: ContractLayout,
    base: IdBase,
    block: u64,
    fundraisers: BTreeMap<u64, Fundraiser>,
    proposals: BTreeMap<u64, Proposal>,
    whitelist: HashSet<Address>,
    reverting: HashSet<u64>,
    offline: bool,
    calls: usize,
}

#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    fn with_layout(layout: ContractLayout, base: IdBase) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                layout,
                base,
                block: 100,
                fundraisers: BTreeMap::new(),
                proposals: BTreeMap::new(),
                whitelist: HashSet::new(),
                reverting: HashSet::new(),
                offline: false,
                calls: 0,
            })),
        }
    }

    pub fn legacy(base: IdBase) -> Self {
        Self::with_layout(ContractLayout::Legacy { address: LEGACY }, base)
    }

    pub fn modular(base: IdBase) -> Self {
        Self::with_layout(
            ContractLayout::Modular {
                core: CORE,
                router: ROUTER,
            },
            base,
        )
    }

    pub fn contracts(&self) -> Contracts {
        let layout = self.state.lock().unwrap().layout;
        Contracts::new(Arc::new(self.clone()), layout)
    }

    pub fn add_fundraisers(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        let legacy = matches!(s.layout, ContractLayout::Legacy { .. });
        for _ in 0..n {
            let id = s.base.id_at(s.fundraisers.len() as u64);
            s.fundraisers.insert(
                id,
                Fundraiser {
                    id,
                    creator: Address::from_low_u64_be(1_000 + id),
                    token: Address::repeat_byte(0x55),
                    goal: U256::from(1_000 * (id + 1)),
                    raised: U256::from(10 * id),
                    end_time: FAR_FUTURE,
                    is_flexible: id % 2 == 0,
                    is_suspended: !legacy && id % 5 == 4,
                    closure_initiated: false,
                },
            );
        }
    }

    pub fn add_proposals(&self, n: u64) {
        let mut s = self.state.lock().unwrap();
        let legacy = matches!(s.layout, ContractLayout::Legacy { .. });
        for _ in 0..n {
            let id = s.base.id_at(s.proposals.len() as u64);
            s.proposals.insert(
                id,
                Proposal {
                    id,
                    question: format!("Proposal #{id}"),
                    yes_votes: U256::from(3 * id),
                    no_votes: U256::from(id),
                    end_time: FAR_FUTURE,
                    creator: Address::from_low_u64_be(2_000 + id),
                    exists: true,
                    executed: !legacy && id % 7 == 6,
                },
            );
        }
    }

    pub fn fundraiser(&self, id: u64) -> Fundraiser {
        self.state.lock().unwrap().fundraisers[&id].clone()
    }

    pub fn proposal(&self, id: u64) -> Proposal {
        self.state.lock().unwrap().proposals[&id].clone()
    }

    pub fn set_votes(&self, id: u64, yes: u64, no: u64) {
        let mut s = self.state.lock().unwrap();
        if let Some(p) = s.proposals.get_mut(&id) {
            p.yes_votes = U256::from(yes);
            p.no_votes = U256::from(no);
        }
    }

    pub fn set_raised(&self, id: u64, raised: u64) {
        let mut s = self.state.lock().unwrap();
        if let Some(f) = s.fundraisers.get_mut(&id) {
            f.raised = U256::from(raised);
        }
    }

    /// Make reads of `id` revert even though the entity exists.
    pub fn revert_on(&self, id: u64) {
        self.state.lock().unwrap().reverting.insert(id);
    }

    pub fn whitelist(&self, token: Address) {
        self.state.lock().unwrap().whitelist.insert(token);
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn advance_block(&self, by: u64) {
        self.state.lock().unwrap().block += by;
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

fn uint(v: u64) -> Token {
    Token::Uint(U256::from(v))
}

fn arg_id(method: &Method, data: &[u8]) -> Result<u64, ChainError> {
    let args = method.decode_input(data)?;
    let v = args
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| ChainError::Decode("missing id argument".into()))?;
    Ok(u256_to_u64(v).unwrap_or(u64::MAX))
}

fn legacy_fundraiser_tokens(f: &Fundraiser) -> Vec<Token> {
    vec![
        Token::Address(f.creator),
        Token::Address(f.token),
        Token::Uint(f.goal),
        Token::Uint(f.raised),
        uint(f.end_time),
        Token::Bool(f.is_flexible),
        Token::Bool(f.closure_initiated),
    ]
}

fn modular_fundraiser_tokens(f: &Fundraiser) -> Vec<Token> {
    vec![
        uint(f.id),
        Token::Address(f.creator),
        Token::Address(f.token),
        Token::Uint(f.goal),
        Token::Uint(f.raised),
        uint(f.end_time),
        Token::Bool(f.is_flexible),
        Token::Bool(f.is_suspended),
        Token::Bool(f.closure_initiated),
    ]
}

fn proposal_tokens(p: &Proposal, with_executed: bool) -> Vec<Token> {
    let mut tokens = vec![
        uint(p.id),
        Token::String(p.question.clone()),
        Token::Uint(p.yes_votes),
        Token::Uint(p.no_votes),
        uint(p.end_time),
        Token::Address(p.creator),
        Token::Bool(p.exists),
    ];
    if with_executed {
        tokens.push(Token::Bool(p.executed));
    }
    tokens
}

fn revert(err: ContractError) -> ChainError {
    ChainError::Revert(err)
}

impl MockState {
    fn fundraiser(&self, id: u64) -> Result<&Fundraiser, ChainError> {
        if self.reverting.contains(&id) {
            return Err(revert(ContractError::FundraiserNotFound(id)));
        }
        self.fundraisers
            .get(&id)
            .ok_or(revert(ContractError::FundraiserNotFound(id)))
    }

    fn proposal(&self, id: u64) -> Result<&Proposal, ChainError> {
        if self.reverting.contains(&id) {
            return Err(revert(ContractError::ProposalNotFound(id)));
        }
        self.proposals
            .get(&id)
            .ok_or(revert(ContractError::ProposalNotFound(id)))
    }

    fn handle(&self, to: Address, data: &[u8]) -> Result<Vec<Token>, ChainError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| revert(ContractError::decode(&[])))?;
        let is = |m: &Method| m.selector() == selector;

        match self.layout {
            ContractLayout::Legacy { address } if to == address => {
                let m = abi::legacy::get_fundraiser();
                if is(&m) {
                    return Ok(legacy_fundraiser_tokens(self.fundraiser(arg_id(&m, data)?)?));
                }
                if is(&abi::legacy::get_fundraiser_count()) {
                    return Ok(vec![uint(self.fundraisers.len() as u64)]);
                }
                if is(&abi::legacy::get_all_fundraiser_ids()) {
                    return Ok(vec![Token::Array(self.fundraisers.keys().map(|id| uint(*id)).collect())]);
                }
                if is(&abi::legacy::get_proposal_count()) {
                    return Ok(vec![uint(self.proposals.len() as u64)]);
                }
                let m = abi::legacy::get_proposal();
                if is(&m) {
                    return Ok(proposal_tokens(self.proposal(arg_id(&m, data)?)?, false));
                }
                if is(&abi::legacy::get_all_proposal_ids()) {
                    return Ok(vec![Token::Array(self.proposals.keys().map(|id| uint(*id)).collect())]);
                }
                let m = abi::legacy::is_token_whitelisted();
                if is(&m) {
                    return self.whitelisted(&m, data);
                }
            }
            ContractLayout::Modular { core, .. } if to == core => {
                if is(&abi::modular_core::get_module()) {
                    return Ok(vec![Token::Address(GOVERNANCE)]);
                }
                if is(&abi::modular_core::get_fundraiser_count()) {
                    return Ok(vec![uint(self.fundraisers.len() as u64)]);
                }
                let m = abi::modular_core::get_fundraiser_details();
                if is(&m) {
                    return Ok(modular_fundraiser_tokens(self.fundraiser(arg_id(&m, data)?)?));
                }
                let m = abi::modular_core::get_fundraiser_progress();
                if is(&m) {
                    let f = self.fundraiser(arg_id(&m, data)?)?;
                    return Ok(vec![
                        Token::Uint(f.raised),
                        Token::Uint(f.goal),
                        uint(u64::from(f.progress_percent())),
                        uint(f.id),
                        uint(1_000),
                    ]);
                }
                if is(&abi::modular_core::get_platform_stats()) {
                    let total_raised = self
                        .fundraisers
                        .values()
                        .fold(U256::zero(), |acc, f| acc + f.raised);
                    return Ok(vec![
                        uint(self.fundraisers.len() as u64),
                        uint(self.fundraisers.values().filter(|f| !f.is_suspended).count() as u64),
                        uint(self.proposals.len() as u64),
                        Token::Uint(total_raised),
                    ]);
                }
                if is(&abi::modular_core::get_user_status()) {
                    return Ok(vec![Token::Bool(true), Token::Bool(false), uint(0), uint(0)]);
                }
                let m = abi::modular_core::is_token_whitelisted();
                if is(&m) {
                    return self.whitelisted(&m, data);
                }
            }
            ContractLayout::Modular { .. } if to == GOVERNANCE => {
                if is(&abi::governance::get_proposal_count()) {
                    return Ok(vec![uint(self.proposals.len() as u64)]);
                }
                let m = abi::governance::get_proposal();
                if is(&m) {
                    return Ok(proposal_tokens(self.proposal(arg_id(&m, data)?)?, true));
                }
                let m = abi::governance::get_proposals();
                if is(&m) {
                    let args = m.decode_input(data)?;
                    let mut nums = args.into_iter().filter_map(Token::into_uint);
                    let offset = nums.next().unwrap_or_default().as_usize();
                    let limit = nums.next().unwrap_or_default().as_usize();
                    let page = self
                        .proposals
                        .values()
                        .skip(offset)
                        .take(limit)
                        .map(|p| Token::Tuple(proposal_tokens(p, true)))
                        .collect();
                    return Ok(vec![Token::Array(page)]);
                }
            }
            _ => {}
        }

        Err(revert(ContractError::decode(&[])))
    }

    fn whitelisted(&self, m: &Method, data: &[u8]) -> Result<Vec<Token>, ChainError> {
        let token = m
            .decode_input(data)?
            .into_iter()
            .next()
            .and_then(Token::into_address)
            .ok_or_else(|| ChainError::Decode("missing token argument".into()))?;
        Ok(vec![Token::Bool(self.whitelist.contains(&token))])
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let s = self.state.lock().unwrap();
        if s.offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(s.block)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let mut s = self.state.lock().unwrap();
        s.calls += 1;
        if s.offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        let tokens = s.handle(to, &data)?;
        Ok(Bytes::from(ethabi::encode(&tokens)))
    }
}
