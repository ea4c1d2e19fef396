//! State-changing calls: fundraiser creation, donations, votes, proposals.
//!
//! Calls are built as `(target, calldata)` pairs so they can be simulated
//! with `eth_call` before being sent. On the modular layout every write
//! goes to the Router; module calls are wrapped in `routeModule`.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Log, TransactionRequest, H256, U256};
use polifund_shared::constants::{FUNDRAISING_MODULE, GOVERNANCE_MODULE};
use tracing::{debug, info};

use crate::abi::{self, u256_to_u64, Method};
use crate::contracts::Contracts;
use crate::error::ChainError;
use crate::layout::ContractLayout;
use crate::provider::{classify_error, EthersReader};
use crate::revert::ContractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFundraiserParams {
    pub token: Address,
    /// Goal in token base units; zero for flexible campaigns without a goal.
    pub goal: U256,
    pub duration_secs: u64,
    pub is_flexible: bool,
}

/// A mined transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

/// Everything the campaign creation flow needs from the chain.
#[async_trait]
pub trait FundraiserWriter: Send + Sync {
    async fn is_token_whitelisted(&self, token: Address) -> Result<bool, ChainError>;

    /// Dry-run the creation call; a revert comes back decoded.
    async fn simulate_create(&self, params: &CreateFundraiserParams) -> Result<(), ChainError>;

    /// Send the creation transaction and wait for its receipt.
    async fn send_create(&self, params: &CreateFundraiserParams) -> Result<TxOutcome, ChainError>;
}

fn routed(module: &str, inner: Bytes) -> Bytes {
    abi::router::route_module().encode(&[
        Token::FixedBytes(abi::module_key(module).as_bytes().to_vec()),
        Token::Bytes(inner.to_vec()),
    ])
}

fn module_call(layout: ContractLayout, module: &str, method: Method, args: &[Token]) -> (Address, Bytes) {
    let data = method.encode(args);
    match layout {
        ContractLayout::Legacy { address } => (address, data),
        ContractLayout::Modular { router, .. } => (router, routed(module, data)),
    }
}

pub fn create_fundraiser_call(layout: ContractLayout, params: &CreateFundraiserParams) -> (Address, Bytes) {
    let fields = vec![
        Token::Address(params.token),
        Token::Uint(params.goal),
        Token::Uint(U256::from(params.duration_secs)),
        Token::Bool(params.is_flexible),
    ];
    match layout {
        ContractLayout::Legacy { address } => (address, abi::legacy::create_fundraiser().encode(&fields)),
        ContractLayout::Modular { router, .. } => (
            router,
            abi::router::create_fundraiser().encode(&[Token::Tuple(fields)]),
        ),
    }
}

pub fn donate_call(layout: ContractLayout, fundraiser_id: u64, amount: U256) -> (Address, Bytes) {
    module_call(
        layout,
        FUNDRAISING_MODULE,
        abi::legacy::donate(),
        &[Token::Uint(U256::from(fundraiser_id)), Token::Uint(amount)],
    )
}

pub fn vote_call(layout: ContractLayout, proposal_id: u64, support: bool) -> (Address, Bytes) {
    let method = match layout {
        ContractLayout::Legacy { .. } => abi::legacy::vote(),
        ContractLayout::Modular { .. } => abi::governance::vote(),
    };
    module_call(
        layout,
        GOVERNANCE_MODULE,
        method,
        &[Token::Uint(U256::from(proposal_id)), Token::Bool(support)],
    )
}

pub fn create_proposal_call(layout: ContractLayout, question: &str, duration_secs: u64) -> (Address, Bytes) {
    let method = match layout {
        ContractLayout::Legacy { .. } => abi::legacy::create_proposal(),
        ContractLayout::Modular { .. } => abi::governance::create_proposal(),
    };
    module_call(
        layout,
        GOVERNANCE_MODULE,
        method,
        &[
            Token::String(question.to_string()),
            Token::Uint(U256::from(duration_secs)),
        ],
    )
}

/// Id of the campaign created in a transaction, read from the first
/// `FundraiserCreated` event (the id is the first indexed topic).
pub fn parse_created_id(logs: &[Log]) -> Option<u64> {
    let topic = abi::fundraiser_created_topic();
    logs.iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .find_map(|log| {
            let id = log.topics.get(1)?;
            u256_to_u64(U256::from_big_endian(id.as_bytes()))
        })
}

/// [`FundraiserWriter`] over an ethers middleware holding the signer.
pub struct EthersWriter<M> {
    client: Arc<M>,
    contracts: Contracts,
}

impl<M: Middleware + 'static> EthersWriter<M> {
    pub fn new(client: Arc<M>, layout: ContractLayout) -> Self {
        let reader = Arc::new(EthersReader::new(client.clone()));
        Self {
            contracts: Contracts::new(reader, layout),
            client,
        }
    }

    pub fn layout(&self) -> ContractLayout {
        self.contracts.layout()
    }

    fn request(&self, (to, data): (Address, Bytes)) -> TypedTransaction {
        let mut tx = TransactionRequest::new().to(to).data(data);
        if let Some(from) = self.client.default_sender() {
            tx = tx.from(from);
        }
        tx.into()
    }

    async fn simulate(&self, call: (Address, Bytes)) -> Result<(), ChainError> {
        let tx = self.request(call);
        self.client.call(&tx, None).await.map_err(classify_error)?;
        Ok(())
    }

    /// Send a call and wait for it to be mined. A receipt with failed
    /// status is reported as a revert.
    pub async fn send(&self, call: (Address, Bytes)) -> Result<TxOutcome, ChainError> {
        let tx = self.request(call);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(classify_error)?;
        let tx_hash = pending.tx_hash();
        debug!(?tx_hash, "Transaction submitted");

        let receipt = pending
            .await
            .map_err(classify_error)?
            .ok_or_else(|| ChainError::Transport(format!("transaction {tx_hash:?} was dropped")))?;

        if receipt.status.is_some_and(|s| s.is_zero()) {
            return Err(ChainError::Revert(ContractError::Unknown { data: Bytes::new() }));
        }

        let block_number = receipt.block_number.map(|n| n.as_u64());
        info!(?tx_hash, ?block_number, "Transaction mined");
        Ok(TxOutcome {
            tx_hash,
            block_number,
            logs: receipt.logs,
        })
    }

    pub async fn donate(&self, fundraiser_id: u64, amount: U256) -> Result<TxOutcome, ChainError> {
        self.send(donate_call(self.layout(), fundraiser_id, amount)).await
    }

    pub async fn vote(&self, proposal_id: u64, support: bool) -> Result<TxOutcome, ChainError> {
        self.send(vote_call(self.layout(), proposal_id, support)).await
    }

    pub async fn create_proposal(&self, question: &str, duration_secs: u64) -> Result<TxOutcome, ChainError> {
        self.send(create_proposal_call(self.layout(), question, duration_secs))
            .await
    }
}

#[async_trait]
impl<M: Middleware + 'static> FundraiserWriter for EthersWriter<M> {
    async fn is_token_whitelisted(&self, token: Address) -> Result<bool, ChainError> {
        self.contracts.is_token_whitelisted(token).await
    }

    async fn simulate_create(&self, params: &CreateFundraiserParams) -> Result<(), ChainError> {
        self.simulate(create_fundraiser_call(self.layout(), params)).await
    }

    async fn send_create(&self, params: &CreateFundraiserParams) -> Result<TxOutcome, ChainError> {
        self.send(create_fundraiser_call(self.layout(), params)).await
    }
}
