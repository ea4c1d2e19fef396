//! Contract method descriptors and the token reader used to decode their
//! return values.
//!
//! Two ABI families are consumed: the legacy monolithic PoliDAO contract
//! and the modular Core / Router / Governance contracts. Only the methods
//! this crate calls are described.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

use crate::error::ChainError;

/// A contract method: name plus input and output parameter types.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: &'static str,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
}

impl Method {
    fn new(name: &'static str, inputs: Vec<ParamType>, outputs: Vec<ParamType>) -> Self {
        Self {
            name,
            inputs,
            outputs,
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        abi::short_signature(self.name, &self.inputs)
    }

    /// Build calldata: selector followed by the ABI-encoded arguments.
    pub fn encode(&self, args: &[Token]) -> Bytes {
        let mut data = self.selector().to_vec();
        data.extend(abi::encode(args));
        data.into()
    }

    /// Decode calldata produced by [`Method::encode`].
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<Token>, ChainError> {
        if calldata.len() < 4 || calldata[..4] != self.selector() {
            return Err(ChainError::Decode(format!(
                "calldata does not target {}",
                self.name
            )));
        }
        abi::decode(&self.inputs, &calldata[4..])
            .map_err(|e| ChainError::Decode(format!("{} input: {e}", self.name)))
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<TokenReader, ChainError> {
        let tokens = abi::decode(&self.outputs, data)
            .map_err(|e| ChainError::Decode(format!("{} output: {e}", self.name)))?;
        Ok(TokenReader::new(self.name, tokens))
    }
}

/// keccak256 of a module name, the key used by Core and Router.
pub fn module_key(name: &str) -> H256 {
    H256::from(keccak256(name.as_bytes()))
}

fn uint() -> ParamType {
    ParamType::Uint(256)
}

fn fundraiser_fields() -> Vec<ParamType> {
    vec![
        uint(),             // id
        ParamType::Address, // creator
        ParamType::Address, // token
        uint(),             // goalAmount
        uint(),             // raisedAmount
        uint(),             // endDate
        ParamType::Bool,    // isFlexible
        ParamType::Bool,    // isSuspended
        ParamType::Bool,    // closureInitiated
    ]
}

fn proposal_fields(with_executed: bool) -> Vec<ParamType> {
    let mut fields = vec![
        uint(),             // id
        ParamType::String,  // question
        uint(),             // yesVotes
        uint(),             // noVotes
        uint(),             // endTime
        ParamType::Address, // creator
        ParamType::Bool,    // exists
    ];
    if with_executed {
        fields.push(ParamType::Bool);
    }
    fields
}

// ---------------------------------------------------------------------------
// Legacy monolithic contract
// ---------------------------------------------------------------------------

pub mod legacy {
    use super::*;

    pub fn get_fundraiser_count() -> Method {
        Method::new("getFundraiserCount", vec![], vec![uint()])
    }

    /// Returns (creator, token, target, raised, endTime, isFlexible, closureInitiated).
    pub fn get_fundraiser() -> Method {
        Method::new(
            "getFundraiser",
            vec![uint()],
            vec![
                ParamType::Address,
                ParamType::Address,
                uint(),
                uint(),
                uint(),
                ParamType::Bool,
                ParamType::Bool,
            ],
        )
    }

    pub fn get_all_fundraiser_ids() -> Method {
        Method::new(
            "getAllFundraiserIds",
            vec![],
            vec![ParamType::Array(Box::new(uint()))],
        )
    }

    pub fn get_proposal_count() -> Method {
        Method::new("getProposalCount", vec![], vec![uint()])
    }

    pub fn get_proposal() -> Method {
        Method::new("getProposal", vec![uint()], proposal_fields(false))
    }

    pub fn get_all_proposal_ids() -> Method {
        Method::new(
            "getAllProposalIds",
            vec![],
            vec![ParamType::Array(Box::new(uint()))],
        )
    }

    pub fn is_token_whitelisted() -> Method {
        Method::new("isTokenWhitelisted", vec![ParamType::Address], vec![ParamType::Bool])
    }

    pub fn create_fundraiser() -> Method {
        Method::new(
            "createFundraiser",
            vec![ParamType::Address, uint(), uint(), ParamType::Bool],
            vec![uint()],
        )
    }

    pub fn donate() -> Method {
        Method::new("donate", vec![uint(), uint()], vec![])
    }

    pub fn vote() -> Method {
        Method::new("vote", vec![uint(), ParamType::Bool], vec![])
    }

    pub fn create_proposal() -> Method {
        Method::new("createProposal", vec![ParamType::String, uint()], vec![uint()])
    }
}

// ---------------------------------------------------------------------------
// Modular Core contract
// ---------------------------------------------------------------------------

pub mod modular_core {
    use super::*;

    pub fn get_module() -> Method {
        Method::new("getModule", vec![ParamType::FixedBytes(32)], vec![ParamType::Address])
    }

    pub fn get_fundraiser_count() -> Method {
        Method::new("getFundraiserCount", vec![], vec![uint()])
    }

    pub fn get_fundraiser_details() -> Method {
        Method::new("getFundraiserDetails", vec![uint()], fundraiser_fields())
    }

    /// Returns (raised, goal, percentage, donorsCount, timeLeft).
    pub fn get_fundraiser_progress() -> Method {
        Method::new(
            "getFundraiserProgress",
            vec![uint()],
            vec![uint(), uint(), uint(), uint(), uint()],
        )
    }

    /// Returns (totalFundraisers, activeFundraisers, totalProposals, totalDonations).
    pub fn get_platform_stats() -> Method {
        Method::new("getPlatformStats", vec![], vec![uint(), uint(), uint(), uint()])
    }

    /// Returns (canCreate, isSuspended, fundraisersCreated, donationsCount).
    pub fn get_user_status() -> Method {
        Method::new(
            "getUserStatus",
            vec![ParamType::Address],
            vec![ParamType::Bool, ParamType::Bool, uint(), uint()],
        )
    }

    pub fn is_token_whitelisted() -> Method {
        Method::new("isTokenWhitelisted", vec![ParamType::Address], vec![ParamType::Bool])
    }
}

// ---------------------------------------------------------------------------
// Modular Router contract
// ---------------------------------------------------------------------------

pub mod router {
    use super::*;

    /// `createFundraiser((address token, uint256 goalAmount, uint256 duration, bool isFlexible))`
    pub fn create_fundraiser() -> Method {
        Method::new(
            "createFundraiser",
            vec![ParamType::Tuple(vec![
                ParamType::Address,
                uint(),
                uint(),
                ParamType::Bool,
            ])],
            vec![uint()],
        )
    }

    /// Forward `data` to the module registered under `key`.
    pub fn route_module() -> Method {
        Method::new(
            "routeModule",
            vec![ParamType::FixedBytes(32), ParamType::Bytes],
            vec![ParamType::Bytes],
        )
    }
}

// ---------------------------------------------------------------------------
// Modular Governance module
// ---------------------------------------------------------------------------

pub mod governance {
    use super::*;

    pub fn get_proposal_count() -> Method {
        Method::new("getProposalCount", vec![], vec![uint()])
    }

    pub fn get_proposal() -> Method {
        Method::new("getProposal", vec![uint()], proposal_fields(true))
    }

    pub fn get_proposals() -> Method {
        Method::new(
            "getProposals",
            vec![uint(), uint()],
            vec![ParamType::Array(Box::new(ParamType::Tuple(proposal_fields(true))))],
        )
    }

    pub fn vote() -> Method {
        Method::new("vote", vec![uint(), ParamType::Bool], vec![])
    }

    pub fn create_proposal() -> Method {
        Method::new("createProposal", vec![ParamType::String, uint()], vec![uint()])
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// topic0 of `FundraiserCreated(uint256 indexed id, address indexed creator, address token, uint256 goal)`.
pub fn fundraiser_created_topic() -> H256 {
    H256::from(keccak256(
        "FundraiserCreated(uint256,address,address,uint256)".as_bytes(),
    ))
}

// ---------------------------------------------------------------------------
// Token reader
// ---------------------------------------------------------------------------

/// Sequential typed access to decoded return values.
#[derive(Debug)]
pub struct TokenReader {
    method: &'static str,
    tokens: std::vec::IntoIter<Token>,
}

impl TokenReader {
    pub fn new(method: &'static str, tokens: Vec<Token>) -> Self {
        Self {
            method,
            tokens: tokens.into_iter(),
        }
    }

    fn next(&mut self, expected: &str) -> Result<Token, ChainError> {
        self.tokens.next().ok_or_else(|| {
            ChainError::Decode(format!("{}: missing {expected} value", self.method))
        })
    }

    fn mismatch(&self, expected: &str, got: &Token) -> ChainError {
        ChainError::Decode(format!("{}: expected {expected}, got {got:?}", self.method))
    }

    pub fn uint(&mut self) -> Result<U256, ChainError> {
        let token = self.next("uint")?;
        match token {
            Token::Uint(v) => Ok(v),
            other => Err(self.mismatch("uint", &other)),
        }
    }

    /// A uint that must fit in 64 bits (ids, timestamps, counters).
    pub fn u64(&mut self) -> Result<u64, ChainError> {
        let v = self.uint()?;
        u256_to_u64(v).ok_or_else(|| {
            ChainError::Decode(format!("{}: value {v} does not fit in u64", self.method))
        })
    }

    pub fn address(&mut self) -> Result<Address, ChainError> {
        let token = self.next("address")?;
        match token {
            Token::Address(a) => Ok(a),
            other => Err(self.mismatch("address", &other)),
        }
    }

    pub fn bool(&mut self) -> Result<bool, ChainError> {
        let token = self.next("bool")?;
        match token {
            Token::Bool(b) => Ok(b),
            other => Err(self.mismatch("bool", &other)),
        }
    }

    pub fn string(&mut self) -> Result<String, ChainError> {
        let token = self.next("string")?;
        match token {
            Token::String(s) => Ok(s),
            other => Err(self.mismatch("string", &other)),
        }
    }

    pub fn u64_array(&mut self) -> Result<Vec<u64>, ChainError> {
        let token = self.next("uint[]")?;
        let Token::Array(items) = token else {
            return Err(self.mismatch("uint[]", &token));
        };
        items
            .into_iter()
            .map(|item| match item {
                Token::Uint(v) => u256_to_u64(v).ok_or_else(|| {
                    ChainError::Decode(format!("{}: id {v} does not fit in u64", self.method))
                }),
                other => Err(self.mismatch("uint", &other)),
            })
            .collect()
    }

    /// Each element of a tuple array as its own reader.
    pub fn tuple_array(&mut self) -> Result<Vec<TokenReader>, ChainError> {
        let token = self.next("tuple[]")?;
        let Token::Array(items) = token else {
            return Err(self.mismatch("tuple[]", &token));
        };
        items
            .into_iter()
            .map(|item| match item {
                Token::Tuple(fields) => Ok(TokenReader::new(self.method, fields)),
                other => Err(self.mismatch("tuple", &other)),
            })
            .collect()
    }
}

pub fn u256_to_u64(v: U256) -> Option<u64> {
    if v > U256::from(u64::MAX) {
        None
    } else {
        Some(v.as_u64())
    }
}
