//! Revert data decoding.
//!
//! Revert payloads are decoded once, by 4-byte selector, into
//! [`ContractError`]. Turning a variant into text for the user is a
//! separate step ([`ContractError::user_message`]).

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use polifund_shared::Lang;
use thiserror::Error;

use crate::abi::u256_to_u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// `Error(string)` from `require(cond, "reason")`.
    #[error("{0}")]
    Message(String),

    /// `Panic(uint256)` from failed asserts, overflow, etc.
    #[error("panic code {0:#x}")]
    Panic(u64),

    #[error("token {0:?} is not whitelisted")]
    NotWhitelisted(Address),

    #[error("invalid goal amount")]
    InvalidGoal,

    #[error("invalid duration")]
    InvalidDuration,

    #[error("fundraiser {0} not found")]
    FundraiserNotFound(u64),

    #[error("fundraiser {0} has ended")]
    FundraiserEnded(u64),

    #[error("fundraiser {0} is suspended")]
    FundraiserSuspended(u64),

    #[error("proposal {0} not found")]
    ProposalNotFound(u64),

    #[error("{voter:?} already voted on proposal {proposal}")]
    AlreadyVoted { voter: Address, proposal: u64 },

    #[error("voting on proposal {0} has ended")]
    VotingEnded(u64),

    #[error("insufficient allowance: required {required}, available {available}")]
    InsufficientAllowance { required: U256, available: U256 },

    #[error("caller {0:?} is not authorized")]
    Unauthorized(Address),

    #[error("contract is paused")]
    ContractPaused,

    /// Empty revert data or a selector this crate does not know.
    #[error("unrecognized revert (0x{})", hex::encode(.data))]
    Unknown { data: Bytes },
}

/// (name, parameter types) of every revert shape the platform contracts emit.
fn signatures() -> Vec<(&'static str, Vec<ParamType>)> {
    let uint = || ParamType::Uint(256);
    vec![
        ("Error", vec![ParamType::String]),
        ("Panic", vec![uint()]),
        ("NotWhitelisted", vec![ParamType::Address]),
        ("InvalidGoal", vec![]),
        ("InvalidDuration", vec![]),
        ("FundraiserNotFound", vec![uint()]),
        ("FundraiserEnded", vec![uint()]),
        ("FundraiserSuspended", vec![uint()]),
        ("ProposalNotFound", vec![uint()]),
        ("AlreadyVoted", vec![ParamType::Address, uint()]),
        ("VotingEnded", vec![uint()]),
        ("InsufficientAllowance", vec![uint(), uint()]),
        ("Unauthorized", vec![ParamType::Address]),
        ("ContractPaused", vec![]),
    ]
}

impl ContractError {
    /// Decode raw revert data.
    pub fn decode(data: &[u8]) -> Self {
        let unknown = || Self::Unknown {
            data: Bytes::from(data.to_vec()),
        };
        if data.len() < 4 {
            return unknown();
        }

        let (selector, payload) = data.split_at(4);
        for (name, params) in signatures() {
            if abi::short_signature(name, &params) != selector {
                continue;
            }
            return match abi::decode(&params, payload) {
                Ok(tokens) => Self::from_tokens(name, tokens).unwrap_or_else(unknown),
                Err(_) => unknown(),
            };
        }
        unknown()
    }

    fn from_tokens(name: &str, tokens: Vec<Token>) -> Option<Self> {
        let mut it = tokens.into_iter();
        let mut next = || it.next();
        let id = |t: Option<Token>| {
            t.and_then(Token::into_uint)
                .map(|v| u256_to_u64(v).unwrap_or(u64::MAX))
        };
        let addr = |t: Option<Token>| t.and_then(Token::into_address);

        Some(match name {
            "Error" => Self::Message(next()?.into_string()?),
            "Panic" => Self::Panic(id(next())?),
            "NotWhitelisted" => Self::NotWhitelisted(addr(next())?),
            "InvalidGoal" => Self::InvalidGoal,
            "InvalidDuration" => Self::InvalidDuration,
            "FundraiserNotFound" => Self::FundraiserNotFound(id(next())?),
            "FundraiserEnded" => Self::FundraiserEnded(id(next())?),
            "FundraiserSuspended" => Self::FundraiserSuspended(id(next())?),
            "ProposalNotFound" => Self::ProposalNotFound(id(next())?),
            "AlreadyVoted" => Self::AlreadyVoted {
                voter: addr(next())?,
                proposal: id(next())?,
            },
            "VotingEnded" => Self::VotingEnded(id(next())?),
            "InsufficientAllowance" => Self::InsufficientAllowance {
                required: next()?.into_uint()?,
                available: next()?.into_uint()?,
            },
            "Unauthorized" => Self::Unauthorized(addr(next())?),
            "ContractPaused" => Self::ContractPaused,
            _ => return None,
        })
    }

    /// Encode this error as revert data (selector + arguments).
    pub fn encode(&self) -> Bytes {
        let uint = |v: u64| Token::Uint(U256::from(v));
        let (name, args): (&str, Vec<Token>) = match self {
            Self::Message(msg) => ("Error", vec![Token::String(msg.clone())]),
            Self::Panic(code) => ("Panic", vec![uint(*code)]),
            Self::NotWhitelisted(token) => ("NotWhitelisted", vec![Token::Address(*token)]),
            Self::InvalidGoal => ("InvalidGoal", vec![]),
            Self::InvalidDuration => ("InvalidDuration", vec![]),
            Self::FundraiserNotFound(id) => ("FundraiserNotFound", vec![uint(*id)]),
            Self::FundraiserEnded(id) => ("FundraiserEnded", vec![uint(*id)]),
            Self::FundraiserSuspended(id) => ("FundraiserSuspended", vec![uint(*id)]),
            Self::ProposalNotFound(id) => ("ProposalNotFound", vec![uint(*id)]),
            Self::AlreadyVoted { voter, proposal } => (
                "AlreadyVoted",
                vec![Token::Address(*voter), uint(*proposal)],
            ),
            Self::VotingEnded(id) => ("VotingEnded", vec![uint(*id)]),
            Self::InsufficientAllowance {
                required,
                available,
            } => (
                "InsufficientAllowance",
                vec![Token::Uint(*required), Token::Uint(*available)],
            ),
            Self::Unauthorized(caller) => ("Unauthorized", vec![Token::Address(*caller)]),
            Self::ContractPaused => ("ContractPaused", vec![]),
            Self::Unknown { data } => return data.clone(),
        };

        let params: Vec<ParamType> = signatures()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
            .unwrap_or_default();
        let mut out = abi::short_signature(name, &params).to_vec();
        out.extend(abi::encode(&args));
        out.into()
    }

    /// Text shown to the user when a transaction or read fails with this error.
    pub fn user_message(&self, lang: Lang) -> String {
        match self {
            Self::Message(msg) => match lang {
                Lang::Pl => format!("Kontrakt odrzucił operację: {msg}"),
                Lang::En => format!("The contract rejected the operation: {msg}"),
            },
            Self::Panic(_) => lang
                .pick(
                    "Wystąpił błąd wewnętrzny kontraktu",
                    "The contract hit an internal error",
                )
                .into(),
            Self::NotWhitelisted(_) => lang
                .pick(
                    "Wybrany token nie jest dozwolony na platformie",
                    "The selected token is not allowed on the platform",
                )
                .into(),
            Self::InvalidGoal => lang
                .pick("Nieprawidłowy cel zbiórki", "Invalid fundraising goal")
                .into(),
            Self::InvalidDuration => lang
                .pick("Nieprawidłowy czas trwania zbiórki", "Invalid fundraiser duration")
                .into(),
            Self::FundraiserNotFound(_) => lang
                .pick("Zbiórka nie istnieje", "Fundraiser does not exist")
                .into(),
            Self::FundraiserEnded(_) => lang
                .pick("Zbiórka została zakończona", "The fundraiser has ended")
                .into(),
            Self::FundraiserSuspended(_) => lang
                .pick("Zbiórka jest zawieszona", "The fundraiser is suspended")
                .into(),
            Self::ProposalNotFound(_) => lang
                .pick("Propozycja nie istnieje", "Proposal does not exist")
                .into(),
            Self::AlreadyVoted { .. } => lang
                .pick(
                    "Już oddałeś głos w tym głosowaniu",
                    "You have already voted on this proposal",
                )
                .into(),
            Self::VotingEnded(_) => lang
                .pick("Głosowanie zostało zakończone", "Voting has ended")
                .into(),
            Self::InsufficientAllowance { .. } => lang
                .pick(
                    "Niewystarczająca zgoda na wydatkowanie tokenów. Zatwierdź najpierw kwotę",
                    "Insufficient token allowance. Approve the amount first",
                )
                .into(),
            Self::Unauthorized(_) => lang
                .pick(
                    "Brak uprawnień do wykonania tej operacji",
                    "You are not authorized to perform this operation",
                )
                .into(),
            Self::ContractPaused => lang
                .pick(
                    "Platforma jest tymczasowo wstrzymana",
                    "The platform is temporarily paused",
                )
                .into(),
            Self::Unknown { .. } => lang
                .pick(
                    "Transakcja została odrzucona przez kontrakt",
                    "The transaction was rejected by the contract",
                )
                .into(),
        }
    }
}
