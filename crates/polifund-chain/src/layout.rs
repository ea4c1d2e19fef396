use ethers::types::Address;
use serde::Serialize;

/// Which contract family the platform is deployed as.
///
/// The legacy layout is a single monolithic contract. The modular layout
/// keeps fundraiser state in Core, dispatches writes through Router and
/// keeps proposals in a governance module registered in Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ContractLayout {
    Legacy { address: Address },
    Modular { core: Address, router: Address },
}

impl ContractLayout {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy { .. } => "legacy",
            Self::Modular { .. } => "modular",
        }
    }

    /// Contract holding fundraiser state.
    pub fn fundraiser_contract(&self) -> Address {
        match self {
            Self::Legacy { address } => *address,
            Self::Modular { core, .. } => *core,
        }
    }

    /// Contract receiving state-changing calls.
    pub fn write_target(&self) -> Address {
        match self {
            Self::Legacy { address } => *address,
            Self::Modular { router, .. } => *router,
        }
    }
}
