//! Protobuf messages of the Cosmos `peggy` module.
//!
//! Only the messages the orchestrator broadcasts are defined. Field tags
//! follow the module's `msgs.proto`; integer amounts (`sdk.Int`) travel as
//! decimal strings.

use cosmrs::Any;
use prost::Message;

/// Protobuf package of the bridge module's messages.
pub const MSG_TYPE_PREFIX: &str = "/peggy.v1.";

/// A message that can be packed into a Cosmos transaction body.
pub trait GravityMsg: Message + Sized {
    /// Short protobuf name, e.g. `MsgValsetConfirm`.
    const NAME: &'static str;

    fn type_url() -> String {
        format!("{}{}", MSG_TYPE_PREFIX, Self::NAME)
    }

    fn to_any(&self) -> Any {
        Any {
            type_url: Self::type_url(),
            value: self.encode_to_vec(),
        }
    }
}

macro_rules! gravity_msg {
    ($ty:ident) => {
        impl GravityMsg for $ty {
            const NAME: &'static str = stringify!($ty);
        }
    };
}

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct BridgeValidator {
    #[prost(uint64, tag = "1")]
    pub power: u64,
    #[prost(string, tag = "2")]
    pub ethereum_address: String,
}

/// Binds an orchestrator account and Ethereum key to a validator.
#[derive(Clone, PartialEq, Message)]
pub struct MsgSetOrchestratorAddresses {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetConfirm {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub orchestrator: String,
    #[prost(string, tag = "3")]
    pub eth_address: String,
    #[prost(string, tag = "4")]
    pub signature: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSendToEth {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub eth_dest: String,
    #[prost(message, optional, tag = "3")]
    pub amount: Option<Coin>,
    #[prost(message, optional, tag = "4")]
    pub bridge_fee: Option<Coin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgRequestBatch {
    #[prost(string, tag = "1")]
    pub orchestrator: String,
    #[prost(string, tag = "2")]
    pub denom: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgConfirmBatch {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub token_contract: String,
    #[prost(string, tag = "3")]
    pub eth_signer: String,
    #[prost(string, tag = "4")]
    pub orchestrator: String,
    #[prost(string, tag = "5")]
    pub signature: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDepositClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub token_contract: String,
    #[prost(string, tag = "4")]
    pub amount: String,
    #[prost(string, tag = "5")]
    pub ethereum_sender: String,
    #[prost(string, tag = "6")]
    pub cosmos_receiver: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgWithdrawClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(uint64, tag = "3")]
    pub batch_nonce: u64,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub orchestrator: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgERC20DeployedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub block_height: u64,
    #[prost(string, tag = "3")]
    pub cosmos_denom: String,
    #[prost(string, tag = "4")]
    pub token_contract: String,
    #[prost(string, tag = "5")]
    pub name: String,
    #[prost(string, tag = "6")]
    pub symbol: String,
    #[prost(uint64, tag = "7")]
    pub decimals: u64,
    #[prost(string, tag = "8")]
    pub orchestrator: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgValsetUpdatedClaim {
    #[prost(uint64, tag = "1")]
    pub event_nonce: u64,
    #[prost(uint64, tag = "2")]
    pub valset_nonce: u64,
    #[prost(uint64, tag = "3")]
    pub block_height: u64,
    #[prost(message, repeated, tag = "4")]
    pub members: Vec<BridgeValidator>,
    #[prost(string, tag = "5")]
    pub reward_amount: String,
    #[prost(string, tag = "6")]
    pub reward_token: String,
    #[prost(string, tag = "7")]
    pub orchestrator: String,
}

gravity_msg!(MsgSetOrchestratorAddresses);
gravity_msg!(MsgValsetConfirm);
gravity_msg!(MsgSendToEth);
gravity_msg!(MsgRequestBatch);
gravity_msg!(MsgConfirmBatch);
gravity_msg!(MsgDepositClaim);
gravity_msg!(MsgWithdrawClaim);
gravity_msg!(MsgERC20DeployedClaim);
gravity_msg!(MsgValsetUpdatedClaim);
