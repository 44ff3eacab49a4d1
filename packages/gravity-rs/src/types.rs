//! Bridge data model as reported by the Cosmos `peggy` module.
//!
//! Numbers arrive as JSON strings (`"nonce": "5"`) from the REST gateway and
//! as plain numbers from hand-written fixtures; both are accepted. Addresses
//! and amounts stay in their string form here and are parsed at the point
//! where they are ABI-encoded, so that a malformed chain value surfaces as an
//! [`GravityError::Encoding`](crate::GravityError) instead of a decode failure.

use serde::{Deserialize, Serialize};

use crate::error::GravityError;
use crate::hash::parse_amount;

/// One bridge validator: an Ethereum signing address and its voting power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeValidator {
    #[serde(with = "string_u64")]
    pub power: u64,
    pub ethereum_address: String,
}

/// A nonce-versioned validator set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valset {
    #[serde(with = "string_u64")]
    pub nonce: u64,
    pub members: Vec<BridgeValidator>,
    #[serde(default, with = "string_u64")]
    pub height: u64,
    #[serde(default)]
    pub reward_amount: String,
    #[serde(default)]
    pub reward_token: String,
}

impl Valset {
    /// Sum of all member powers.
    pub fn total_power(&self) -> u128 {
        self.members.iter().map(|m| m.power as u128).sum()
    }
}

/// An ERC20 amount tagged with its token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Token {
    pub contract: String,
    pub amount: String,
}

/// A single transfer inside an outgoing batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransferTx {
    #[serde(default, with = "string_u64")]
    pub id: u64,
    #[serde(default)]
    pub sender: String,
    pub dest_address: String,
    pub erc20_token: Erc20Token,
    pub erc20_fee: Erc20Token,
}

/// A token-scoped batch of outgoing transfers awaiting relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTxBatch {
    #[serde(with = "string_u64")]
    pub batch_nonce: u64,
    #[serde(with = "string_u64")]
    pub batch_timeout: u64,
    pub transactions: Vec<OutgoingTransferTx>,
    pub token_contract: String,
    /// Cosmos block height at which the batch was created.
    #[serde(default, with = "string_u64")]
    pub block: u64,
}

impl OutgoingTxBatch {
    /// Sum of all per-transfer fees, in the token's base units.
    pub fn total_fee(&self) -> Result<alloy::primitives::U256, GravityError> {
        self.transactions
            .iter()
            .try_fold(alloy::primitives::U256::ZERO, |acc, tx| {
                Ok(acc.saturating_add(parse_amount(&tx.erc20_fee.amount)?))
            })
    }
}

/// A validator's signature over a valset checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetConfirm {
    #[serde(with = "string_u64")]
    pub nonce: u64,
    pub orchestrator: String,
    pub eth_address: String,
    pub signature: String,
}

/// A validator's signature over a batch checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfirm {
    #[serde(with = "string_u64")]
    pub nonce: u64,
    pub token_contract: String,
    pub eth_signer: String,
    pub orchestrator: String,
    pub signature: String,
}

/// Serde adapter for `u64` fields that may be encoded as JSON strings.
pub mod string_u64 {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StrOrNum::deserialize(deserializer)? {
            StrOrNum::Num(n) => Ok(n),
            StrOrNum::Str(s) if s.is_empty() => Ok(0),
            StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
