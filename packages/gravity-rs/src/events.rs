//! Gravity contract event parsing
//!
//! Every bridge event carries an `_eventNonce` drawn from one global sequence
//! across all four kinds. The Cosmos chain accepts claims only in that order,
//! so the watcher merges per-kind log queries into a single nonce-sorted
//! stream of [`BridgeEvent`]s.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use serde::{Deserialize, Serialize};

use crate::contracts::Gravity;
use crate::error::GravityError;
use crate::types::{BridgeValidator, Valset};

/// Tokens locked on the EVM side for a Cosmos recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub token_contract: Address,
    pub sender: Address,
    /// Cosmos recipient; the account bytes are the first 20 bytes.
    pub destination: B256,
    pub amount: U256,
}

/// An outgoing batch executed on the EVM side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub batch_nonce: u64,
    pub token_contract: Address,
}

/// A validator set update accepted by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetUpdatedEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub valset_nonce: u64,
    pub reward_amount: U256,
    pub reward_token: Address,
    pub validators: Vec<Address>,
    pub powers: Vec<u64>,
}

/// An ERC20 representation of a Cosmos denom deployed by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20DeployedEvent {
    pub event_nonce: u64,
    pub block_height: u64,
    pub cosmos_denom: String,
    pub token_contract: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// One bridge event of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEvent {
    Deposit(DepositEvent),
    Withdraw(WithdrawEvent),
    ValsetUpdated(ValsetUpdatedEvent),
    Erc20Deployed(Erc20DeployedEvent),
}

impl BridgeEvent {
    pub fn event_nonce(&self) -> u64 {
        match self {
            BridgeEvent::Deposit(e) => e.event_nonce,
            BridgeEvent::Withdraw(e) => e.event_nonce,
            BridgeEvent::ValsetUpdated(e) => e.event_nonce,
            BridgeEvent::Erc20Deployed(e) => e.event_nonce,
        }
    }

    pub fn block_height(&self) -> u64 {
        match self {
            BridgeEvent::Deposit(e) => e.block_height,
            BridgeEvent::Withdraw(e) => e.block_height,
            BridgeEvent::ValsetUpdated(e) => e.block_height,
            BridgeEvent::Erc20Deployed(e) => e.block_height,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::Deposit(_) => "deposit",
            BridgeEvent::Withdraw(_) => "withdraw",
            BridgeEvent::ValsetUpdated(_) => "valset_updated",
            BridgeEvent::Erc20Deployed(_) => "erc20_deployed",
        }
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, GravityError> {
    u64::try_from(value)
        .map_err(|_| GravityError::Encoding(format!("{} {} does not fit in u64", field, value)))
}

fn decode<E: SolEvent>(log: &Log) -> Result<(E, u64), GravityError> {
    let block_height = log
        .block_number
        .ok_or_else(|| GravityError::Encoding(format!("{} log without block number", E::SIGNATURE)))?;
    let decoded = log
        .log_decode::<E>()
        .map_err(|e| GravityError::Encoding(format!("failed to decode {}: {}", E::SIGNATURE, e)))?;
    Ok((decoded.inner.data, block_height))
}

impl DepositEvent {
    pub fn from_log(log: &Log) -> Result<Self, GravityError> {
        let (event, block_height) = decode::<Gravity::SendToCosmosEvent>(log)?;
        Ok(Self {
            event_nonce: to_u64(event._eventNonce, "event nonce")?,
            block_height,
            token_contract: event._tokenContract,
            sender: event._sender,
            destination: event._destination,
            amount: event._amount,
        })
    }
}

impl WithdrawEvent {
    pub fn from_log(log: &Log) -> Result<Self, GravityError> {
        let (event, block_height) = decode::<Gravity::TransactionBatchExecutedEvent>(log)?;
        Ok(Self {
            event_nonce: to_u64(event._eventNonce, "event nonce")?,
            block_height,
            batch_nonce: to_u64(event._batchNonce, "batch nonce")?,
            token_contract: event._token,
        })
    }
}

impl ValsetUpdatedEvent {
    pub fn from_log(log: &Log) -> Result<Self, GravityError> {
        let (event, block_height) = decode::<Gravity::ValsetUpdatedEvent>(log)?;
        if event._validators.len() != event._powers.len() {
            return Err(GravityError::Encoding(format!(
                "valset update with {} validators and {} powers",
                event._validators.len(),
                event._powers.len()
            )));
        }
        let powers = event
            ._powers
            .iter()
            .map(|p| to_u64(*p, "validator power"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            event_nonce: to_u64(event._eventNonce, "event nonce")?,
            block_height,
            valset_nonce: to_u64(event._newValsetNonce, "valset nonce")?,
            reward_amount: event._rewardAmount,
            reward_token: event._rewardToken,
            validators: event._validators,
            powers,
        })
    }

    /// The validator set this event installed on the contract.
    pub fn to_valset(&self) -> Valset {
        Valset {
            nonce: self.valset_nonce,
            members: self
                .validators
                .iter()
                .zip(&self.powers)
                .map(|(addr, power)| BridgeValidator {
                    power: *power,
                    ethereum_address: addr.to_checksum(None),
                })
                .collect(),
            height: self.block_height,
            reward_amount: self.reward_amount.to_string(),
            reward_token: self.reward_token.to_checksum(None),
        }
    }
}

impl Erc20DeployedEvent {
    pub fn from_log(log: &Log) -> Result<Self, GravityError> {
        let (event, block_height) = decode::<Gravity::ERC20DeployedEvent>(log)?;
        Ok(Self {
            event_nonce: to_u64(event._eventNonce, "event nonce")?,
            block_height,
            cosmos_denom: event._cosmosDenom,
            token_contract: event._tokenContract,
            name: event._name,
            symbol: event._symbol,
            decimals: event._decimals,
        })
    }
}

/// Keep only events the Cosmos chain has not yet seen.
pub fn filter_by_nonce(events: Vec<BridgeEvent>, last_processed_nonce: u64) -> Vec<BridgeEvent> {
    events
        .into_iter()
        .filter(|e| e.event_nonce() > last_processed_nonce)
        .collect()
}

/// Merge per-kind event lists into one stream ordered by event nonce.
///
/// The sort is stable so equal nonces (which a healthy contract never emits)
/// keep their input order.
pub fn merge_sorted(lists: Vec<Vec<BridgeEvent>>) -> Vec<BridgeEvent> {
    let mut merged: Vec<BridgeEvent> = lists.into_iter().flatten().collect();
    merged.sort_by_key(BridgeEvent::event_nonce);
    merged
}
