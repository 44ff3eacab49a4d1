//! Checkpoint computation matching the Gravity contract
//!
//! The contract recomputes these hashes on every `updateValset` and
//! `submitBatch` call and verifies validator signatures against them, so the
//! layout must be bit-exact:
//!
//! ```solidity
//! keccak256(abi.encode(gravityId, bytes32("checkpoint"), valsetNonce,
//!     validators, powers, rewardAmount, rewardToken))
//!
//! keccak256(abi.encode(gravityId, bytes32("transactionBatch"), amounts,
//!     destinations, fees, batchNonce, tokenContract, batchTimeout))
//! ```

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolValue;

use crate::error::GravityError;
use crate::hash::{keccak256, method_name_word, parse_address, parse_amount, parse_optional_address};
use crate::types::{OutgoingTxBatch, Valset};

const VALSET_METHOD: &str = "checkpoint";
const BATCH_METHOD: &str = "transactionBatch";

/// Parallel `(validators, powers)` arrays in the valset's canonical order.
pub fn valset_members(valset: &Valset) -> Result<(Vec<Address>, Vec<U256>), GravityError> {
    let mut validators = Vec::with_capacity(valset.members.len());
    let mut powers = Vec::with_capacity(valset.members.len());
    for member in &valset.members {
        validators.push(parse_address(&member.ethereum_address)?);
        powers.push(U256::from(member.power));
    }
    Ok((validators, powers))
}

/// Parallel `(amounts, destinations, fees)` arrays of a batch.
pub fn batch_transfers(
    batch: &OutgoingTxBatch,
) -> Result<(Vec<U256>, Vec<Address>, Vec<U256>), GravityError> {
    let n = batch.transactions.len();
    let mut amounts = Vec::with_capacity(n);
    let mut destinations = Vec::with_capacity(n);
    let mut fees = Vec::with_capacity(n);
    for tx in &batch.transactions {
        amounts.push(parse_amount(&tx.erc20_token.amount)?);
        destinations.push(parse_address(&tx.dest_address)?);
        fees.push(parse_amount(&tx.erc20_fee.amount)?);
    }
    Ok((amounts, destinations, fees))
}

/// Compute the checkpoint validators sign for a validator set update.
pub fn encode_valset_checkpoint(gravity_id: B256, valset: &Valset) -> Result<B256, GravityError> {
    let (validators, powers) = valset_members(valset)?;
    let reward_amount = parse_amount(&valset.reward_amount)?;
    let reward_token = parse_optional_address(&valset.reward_token)?;

    let encoded = (
        gravity_id,
        method_name_word(VALSET_METHOD),
        U256::from(valset.nonce),
        validators,
        powers,
        reward_amount,
        reward_token,
    )
        .abi_encode_params();

    Ok(B256::from(keccak256(&encoded)))
}

/// Compute the checkpoint validators sign for an outgoing transaction batch.
pub fn encode_batch_checkpoint(
    gravity_id: B256,
    batch: &OutgoingTxBatch,
) -> Result<B256, GravityError> {
    let (amounts, destinations, fees) = batch_transfers(batch)?;
    let token_contract = parse_address(&batch.token_contract)?;

    let encoded = (
        gravity_id,
        method_name_word(BATCH_METHOD),
        amounts,
        destinations,
        fees,
        U256::from(batch.batch_nonce),
        token_contract,
        U256::from(batch.batch_timeout),
    )
        .abi_encode_params();

    Ok(B256::from(keccak256(&encoded)))
}
