//! Hashing and value-parsing helpers shared by the checkpoint encoder,
//! the signature repacker and the claim builders.

use alloy::primitives::{Address, B256, U256};
use bech32::{ToBase32, Variant};
use tiny_keccak::{Hasher, Keccak};

use crate::error::GravityError;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Convert a gravity id string into the `bytes32` form the contract stores.
///
/// Plain ids ("defaultgravityid") are right-padded with zeros. A 0x-prefixed
/// 64 hex char id is taken as the raw word.
pub fn gravity_id_from_str(id: &str) -> Result<B256, GravityError> {
    if let Some(hex_str) = id.strip_prefix("0x") {
        if hex_str.len() == 64 {
            let bytes = hex::decode(hex_str)
                .map_err(|e| GravityError::Encoding(format!("invalid gravity id {}: {}", id, e)))?;
            return Ok(B256::from_slice(&bytes));
        }
    }

    let raw = id.as_bytes();
    if raw.is_empty() || raw.len() > 32 {
        return Err(GravityError::Encoding(format!(
            "gravity id must be 1..=32 bytes, got {}",
            raw.len()
        )));
    }

    let mut word = [0u8; 32];
    word[..raw.len()].copy_from_slice(raw);
    Ok(B256::from(word))
}

/// Right-pad an ASCII method name into a `bytes32` word.
pub(crate) fn method_name_word(name: &str) -> B256 {
    let mut word = [0u8; 32];
    let raw = name.as_bytes();
    let len = raw.len().min(32);
    word[..len].copy_from_slice(&raw[..len]);
    B256::from(word)
}

/// Parse a 0x-prefixed hex EVM address.
pub fn parse_address(addr: &str) -> Result<Address, GravityError> {
    let hex_str = addr.strip_prefix("0x").unwrap_or(addr);
    if hex_str.len() != 40 {
        return Err(GravityError::Encoding(format!(
            "invalid EVM address {:?}: expected 40 hex chars, got {}",
            addr,
            hex_str.len()
        )));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| GravityError::Encoding(format!("invalid EVM address {:?}: {}", addr, e)))?;
    Ok(Address::from_slice(&bytes))
}

/// Parse a base-10 integer amount as Cosmos reports it (`sdk.Int` strings).
///
/// An empty string is read as zero, which is how unset reward amounts arrive.
pub fn parse_amount(amount: &str) -> Result<U256, GravityError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(trimmed, 10)
        .map_err(|e| GravityError::Encoding(format!("invalid amount {:?}: {}", amount, e)))
}

/// Parse an optional address field where an empty string means the zero address.
pub fn parse_optional_address(addr: &str) -> Result<Address, GravityError> {
    if addr.trim().is_empty() {
        return Ok(Address::ZERO);
    }
    parse_address(addr)
}

/// Encode the first 20 bytes of a `bytes32` deposit destination as a bech32 account.
pub fn cosmos_receiver_from_bytes32(
    destination: &[u8; 32],
    prefix: &str,
) -> Result<String, GravityError> {
    bech32::encode(prefix, (&destination[..20]).to_base32(), Variant::Bech32)
        .map_err(|e| GravityError::Encoding(format!("failed to encode bech32: {}", e)))
}
