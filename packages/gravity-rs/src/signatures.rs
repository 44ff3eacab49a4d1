//! Confirmation repacking and the supermajority check.
//!
//! The Gravity contract takes a full `(validators, powers, v, r, s)` set in
//! the valset's canonical order and sums the power of valid signatures
//! itself. Validators that did not sign still occupy their slot, with a zero
//! signature.

use std::collections::HashMap;

use alloy::primitives::{Address, B256, U256};
use tracing::warn;

use crate::checkpoint::valset_members;
use crate::error::GravityError;
use crate::hash::parse_address;
use crate::types::{BatchConfirm, Valset, ValsetConfirm};

/// Minimum share of total power, in percent, that must have signed.
pub const SIGNATURE_THRESHOLD_PERCENT: u128 = 66;

/// A signature over a checkpoint, keyed by the validator's Ethereum address.
pub trait Confirmation {
    fn eth_signer(&self) -> &str;
    fn signature(&self) -> &str;
}

impl Confirmation for ValsetConfirm {
    fn eth_signer(&self) -> &str {
        &self.eth_address
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

impl Confirmation for BatchConfirm {
    fn eth_signer(&self) -> &str {
        &self.eth_signer
    }

    fn signature(&self) -> &str {
        &self.signature
    }
}

/// Dense signature arrays ready for `updateValset` / `submitBatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackedSigs {
    pub validators: Vec<Address>,
    pub powers: Vec<U256>,
    pub v: Vec<u8>,
    pub r: Vec<B256>,
    pub s: Vec<B256>,
    pub signed_power: u128,
    pub total_power: u128,
}

impl RepackedSigs {
    /// Signed share of total power, for logging.
    pub fn percent_signed(&self) -> f64 {
        power_to_percent(self.signed_power, self.total_power)
    }
}

/// Split a 65-byte `r || s || v` hex signature into its components.
///
/// `v` is normalized to the 27/28 form the contract's `ecrecover` expects.
pub fn decode_signature(sig: &str) -> Result<(u8, B256, B256), GravityError> {
    let hex_str = sig.strip_prefix("0x").unwrap_or(sig);
    let bytes =
        hex::decode(hex_str).map_err(|e| GravityError::InvalidSignature(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(GravityError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let r = B256::from_slice(&bytes[0..32]);
    let s = B256::from_slice(&bytes[32..64]);
    let mut v = bytes[64];
    if v < 27 {
        v += 27;
    }
    Ok((v, r, s))
}

/// Share of `total` that `signed` represents, in percent.
pub fn power_to_percent(signed: u128, total: u128) -> f64 {
    if total == 0 {
        return 0.0;
    }
    signed as f64 / total as f64 * 100.0
}

/// `signed / total >= 66%`, evaluated in integers.
pub fn meets_threshold(signed: u128, total: u128) -> bool {
    total > 0 && signed * 100 >= SIGNATURE_THRESHOLD_PERCENT * total
}

/// Order confirmations by the valset's canonical member order and enforce the
/// voting power threshold.
///
/// Confirmations from addresses outside the valset are ignored. A member whose
/// confirmation carries an undecodable signature is treated as not having
/// signed.
pub fn check_and_repack<C: Confirmation>(
    valset: &Valset,
    confirms: &[C],
) -> Result<RepackedSigs, GravityError> {
    if confirms.is_empty() {
        return Err(GravityError::NoSignatures);
    }

    let mut signer_to_sig: HashMap<Address, &C> = HashMap::with_capacity(confirms.len());
    for confirm in confirms {
        match parse_address(confirm.eth_signer()) {
            Ok(addr) => {
                signer_to_sig.insert(addr, confirm);
            }
            Err(e) => warn!(signer = confirm.eth_signer(), error = %e, "Ignoring confirmation with bad signer"),
        }
    }

    let (validators, powers) = valset_members(valset)?;
    let n = validators.len();
    let mut v = Vec::with_capacity(n);
    let mut r = Vec::with_capacity(n);
    let mut s = Vec::with_capacity(n);
    let mut signed_power: u128 = 0;

    for (addr, member) in validators.iter().zip(&valset.members) {
        let decoded = signer_to_sig.get(addr).and_then(|confirm| {
            decode_signature(confirm.signature())
                .map_err(|e| warn!(validator = %addr, error = %e, "Ignoring malformed signature"))
                .ok()
        });

        match decoded {
            Some((sig_v, sig_r, sig_s)) => {
                signed_power += member.power as u128;
                v.push(sig_v);
                r.push(sig_r);
                s.push(sig_s);
            }
            None => {
                v.push(0);
                r.push(B256::ZERO);
                s.push(B256::ZERO);
            }
        }
    }

    let total_power = valset.total_power();
    if !meets_threshold(signed_power, total_power) {
        return Err(GravityError::InsufficientVotingPower {
            signed: signed_power,
            total: total_power,
        });
    }

    Ok(RepackedSigs {
        validators,
        powers,
        v,
        r,
        s,
        signed_power,
        total_power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BridgeValidator;

    fn addr(i: u8) -> String {
        format!("0x{}", hex::encode([i; 20]))
    }

    fn sig(i: u8) -> String {
        let mut bytes = vec![i; 64];
        bytes.push(1);
        hex::encode(bytes)
    }

    fn valset(powers: &[u64]) -> Valset {
        Valset {
            nonce: 1,
            members: powers
                .iter()
                .enumerate()
                .map(|(i, p)| BridgeValidator {
                    power: *p,
                    ethereum_address: addr(i as u8 + 1),
                })
                .collect(),
            height: 0,
            reward_amount: String::new(),
            reward_token: String::new(),
        }
    }

    fn confirm(i: u8) -> ValsetConfirm {
        ValsetConfirm {
            nonce: 1,
            orchestrator: format!("umee1orch{}", i),
            eth_address: addr(i),
            signature: sig(i),
        }
    }

    #[test]
    fn test_empty_confirms() {
        let result = check_and_repack::<ValsetConfirm>(&valset(&[1, 2]), &[]);
        assert_eq!(result, Err(GravityError::NoSignatures));
    }

    #[test]
    fn test_three_validator_scenario() {
        let set = valset(&[1111111111, 2212121212, 123456]);
        let repacked = check_and_repack(&set, &[confirm(1), confirm(2)]).unwrap();

        let expected: Vec<Address> = (1..=3u8).map(|i| Address::from([i; 20])).collect();
        assert_eq!(repacked.validators, expected);
        assert_eq!(
            repacked.powers,
            vec![
                U256::from(1111111111u64),
                U256::from(2212121212u64),
                U256::from(123456u64)
            ]
        );
        assert_eq!(repacked.v, vec![28, 28, 0]);
        assert_eq!(repacked.r[2], B256::ZERO);
        assert_eq!(repacked.s[2], B256::ZERO);
        assert_eq!(repacked.total_power, 3323355779);
        assert!(repacked.percent_signed() > 99.99);
    }

    #[test]
    fn test_reverse_order_confirms_keep_canonical_order() {
        let set = valset(&[10, 20, 30, 40]);
        let forward = check_and_repack(
            &set,
            &[confirm(1), confirm(2), confirm(3), confirm(4)],
        )
        .unwrap();
        let reverse = check_and_repack(
            &set,
            &[confirm(4), confirm(3), confirm(2), confirm(1)],
        )
        .unwrap();

        assert_eq!(forward, reverse);
        assert_eq!(reverse.validators[0], Address::from([1u8; 20]));
        assert_eq!(reverse.powers[3], U256::from(40u64));
    }

    #[test]
    fn test_threshold_boundary() {
        // P = 1000: ceil(0.66 * P) = 660 passes, floor(0.66 * P) - 1 = 659 fails
        let pass = valset(&[660, 340]);
        assert!(check_and_repack(&pass, &[confirm(1)]).is_ok());

        let fail = valset(&[659, 341]);
        assert_eq!(
            check_and_repack(&fail, &[confirm(1)]),
            Err(GravityError::InsufficientVotingPower {
                signed: 659,
                total: 1000
            })
        );
    }

    #[test]
    fn test_threshold_boundary_non_integer() {
        // P = 1001: 0.66 * P = 660.66
        assert!(check_and_repack(&valset(&[661, 340]), &[confirm(1)]).is_ok());
        assert!(check_and_repack(&valset(&[659, 342]), &[confirm(1)]).is_err());
    }

    #[test]
    fn test_unknown_signer_ignored() {
        let set = valset(&[50, 50]);
        let stranger = ValsetConfirm {
            eth_address: addr(99),
            ..confirm(99)
        };
        let result = check_and_repack(&set, &[confirm(1), stranger]);
        assert_eq!(
            result,
            Err(GravityError::InsufficientVotingPower {
                signed: 50,
                total: 100
            })
        );
    }

    #[test]
    fn test_malformed_signature_counts_as_unsigned() {
        let set = valset(&[70, 30]);
        let mut bad = confirm(1);
        bad.signature = "0x1234".to_string();
        let result = check_and_repack(&set, &[bad, confirm(2)]);
        assert!(matches!(
            result,
            Err(GravityError::InsufficientVotingPower { signed: 30, .. })
        ));
    }

    #[test]
    fn test_signer_address_case_insensitive() {
        let set = valset(&[100]);
        let mut upper = confirm(1);
        upper.eth_address = format!("0x{}", hex::encode_upper([1u8; 20]));
        assert!(check_and_repack(&set, &[upper]).is_ok());
    }

    #[test]
    fn test_batch_confirm_repack() {
        let set = valset(&[100]);
        let confirm = BatchConfirm {
            nonce: 3,
            token_contract: addr(9),
            eth_signer: addr(1),
            orchestrator: "umee1orch".to_string(),
            signature: format!("0x{}", sig(1)),
        };
        let repacked = check_and_repack(&set, &[confirm]).unwrap();
        assert_eq!(repacked.r[0], B256::from([1u8; 32]));
    }

    #[test]
    fn test_decode_signature_keeps_high_v() {
        let mut bytes = vec![0u8; 64];
        bytes.push(28);
        let (v, _, _) = decode_signature(&hex::encode(bytes)).unwrap();
        assert_eq!(v, 28);
    }

    #[test]
    fn test_zero_total_power_fails() {
        assert!(!meets_threshold(0, 0));
        let set = valset(&[0, 0]);
        assert!(check_and_repack(&set, &[confirm(1)]).is_err());
    }
}
