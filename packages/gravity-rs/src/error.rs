//! Error types for bridge encoding and signature handling.

use thiserror::Error;

/// Errors raised by the pure bridge algorithms in this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GravityError {
    /// The confirmation collection handed to the repacker was empty.
    #[error("no signatures in confirmation set")]
    NoSignatures,

    /// Confirmations cover less than 66% of the validator set's power.
    #[error("insufficient voting power: {signed} of {total} signed")]
    InsufficientVotingPower { signed: u128, total: u128 },

    /// A value read from the chain could not be converted to its ABI form.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A confirmation's signature is not a 65-byte hex string.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl GravityError {
    /// Semantic outcomes ("nothing to relay yet") as opposed to corrupt data.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            GravityError::NoSignatures | GravityError::InsufficientVotingPower { .. }
        )
    }
}
