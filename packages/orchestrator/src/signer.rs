//! Ethereum signing capability bound to the orchestrator's key.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use eyre::{eyre, Result};
#[cfg(test)]
use mockall::automock;

/// Signs on behalf of one Ethereum key without exposing it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EthSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Raw secp256k1 signature over `hash`, as 65 bytes `r || s || v`.
    async fn sign_hash(&self, hash: B256) -> Result<Vec<u8>>;

    /// EIP-191 signature over the 32 bytes of `hash`, as 65 bytes `r || s || v`.
    async fn personal_sign(&self, address: Address, hash: B256) -> Result<Vec<u8>>;
}

/// [`EthSigner`] over an in-process private key.
pub struct LocalEthSigner {
    signer: PrivateKeySigner,
}

impl LocalEthSigner {
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("Invalid Ethereum private key: {}", e))?;
        Ok(Self { signer })
    }

    pub fn inner(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

#[async_trait]
impl EthSigner for LocalEthSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_hash(&self, hash: B256) -> Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| eyre!("Failed to sign hash: {}", e))?;
        Ok(signature.as_bytes().to_vec())
    }

    async fn personal_sign(&self, address: Address, hash: B256) -> Result<Vec<u8>> {
        if address != self.signer.address() {
            return Err(eyre!(
                "Signer for {} requested, key controls {}",
                address,
                self.signer.address()
            ));
        }
        let signature = self
            .signer
            .sign_message(hash.as_slice())
            .await
            .map_err(|e| eyre!("Failed to sign message: {}", e))?;
        Ok(signature.as_bytes().to_vec())
    }
}
